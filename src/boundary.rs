//! Boundary scope extraction.
//!
//! A scope is a non-client module together with its *direct* dependencies
//! that cross to the other side. Transitive dependencies never appear: a
//! client module's own imports are bundled with it.
//!
//! ```text
//! A (server) ──► B ("use client") ──► C ("use server")
//!
//! scopes: { A: [B] }          C is only reachable through B
//! client aliases: [C]         B's bundle gets a stub for C
//! ```

use rustc_hash::FxHashSet;

use crate::module::{Directive, ModuleGraph};

/// Direction of a boundary edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crossing {
    /// Non-client owner importing a client module.
    Client,
    /// Any owner importing a server module.
    Server,
}

impl Crossing {
    /// Crossing of an edge, if it crosses at all.
    pub fn of(owner: Directive, dependency: Directive) -> Option<Self> {
        match dependency {
            Directive::Server => Some(Self::Server),
            Directive::Client if owner != Directive::Client => Some(Self::Client),
            _ => None,
        }
    }
}

/// One boundary dependency of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryEdge {
    pub target: String,
    /// Import string at the call site.
    pub literal: String,
    pub crossing: Crossing,
}

/// A non-client module and its direct boundary dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub owner: String,
    pub edges: Vec<BoundaryEdge>,
}

/// Extract scopes in graph order; owners without crossings are omitted.
pub fn extract_scopes(graph: &ModuleGraph) -> Vec<Scope> {
    graph
        .modules()
        .iter()
        .filter(|m| !m.directive.is_client())
        .filter_map(|owner| {
            let edges: Vec<_> = owner
                .dependencies
                .iter()
                .filter_map(|dep| {
                    let target = graph.directive_of(&dep.target)?;
                    let crossing = Crossing::of(owner.directive, target)?;
                    Some(BoundaryEdge {
                        target: dep.target.clone(),
                        literal: dep.literal.clone(),
                        crossing,
                    })
                })
                .collect();
            (!edges.is_empty()).then(|| Scope {
                owner: owner.specifier.clone(),
                edges,
            })
        })
        .collect()
}

/// Server modules imported directly by client modules, in graph order.
///
/// The client bundle aliases each of them to a generated call stub.
pub fn client_aliases(graph: &ModuleGraph) -> Vec<String> {
    let mut seen = FxHashSet::default();
    graph
        .modules()
        .iter()
        .filter(|m| m.directive.is_client())
        .flat_map(|m| &m.dependencies)
        .filter(|dep| graph.directive_of(&dep.target) == Some(Directive::Server))
        .filter(|dep| seen.insert(dep.target.as_str()))
        .map(|dep| dep.target.clone())
        .collect()
}

/// Distinct targets of the given crossing, in scope order.
pub fn targets(scopes: &[Scope], crossing: Crossing) -> Vec<String> {
    let mut seen = FxHashSet::default();
    scopes
        .iter()
        .flat_map(|s| &s.edges)
        .filter(|e| e.crossing == crossing && seen.insert(e.target.as_str()))
        .map(|e| e.target.clone())
        .collect()
}
