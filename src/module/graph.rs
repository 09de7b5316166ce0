//! Module graph resolution and classification.
//!
//! Per-entry reports from the [`ModuleInfo`] tool are flattened into one
//! deduplicated graph. Discovery order is deterministic (entries in order,
//! depth-first over dependency declaration order) because it feeds the
//! decision hash.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;

use super::{
    Dependency, Directive, InfoModule, MediaKind, Module, ModuleInfo, Origin, SourceReader,
    classify_read,
};
use crate::error::BuildError;
use crate::freshness::compute_file_hash;
use crate::logger::ProgressLine;
use crate::{debug, log};

/// Longest registry redirect chain followed.
const MAX_REDIRECTS: usize = 16;

/// Flattened module graph in discovery order.
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    index: FxHashMap<String, usize>,
    roots: Vec<String>,
}

impl ModuleGraph {
    /// Assemble a graph from already-resolved modules (discovery order).
    pub fn from_modules(roots: Vec<String>, modules: Vec<Module>) -> Self {
        let mut graph = Self {
            roots,
            ..Self::default()
        };
        for module in modules {
            graph.push(module);
        }
        graph
    }

    fn push(&mut self, module: Module) {
        self.index.insert(module.specifier.clone(), self.modules.len());
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn get(&self, specifier: &str) -> Option<&Module> {
        self.index.get(specifier).map(|&i| &self.modules[i])
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.index.contains_key(specifier)
    }

    /// Canonical specifiers of the entry modules, in entry order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Directive of the edge target, if it is part of the graph.
    pub fn directive_of(&self, specifier: &str) -> Option<Directive> {
        self.get(specifier).map(|m| m.directive)
    }

    /// Entry points and targets of every edge.
    ///
    /// An edge from a client module crosses the boundary when its target is
    /// `"use server"`, so client-owned edges count too. A module in this set
    /// that cannot be classified fails the build.
    pub fn boundary_candidates(&self) -> FxHashSet<&str> {
        let mut candidates: FxHashSet<&str> = self.roots.iter().map(String::as_str).collect();
        for module in &self.modules {
            candidates.extend(module.dependencies.iter().map(|d| d.target.as_str()));
        }
        candidates
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn resolution(specifier: &str, reason: impl Into<String>) -> BuildError {
    BuildError::Resolution {
        specifier: specifier.to_string(),
        reason: reason.into(),
    }
}

/// Follow registry redirects to the pinned specifier.
fn follow_redirects(redirects: &FxHashMap<String, String>, specifier: &str) -> Result<String, BuildError> {
    let mut current = specifier;
    for _ in 0..MAX_REDIRECTS {
        match redirects.get(current) {
            Some(next) if next == specifier => {
                return Err(resolution(specifier, "redirect cycle"));
            }
            Some(next) => current = next,
            None => return Ok(current.to_string()),
        }
    }
    Err(resolution(specifier, "redirect chain too long or cyclic"))
}

/// Whether the module is one of our own generated files.
fn is_generated(module: &InfoModule, exclude: &Path) -> bool {
    let source = crate::utils::path::file_path(&module.specifier);
    source.is_some_and(|p| p.starts_with(exclude))
        || module.local.as_ref().is_some_and(|p| p.starts_with(exclude))
}

/// Resolve entry points into one graph.
///
/// Modules under `exclude` (the generated reference directory) are skipped,
/// as are unsupported media kinds. Every local module is fingerprinted.
pub fn resolve(
    entries: &[String],
    info: &dyn ModuleInfo,
    exclude: &Path,
) -> Result<ModuleGraph, BuildError> {
    let mut graph = ModuleGraph::default();

    for entry in entries {
        let report = info
            .info(entry)
            .map_err(|e| resolution(entry, format!("{e:#}")))?;
        let root = report
            .roots
            .first()
            .ok_or_else(|| resolution(entry, "no root module reported"))?;
        let root = follow_redirects(&report.redirects, root)?;

        let table: FxHashMap<&str, &InfoModule> = report
            .modules
            .iter()
            .map(|m| (m.specifier.as_str(), m))
            .collect();
        if !table.contains_key(root.as_str()) {
            return Err(resolution(entry, "entry module missing from module information"));
        }
        if !graph.roots.contains(&root) {
            graph.roots.push(root.clone());
        }

        let mut stack = vec![root];
        while let Some(specifier) = stack.pop() {
            if graph.contains(&specifier) {
                continue;
            }
            let Some(found) = table.get(specifier.as_str()) else {
                debug!("resolve"; "no information for `{}`, skipped", specifier);
                continue;
            };
            if let Some(error) = &found.error {
                return Err(resolution(&specifier, error.as_str()));
            }
            let Some(media) = found.media_type.as_deref().and_then(MediaKind::parse) else {
                continue;
            };
            if is_generated(found, exclude) {
                continue;
            }

            let mut dependencies = Vec::with_capacity(found.dependencies.len());
            for dep in &found.dependencies {
                let Some(code) = &dep.code else { continue };
                dependencies.push(Dependency {
                    literal: dep.specifier.clone(),
                    target: follow_redirects(&report.redirects, &code.specifier)?,
                });
            }
            // Reverse push keeps declaration order on pop
            stack.extend(
                dependencies
                    .iter()
                    .rev()
                    .filter(|d| !graph.contains(&d.target))
                    .map(|d| d.target.clone()),
            );

            graph.push(Module {
                specifier,
                local: found.local.clone(),
                media,
                dependencies,
                directive: Directive::Default,
                fingerprint: None,
            });
        }
    }

    fingerprint(&mut graph);
    debug!("resolve"; "{} modules from {} entries", graph.len(), graph.roots.len());
    Ok(graph)
}

/// Fingerprint every module with a project source file.
fn fingerprint(graph: &mut ModuleGraph) {
    graph.modules.par_iter_mut().for_each(|module| {
        if let Some(path) = module.source_path() {
            module.fingerprint = Some(compute_file_hash(&path));
        }
    });
}

// ============================================================================
// Classification
// ============================================================================

/// Determine every module's directive with bounded parallelism.
///
/// Unreadable boundary candidates fail the build; unreadable modules that no
/// edge or entry references degrade to `Default`.
pub fn classify_graph(
    graph: &mut ModuleGraph,
    reader: &dyn SourceReader,
    concurrency: usize,
) -> Result<(), BuildError> {
    let remote = graph
        .modules
        .iter()
        .filter(|m| Origin::of(m) == Origin::Remote)
        .count();
    let progress = ProgressLine::new(
        "classify",
        &[("local", graph.len() - remote), ("remote", remote)],
    );

    let read_all = || -> Vec<(Directive, Option<String>)> {
        graph
            .modules
            .par_iter()
            .map(|module| {
                let read = reader.read_prologue(module);
                let reason = read.as_ref().err().map(ToString::to_string);
                progress.inc(Origin::of(module).label());
                (classify_read(read), reason)
            })
            .collect()
    };
    let results = match ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
    {
        Ok(pool) => pool.install(read_all),
        Err(_) => read_all(),
    };
    progress.finish();

    let mut reasons = FxHashMap::default();
    for (module, (directive, reason)) in graph.modules.iter_mut().zip(results) {
        module.directive = directive;
        if let Some(reason) = reason {
            reasons.insert(module.specifier.clone(), reason);
        }
    }

    apply_failure_policy(graph, &reasons)
}

fn apply_failure_policy(
    graph: &mut ModuleGraph,
    reasons: &FxHashMap<String, String>,
) -> Result<(), BuildError> {
    let fatal: Option<String> = {
        let candidates = graph.boundary_candidates();
        graph
            .modules
            .iter()
            .find(|m| m.directive == Directive::Error && candidates.contains(m.specifier.as_str()))
            .map(|m| m.specifier.clone())
    };
    if let Some(specifier) = fatal {
        let reason = reasons
            .get(&specifier)
            .cloned()
            .unwrap_or_else(|| "prologue unavailable".into());
        return Err(BuildError::Classification { specifier, reason });
    }

    for module in graph
        .modules
        .iter_mut()
        .filter(|m| m.directive == Directive::Error)
    {
        log!("classify"; "cannot read unreferenced `{}`, treating as ordinary module", module.specifier);
        module.directive = Directive::Default;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
