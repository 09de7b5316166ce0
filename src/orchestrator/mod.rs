//! Build orchestrator and cache.
//!
//! # Module Structure
//!
//! ```text
//! orchestrator/
//! ├── layout      # Output paths and import-map keys per profile
//! ├── hash        # Decision hash
//! ├── context     # Bundler context lifecycle (Cold/WarmReusable/WarmStale)
//! ├── emit        # Compare-before-write output + marker-based GC
//! ├── importmap   # Scoped import-map merge
//! ├── snapshot    # Persisted build result
//! └── handle      # BuildHandle (runtime queries)
//! ```
//!
//! # Flow
//!
//! ```text
//! resolve ─► classify ─► scopes ─► [analyze | memo] ─► decision hash
//!                                                          │
//!                    hash and import map unchanged? ──yes──► ServedFromCache
//!                                                          │ no
//!   stubs ─► context rebuild ─► references/proxies ─► GC ─► import map ─► snapshot
//! ```
//!
//! Persisted state is written last: a failed run leaves the previous
//! snapshot authoritative.

mod context;
mod emit;
mod handle;
mod hash;
mod importmap;
mod layout;
mod snapshot;

pub use context::ContextState;
pub use handle::BuildHandle;
pub use importmap::{ImportMapFile, ScopeTable, merge};
pub use layout::Layout;
pub use snapshot::{Artifact, SNAPSHOT_VERSION, Snapshot};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::boundary::{Crossing, Scope, client_aliases, extract_scopes, targets};
use crate::bundler::{BundleContext, BundleRequest, Bundler, EntryPoint, EsbuildBundler};
use crate::codegen::{client_server_stub, reexport_proxy, server_action_reference, server_client_reference};
use crate::config::ProjectConfig;
use crate::error::BuildError;
use crate::module::{
    DenoInfo, ModuleGraph, ModuleInfo, PrologueReader, RateLimiter, SourceReader, classify_graph,
    resolve,
};
use crate::utils::path::{file_path, file_url};
use crate::utils::write::is_writable;
use crate::{debug, log};
use context::ensure_context;
use emit::Emitter;
use hash::{DecisionInputs, decision_hash};

/// Inputs of one build profile.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub root: PathBuf,
    pub entries: Vec<String>,
    pub bootstrap: Vec<String>,
    pub external: Vec<String>,
    pub import_map: PathBuf,
    pub profile: String,
    pub namespace: String,
    pub out_dir: PathBuf,
    pub public_prefix: String,
    pub minify: bool,
    /// `None` probes write capability.
    pub read_only: Option<bool>,
    pub concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entries: vec!["app.tsx".into()],
            bootstrap: Vec::new(),
            external: Vec::new(),
            import_map: PathBuf::from("deno.json"),
            profile: "default".into(),
            namespace: "splitbuild".into(),
            out_dir: PathBuf::from(".splitbuild"),
            public_prefix: "/_splitbuild".into(),
            minify: false,
            read_only: None,
            concurrency: 16,
        }
    }
}

impl BuildOptions {
    pub fn from_config(config: &ProjectConfig) -> Self {
        let build = &config.build;
        Self {
            root: config.root.clone(),
            entries: build.entry.clone(),
            bootstrap: build.bootstrap.clone(),
            external: build.external.clone(),
            import_map: build.import_map.clone(),
            profile: build.profile.clone(),
            namespace: build.namespace.clone(),
            out_dir: build.out_dir.clone(),
            public_prefix: build.public_prefix.clone(),
            minify: build.minify,
            read_only: build.read_only,
            concurrency: config.classify.concurrency,
        }
    }
}

/// Result of one `build()` call.
#[derive(Debug)]
pub enum BuildOutcome {
    /// A real build ran and a new snapshot was persisted.
    Rebuilt(Arc<Snapshot>),
    /// Nothing changed (or read-only); the existing snapshot was published.
    ServedFromCache(Arc<Snapshot>),
    Failed(BuildError),
}

impl BuildOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Rebuilt(s) | Self::ServedFromCache(s) => Some(s),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn into_result(self) -> Result<Arc<Snapshot>, BuildError> {
        match self {
            Self::Rebuilt(s) | Self::ServedFromCache(s) => Ok(s),
            Self::Failed(e) => Err(e),
        }
    }
}

/// Mutable per-profile state, guarded by the orchestrator mutex.
#[derive(Default)]
struct State {
    context: Option<Box<dyn BundleContext>>,
}

/// One build profile: collaborators, bundler context and published snapshot.
pub struct Orchestrator {
    options: BuildOptions,
    layout: Layout,
    info: Box<dyn ModuleInfo>,
    reader: Box<dyn SourceReader>,
    bundler: Box<dyn Bundler>,
    published: Arc<ArcSwapOption<Snapshot>>,
    state: Mutex<State>,
}

fn bundle_error(e: anyhow::Error) -> BuildError {
    BuildError::Bundle(format!("{e:#}"))
}

impl Orchestrator {
    pub fn new(
        options: BuildOptions,
        info: Box<dyn ModuleInfo>,
        reader: Box<dyn SourceReader>,
        bundler: Box<dyn Bundler>,
    ) -> Self {
        Self {
            layout: Layout::new(&options),
            options,
            info,
            reader,
            bundler,
            published: Arc::new(ArcSwapOption::empty()),
            state: Mutex::new(State::default()),
        }
    }

    /// Orchestrator with the default collaborators (deno info, HTTP, esbuild).
    pub fn from_config(config: &ProjectConfig) -> Self {
        let options = BuildOptions::from_config(config);
        let info = DenoInfo::new(
            config.tools.info.clone(),
            Some(options.import_map.clone()),
            &options.root,
        );
        let limiter = Arc::new(RateLimiter::new(config.classify.rate, config.classify.burst));
        let bundler = EsbuildBundler::new(config.tools.bundler.clone(), config.tools.esbuild.clone());
        Self::new(
            options,
            Box::new(info),
            Box::new(PrologueReader::new(limiter)),
            Box::new(bundler),
        )
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn handle(&self) -> BuildHandle {
        BuildHandle::new(self.published.clone(), self.options.root.clone())
    }

    pub fn is_read_only(&self) -> bool {
        self.options
            .read_only
            .unwrap_or_else(|| !is_writable(self.layout.profile_dir()))
    }

    /// Whether a change to `path` can affect the build.
    ///
    /// Before the first build every path counts.
    pub fn observes(&self, path: &Path) -> bool {
        let Some(snapshot) = self.published.load_full() else {
            return true;
        };
        if path == self.layout.import_map {
            return true;
        }
        file_url(path).is_some_and(|url| snapshot.observes(&self.layout.public_id(&url)))
    }

    /// Run one build. Concurrent callers are serialized per profile.
    pub fn build(&self) -> BuildOutcome {
        let mut state = self.state.lock();
        let result = if self.is_read_only() {
            self.load_read_only().map(|s| (s, false))
        } else {
            self.run(&mut state)
        };
        match result {
            Ok((snapshot, true)) => BuildOutcome::Rebuilt(snapshot),
            Ok((snapshot, false)) => BuildOutcome::ServedFromCache(snapshot),
            Err(e) => BuildOutcome::Failed(e),
        }
    }

    /// Release the bundler context.
    pub fn dispose(&self) {
        if let Some(context) = self.state.lock().context.take() {
            context.dispose();
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        self.published.store(Some(snapshot.clone()));
        snapshot
    }

    fn load_read_only(&self) -> Result<Arc<Snapshot>, BuildError> {
        if let Some(snapshot) = self.published.load_full() {
            return Ok(snapshot);
        }
        let snapshot = Snapshot::load(&self.layout.snapshot)?
            .ok_or_else(|| BuildError::ReadOnlyWithoutSnapshot(self.layout.snapshot.clone()))?;
        debug!("snapshot"; "loaded {} artifacts (read-only)", snapshot.artifacts.len());
        Ok(self.publish(Arc::new(snapshot)))
    }

    fn previous(&self) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.published.load_full() {
            return Some(snapshot);
        }
        match Snapshot::load(&self.layout.snapshot) {
            Ok(snapshot) => snapshot.map(Arc::new),
            Err(e) => {
                log!("snapshot"; "ignoring unreadable snapshot: {}", e);
                None
            }
        }
    }

    fn run(&self, state: &mut State) -> Result<(Arc<Snapshot>, bool), BuildError> {
        let layout = &self.layout;
        let opts = &self.options;
        let previous = self.previous();

        let mut graph = resolve(&opts.entries, self.info.as_ref(), &layout.ref_dir)?;
        classify_graph(&mut graph, self.reader.as_ref(), opts.concurrency)?;
        let bootstrap_graph = self.resolve_bootstrap()?;

        let scopes = extract_scopes(&graph);
        let client_targets = targets(&scopes, Crossing::Client);
        let aliases = client_aliases(&graph);
        let mut server_targets = targets(&scopes, Crossing::Server);
        for alias in &aliases {
            if !server_targets.contains(alias) {
                server_targets.push(alias.clone());
            }
        }

        let (modules, locals) = self.observe(&graph, &bootstrap_graph);
        let request = self.client_request(&graph, &client_targets, &aliases);
        let entry_points = request.entry_ids();
        let server_exports = self.server_exports(&server_targets, &locals, previous.as_deref())?;

        let hash = decision_hash(&DecisionInputs {
            modules: &modules,
            entry_points: &entry_points,
            server_exports: &server_exports,
            profile: &opts.profile,
            namespace: &opts.namespace,
            minify: opts.minify,
        });

        let mut import_map = ImportMapFile::load(&layout.import_map)?;
        if let Some(previous) = &previous
            && previous.hash == hash.to_hex()
            && import_map.contains_all(&previous.scopes)
        {
            debug!("build"; "decision hash {} unchanged", hash);
            return Ok((self.publish(previous.clone()), false));
        }

        // Stubs first: the client bundle loads them in place of server modules
        let mut emitter = Emitter::new();
        for target in &aliases {
            let id = layout.public_id(target);
            let exports = server_exports.get(&id).map(Vec::as_slice).unwrap_or_default();
            let stub = client_server_stub(&id, exports, &opts.namespace);
            emitter.write(&layout.stub_path(&id), &stub)?;
        }

        let (context_state, context) = ensure_context(&mut state.context, self.bundler.as_ref(), request)?;
        debug!("bundle"; "context {:?}", context_state);
        let result = context.rebuild().map_err(bundle_error)?;
        let output_of = |id: &str| {
            result
                .entries
                .get(id)
                .ok_or_else(|| BuildError::Bundle(format!("no output for `{id}`")))
        };

        let mut artifacts = BTreeMap::new();
        let mut proxies = Vec::new();
        for edge in scopes.iter().flat_map(|s| &s.edges) {
            let id = layout.public_id(&edge.target);
            if artifacts.contains_key(&id) {
                continue;
            }
            let reference = layout.reference_path(&id, edge.crossing);
            let import = layout.import_from(&reference, &edge.target);
            let (code, exports, output) = match edge.crossing {
                Crossing::Client => {
                    let bundled = output_of(&id)?;
                    let code = server_client_reference(&id, &import, &bundled.exports, &opts.namespace);
                    (code, bundled.exports.clone(), Some(layout.public_output(&bundled.path)))
                }
                Crossing::Server => {
                    let exports = server_exports.get(&id).cloned().unwrap_or_default();
                    let code = server_action_reference(&id, &import, &exports, &opts.namespace);
                    (code, exports, None)
                }
            };
            emitter.write(&reference, &code)?;

            let proxy = layout.proxy_path(&id);
            let file_name = reference
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            emitter.write(&proxy, &reexport_proxy(&format!("./{file_name}"), &exports))?;

            artifacts.insert(
                id,
                Artifact {
                    proxy: layout.map_relative(&proxy),
                    output,
                    exports,
                },
            );
            proxies.push(proxy);
        }
        let removed = emitter.collect_garbage(&layout.ref_dir)?;

        let mut bootstrap = Vec::with_capacity(opts.bootstrap.len());
        for spec in &opts.bootstrap {
            let id = self.bootstrap_entry(spec).id;
            bootstrap.push((id.clone(), layout.public_output(&output_of(&id)?.path)));
        }
        let mut externals = BTreeMap::new();
        for pin in &opts.external {
            externals.insert(pin.clone(), layout.public_output(&output_of(pin)?.path));
        }

        let expected = self.expected_scopes(&scopes);
        let mut fresh = expected.clone();
        if let Some(previous) = &previous {
            for scope in previous.scopes.keys() {
                fresh.entry(scope.clone()).or_default();
            }
        }
        let merged = merge(&import_map.scopes(), &fresh, &layout.controlled_prefix());
        import_map.set_scopes(&merged);
        if proxies.iter().any(|p| emitter.was_created(p)) {
            import_map.stamp_update_id(&hash.short());
            log!("importmap"; "new boundary modules; runtimes holding the previous import map must restart");
        }
        import_map.save()?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            hash: hash.to_hex(),
            profile: opts.profile.clone(),
            bootstrap,
            externals,
            artifacts,
            locals,
            entry_points,
            scopes: expected,
            server_exports,
        };
        snapshot.save(&layout.snapshot)?;
        debug!(
            "build";
            "{} modules, {} files written, {} removed",
            graph.len(),
            emitter.written(),
            removed
        );
        Ok((self.publish(Arc::new(snapshot)), true))
    }

    /// Bootstrap modules are not boundary owners; they are resolved only so
    /// their sources count toward the decision hash.
    fn resolve_bootstrap(&self) -> Result<ModuleGraph, BuildError> {
        let local: Vec<String> = self
            .options
            .bootstrap
            .iter()
            .filter(|spec| self.layout.project_file(spec).is_some())
            .cloned()
            .collect();
        if local.is_empty() {
            return Ok(ModuleGraph::default());
        }
        resolve(&local, self.info.as_ref(), &self.layout.ref_dir)
    }

    /// (id, fingerprint) in graph order, and the local fingerprint table.
    fn observe(
        &self,
        graph: &ModuleGraph,
        bootstrap: &ModuleGraph,
    ) -> (Vec<(String, Option<String>)>, BTreeMap<String, String>) {
        let mut modules = Vec::with_capacity(graph.len() + bootstrap.len());
        let mut locals = BTreeMap::new();
        let mut seen = FxHashSet::default();
        for module in graph.modules().iter().chain(bootstrap.modules()) {
            let id = self.layout.public_id(&module.specifier);
            if !seen.insert(id.clone()) {
                continue;
            }
            let fingerprint = module.fingerprint.map(|h| h.to_hex());
            if let Some(fingerprint) = &fingerprint {
                locals.insert(id.clone(), fingerprint.clone());
            }
            modules.push((id, fingerprint));
        }
        (modules, locals)
    }

    fn bootstrap_entry(&self, spec: &str) -> EntryPoint {
        self.layout
            .project_file(spec)
            .and_then(|path| file_url(&path))
            .map(|url| EntryPoint::new(self.layout.public_id(&url), self.layout.bundle_input(&url)))
            .unwrap_or_else(|| EntryPoint::new(spec, spec))
    }

    /// Bootstrap modules, client-crossing targets and external pins.
    fn client_request(&self, graph: &ModuleGraph, client_targets: &[String], aliases: &[String]) -> BundleRequest {
        let layout = &self.layout;
        let mut entries: Vec<EntryPoint> = Vec::new();
        let candidates = self
            .options
            .bootstrap
            .iter()
            .map(|spec| self.bootstrap_entry(spec))
            .chain(
                client_targets
                    .iter()
                    .map(|t| EntryPoint::new(layout.public_id(t), layout.bundle_input(t))),
            )
            .chain(self.options.external.iter().map(|pin| EntryPoint::new(pin, pin)));
        for entry in candidates {
            if !entries.iter().any(|e| e.id == entry.id) {
                entries.push(entry);
            }
        }

        // Resolved server module file → generated stub
        let mut stub_table = BTreeMap::new();
        for module in graph.modules().iter().filter(|m| m.directive.is_client()) {
            for dep in module.dependencies.iter().filter(|d| aliases.contains(&d.target)) {
                let Some(file) = file_path(&dep.target) else {
                    debug!("bundle"; "remote server module `{}` stays external", dep.target);
                    continue;
                };
                let stub = layout.stub_path(&layout.public_id(&dep.target));
                stub_table.insert(file.display().to_string(), stub.display().to_string());
            }
        }

        BundleRequest {
            cwd: self.options.root.clone(),
            entries,
            out_dir: layout.dist_dir.clone(),
            stubs: stub_table.into_iter().collect(),
            minify: self.options.minify,
        }
    }

    /// Exports of server-crossing targets; memoized while inputs are unchanged.
    fn server_exports(
        &self,
        server_targets: &[String],
        locals: &BTreeMap<String, String>,
        previous: Option<&Snapshot>,
    ) -> Result<BTreeMap<String, Vec<String>>, BuildError> {
        if server_targets.is_empty() {
            return Ok(BTreeMap::new());
        }
        let layout = &self.layout;
        let ids: BTreeSet<String> = server_targets.iter().map(|t| layout.public_id(t)).collect();
        if let Some(previous) = previous
            && previous.locals == *locals
            && previous.server_exports.keys().eq(ids.iter())
        {
            debug!("analyze"; "reusing exports of {} server modules", ids.len());
            return Ok(previous.server_exports.clone());
        }

        let request = BundleRequest {
            cwd: self.options.root.clone(),
            entries: server_targets
                .iter()
                .map(|t| EntryPoint::new(layout.public_id(t), layout.bundle_input(t)))
                .collect(),
            out_dir: layout.analyze_dir.clone(),
            stubs: Vec::new(),
            minify: false,
        };
        let result = self.bundler.analyze(&request).map_err(bundle_error)?;
        Ok(result
            .entries
            .into_iter()
            .map(|(id, output)| (id, output.exports))
            .collect())
    }

    /// Import-map entries this run's scopes require.
    fn expected_scopes(&self, scopes: &[Scope]) -> ScopeTable {
        let layout = &self.layout;
        let mut table = ScopeTable::new();
        for scope in scopes {
            let entries = table.entry(layout.scope_key(&scope.owner)).or_default();
            for edge in &scope.edges {
                let proxy = layout.proxy_path(&layout.public_id(&edge.target));
                entries.insert(
                    layout.entry_key(&edge.literal, &edge.target),
                    layout.map_relative(&proxy),
                );
            }
        }
        table
    }
}

#[cfg(test)]
mod tests;
