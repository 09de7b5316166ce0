use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use jwalk::WalkDir;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tempfile::TempDir;

use super::*;
use crate::bundler::{BundleResult, EntryOutput};
use crate::module::{InfoDependency, InfoModule, InfoReport, InfoTarget};
use crate::utils::path::normalize_path;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone, Default)]
struct FakeInfo {
    reports: Arc<Mutex<FxHashMap<String, InfoReport>>>,
}

impl ModuleInfo for FakeInfo {
    fn info(&self, entry: &str) -> anyhow::Result<InfoReport> {
        self.reports
            .lock()
            .get(entry)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("module not found: {entry}"))
    }
}

#[derive(Default)]
struct Calls {
    analyze: AtomicUsize,
    context: AtomicUsize,
    rebuild: AtomicUsize,
    dispose: AtomicUsize,
    stubs: Mutex<Vec<(String, String)>>,
    /// Bundler calls currently running, and the most ever seen at once.
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Calls {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Every bundler invocation.
    fn bundler(&self) -> usize {
        Self::count(&self.analyze) + Self::count(&self.context) + Self::count(&self.rebuild)
    }

    /// Run `f` as one bundler call, tracking overlap with other calls.
    fn track<T>(&self, f: impl FnOnce() -> T) -> T {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let result = f();
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn exports_of(id: &str) -> Vec<String> {
    let names: &[&str] = match id {
        "/actions.ts" => &["save"],
        "/components/Counter.tsx" => &["default", "Step"],
        _ => &["default"],
    };
    names.iter().map(|s| (*s).to_string()).collect()
}

fn outputs(request: &BundleRequest) -> BundleResult {
    BundleResult {
        entries: request
            .entries
            .iter()
            .map(|e| {
                let output = EntryOutput {
                    path: format!("{}-H1.js", e.name()),
                    exports: exports_of(&e.id),
                };
                (e.id.clone(), output)
            })
            .collect(),
    }
}

struct FakeBundler {
    calls: Arc<Calls>,
}

struct FakeContext {
    request: BundleRequest,
    calls: Arc<Calls>,
}

impl Bundler for FakeBundler {
    fn analyze(&self, request: &BundleRequest) -> anyhow::Result<BundleResult> {
        self.calls.analyze.fetch_add(1, Ordering::SeqCst);
        Ok(self.calls.track(|| outputs(request)))
    }

    fn context(&self, request: BundleRequest) -> anyhow::Result<Box<dyn BundleContext>> {
        self.calls.context.fetch_add(1, Ordering::SeqCst);
        *self.calls.stubs.lock() = request.stubs.clone();
        Ok(Box::new(FakeContext {
            request,
            calls: self.calls.clone(),
        }))
    }
}

impl BundleContext for FakeContext {
    fn request(&self) -> &BundleRequest {
        &self.request
    }

    fn rebuild(&mut self) -> anyhow::Result<BundleResult> {
        self.calls.rebuild.fetch_add(1, Ordering::SeqCst);
        Ok(self.calls.track(|| outputs(&self.request)))
    }

    fn dispose(self: Box<Self>) {
        self.calls.dispose.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Fixture
// ============================================================================

const APP: &str = "import Counter from \"./components/Counter.tsx\";\nimport { save } from \"./actions.ts\";\n";
const APP_WITHOUT_COUNTER: &str = "import { save } from \"./actions.ts\";\n";
const DENO_JSON: &str = r#"{
  "imports": { "react": "npm:react" },
  "scopes": { "./app.tsx": { "lodash": "https://esm.sh/lodash" } }
}
"#;

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    info: FakeInfo,
    calls: Arc<Calls>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = normalize_path(temp.path());
        let fixture = Self {
            _temp: temp,
            root,
            info: FakeInfo::default(),
            calls: Arc::new(Calls::default()),
        };

        fixture.write("app.tsx", APP);
        fixture.write(
            "components/Counter.tsx",
            "\"use client\";\nimport { save } from \"../actions.ts\";\nexport default function Counter() {}\n",
        );
        fixture.write("actions.ts", "'use server';\nexport async function save() {}\n");
        fixture.write("client.tsx", "import { hydrate } from \"./runtime.ts\";\nhydrate();\n");
        fixture.write("runtime.ts", "export function hydrate() {}\n");
        fixture.write("deno.json", DENO_JSON);

        fixture.register_app(true);
        fixture.register(
            "client.tsx",
            &[
                ("client.tsx", vec![("./runtime.ts", "runtime.ts")]),
                ("runtime.ts", vec![]),
            ],
        );
        fixture
    }

    fn register_app(&self, with_counter: bool) {
        let mut app = vec![("./actions.ts", "actions.ts")];
        let mut modules = Vec::new();
        if with_counter {
            app.insert(0, ("./components/Counter.tsx", "components/Counter.tsx"));
            modules.push((
                "components/Counter.tsx",
                vec![("../actions.ts", "actions.ts")],
            ));
        }
        modules.insert(0, ("app.tsx", app));
        modules.push(("actions.ts", vec![]));
        self.register("app.tsx", &modules);
    }

    fn url(&self, rel: &str) -> String {
        file_url(&self.root.join(rel)).unwrap()
    }

    fn register(&self, entry: &str, modules: &[(&str, Vec<(&str, &str)>)]) {
        let report = InfoReport {
            roots: vec![self.url(modules[0].0)],
            modules: modules
                .iter()
                .map(|(path, deps)| InfoModule {
                    specifier: self.url(path),
                    local: Some(self.root.join(path)),
                    media_type: Some(if path.ends_with(".tsx") { "TSX" } else { "TypeScript" }.into()),
                    dependencies: deps
                        .iter()
                        .map(|(literal, target)| InfoDependency {
                            specifier: (*literal).into(),
                            code: Some(InfoTarget {
                                specifier: self.url(target),
                            }),
                        })
                        .collect(),
                    error: None,
                })
                .collect(),
            redirects: FxHashMap::default(),
        };
        self.info.reports.lock().insert(entry.into(), report);
    }

    fn options(&self) -> BuildOptions {
        BuildOptions {
            root: self.root.clone(),
            entries: vec!["app.tsx".into()],
            bootstrap: vec!["client.tsx".into()],
            external: vec!["npm:react".into()],
            import_map: self.root.join("deno.json"),
            out_dir: self.root.join(".splitbuild"),
            read_only: Some(false),
            concurrency: 2,
            ..BuildOptions::default()
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(self.options())
    }

    fn orchestrator_with(&self, options: BuildOptions) -> Orchestrator {
        Orchestrator::new(
            options,
            Box::new(self.info.clone()),
            Box::new(PrologueReader::new(Arc::new(RateLimiter::unlimited()))),
            Box::new(FakeBundler {
                calls: self.calls.clone(),
            }),
        )
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    fn import_map(&self) -> Value {
        serde_json::from_str(&self.read("deno.json")).unwrap()
    }

    /// Every file under the root with its bytes and mtime.
    fn tree(&self) -> BTreeMap<PathBuf, (Vec<u8>, SystemTime)> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let path = e.path();
                let meta = fs::metadata(&path).unwrap();
                let content = fs::read(&path).unwrap();
                (path, (content, meta.modified().unwrap()))
            })
            .collect()
    }
}

const REF: &str = ".splitbuild/default/ref";

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_first_build_writes_references_and_import_map() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();

    let outcome = orchestrator.build();
    assert!(matches!(outcome, BuildOutcome::Rebuilt(_)), "{outcome:?}");

    let client_ref = fx.read(&format!("{REF}/components/Counter.tsx.client.js"));
    assert!(client_ref.contains("await import(\"../../../../components/Counter.tsx\")"));
    assert!(client_ref.contains("clientReference(\"/components/Counter.tsx\", \"Step\")"));

    let proxy = fx.read(&format!("{REF}/components/Counter.tsx.js"));
    assert!(proxy.contains("export { default } from \"./Counter.tsx.client.js\";"));

    let action_ref = fx.read(&format!("{REF}/actions.ts.server.js"));
    assert!(action_ref.contains("import * as __module from \"../../../actions.ts\";"));
    assert!(action_ref.contains("serverReference(__module[\"save\"], \"/actions.ts\", \"save\")"));

    let stub = fx.read(&format!("{REF}/actions.ts.stub.js"));
    assert!(stub.contains("callServer(\"/actions.ts\", \"save\", args)"));
    let stub_path = fx.path(&format!("{REF}/actions.ts.stub.js"));
    assert_eq!(
        *fx.calls.stubs.lock(),
        vec![(
            fx.path("actions.ts").display().to_string(),
            stub_path.display().to_string()
        )]
    );

    let map = fx.import_map();
    let scope = &map["scopes"]["./app.tsx"];
    assert_eq!(scope["./components/Counter.tsx"], "./.splitbuild/default/ref/components/Counter.tsx.js");
    assert_eq!(scope["./actions.ts"], "./.splitbuild/default/ref/actions.ts.js");
    assert_eq!(scope["lodash"], "https://esm.sh/lodash");
    assert_eq!(map["imports"]["react"], "npm:react");
    // New proxies: runtimes must reload the map
    assert!(map["updateId"].is_string());

    let snapshot = outcome.snapshot().unwrap();
    assert_eq!(snapshot.bootstrap.len(), 1);
    assert_eq!(snapshot.bootstrap[0].0, "/client.tsx");
    assert!(snapshot.bootstrap[0].1.starts_with("/_splitbuild/default/client_"));
    assert!(snapshot.externals["npm:react"].starts_with("/_splitbuild/default/react_"));
    assert!(snapshot.output_for("/components/Counter.tsx").is_some());
    assert_eq!(snapshot.artifacts["/actions.ts"].output, None);
    assert!(snapshot.observes("/runtime.ts"));
    assert!(snapshot.observes("/app.tsx"));
    assert!(orchestrator.handle().is_ready());
}

#[test]
fn test_second_run_is_idempotent() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    assert!(matches!(orchestrator.build(), BuildOutcome::Rebuilt(_)));

    let calls = fx.calls.bundler();
    let before = fx.tree();
    assert!(matches!(orchestrator.build(), BuildOutcome::ServedFromCache(_)));
    assert_eq!(fx.calls.bundler(), calls);
    assert_eq!(fx.tree(), before);

    // A new process starts from the persisted snapshot
    let restarted = fx.orchestrator();
    assert!(matches!(restarted.build(), BuildOutcome::ServedFromCache(_)));
    assert_eq!(fx.calls.bundler(), calls);
    assert_eq!(fx.tree(), before);
}

#[test]
fn test_hash_independent_of_root() {
    let a = Fixture::new();
    let b = Fixture::new();
    assert_ne!(a.root, b.root);

    let hash_a = a.orchestrator().build().into_result().unwrap().hash.clone();
    let hash_b = b.orchestrator().build().into_result().unwrap().hash.clone();
    assert_eq!(hash_a, hash_b);

    let file = format!("{REF}/components/Counter.tsx.client.js");
    assert_eq!(a.read(&file), b.read(&file));
}

#[test]
fn test_stale_entry_set_disposes_context_and_collects_garbage() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    assert!(!orchestrator.build().is_failed());
    assert_eq!(Calls::count(&fx.calls.context), 1);

    let foreign = format!("{REF}/components/notes.js");
    fx.write(&foreign, "export const handWritten = true;\n");

    fx.write("app.tsx", APP_WITHOUT_COUNTER);
    fx.register_app(false);

    let outcome = orchestrator.build();
    assert!(matches!(outcome, BuildOutcome::Rebuilt(_)), "{outcome:?}");
    assert_eq!(Calls::count(&fx.calls.dispose), 1);
    assert_eq!(Calls::count(&fx.calls.context), 2);

    assert!(!fx.path(&format!("{REF}/components/Counter.tsx.js")).exists());
    assert!(!fx.path(&format!("{REF}/components/Counter.tsx.client.js")).exists());
    assert!(!fx.path(&format!("{REF}/actions.ts.stub.js")).exists());
    assert!(fx.path(&format!("{REF}/actions.ts.js")).exists());
    assert!(fx.path(&foreign).exists());

    let map = fx.import_map();
    let scope = map["scopes"]["./app.tsx"].as_object().unwrap();
    assert!(!scope.contains_key("./components/Counter.tsx"));
    assert!(scope.contains_key("./actions.ts"));
    assert!(scope.contains_key("lodash"));
}

#[test]
fn test_unchanged_inputs_reuse_context() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    orchestrator.build();

    // Touching a module's content forces a real build on the same entry set
    fx.write("runtime.ts", "export function hydrate() { return 1; }\n");
    assert!(matches!(orchestrator.build(), BuildOutcome::Rebuilt(_)));
    assert_eq!(Calls::count(&fx.calls.context), 1);
    assert_eq!(Calls::count(&fx.calls.rebuild), 2);
    assert_eq!(Calls::count(&fx.calls.dispose), 0);
}

#[test]
fn test_same_literal_to_different_server_modules_gets_two_stubs() {
    let fx = Fixture::new();
    fx.write(
        "app.tsx",
        "import Button from \"./components/a/Button.tsx\";\nimport Panel from \"./components/b/Panel.tsx\";\n",
    );
    for dir in ["a", "b"] {
        fx.write(&format!("components/{dir}/actions.ts"), "'use server';\nexport async function save() {}\n");
    }
    fx.write("components/a/Button.tsx", "\"use client\";\nimport { save } from \"./actions.ts\";\n");
    fx.write("components/b/Panel.tsx", "\"use client\";\nimport { save } from \"./actions.ts\";\n");
    fx.register(
        "app.tsx",
        &[
            (
                "app.tsx",
                vec![
                    ("./components/a/Button.tsx", "components/a/Button.tsx"),
                    ("./components/b/Panel.tsx", "components/b/Panel.tsx"),
                ],
            ),
            ("components/a/Button.tsx", vec![("./actions.ts", "components/a/actions.ts")]),
            ("components/a/actions.ts", vec![]),
            ("components/b/Panel.tsx", vec![("./actions.ts", "components/b/actions.ts")]),
            ("components/b/actions.ts", vec![]),
        ],
    );

    let outcome = fx.orchestrator().build();
    assert!(matches!(outcome, BuildOutcome::Rebuilt(_)), "{outcome:?}");

    let stub = |dir: &str| {
        (
            fx.path(&format!("components/{dir}/actions.ts")).display().to_string(),
            fx.path(&format!("{REF}/components/{dir}/actions.ts.stub.js")).display().to_string(),
        )
    };
    assert_eq!(*fx.calls.stubs.lock(), vec![stub("a"), stub("b")]);
    assert!(fx.path(&format!("{REF}/components/a/actions.ts.stub.js")).exists());
    assert!(fx.path(&format!("{REF}/components/b/actions.ts.stub.js")).exists());
}

#[test]
fn test_concurrent_builds_are_serialized() {
    let fx = Fixture::new();
    let orchestrator = Arc::new(fx.orchestrator());
    let barrier = Arc::new(std::sync::Barrier::new(2));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                orchestrator.build()
            })
        })
        .collect();
    let outcomes: Vec<BuildOutcome> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let rebuilt = outcomes.iter().filter(|o| matches!(o, BuildOutcome::Rebuilt(_))).count();
    let cached = outcomes
        .iter()
        .filter(|o| matches!(o, BuildOutcome::ServedFromCache(_)))
        .count();
    assert_eq!((rebuilt, cached), (1, 1), "{outcomes:?}");
    assert_eq!(Calls::count(&fx.calls.context), 1);
    assert_eq!(Calls::count(&fx.calls.rebuild), 1);
    assert_eq!(Calls::count(&fx.calls.dispose), 0);
    assert_eq!(Calls::count(&fx.calls.max_active), 1);
    assert_eq!(
        outcomes[0].snapshot().unwrap().hash,
        outcomes[1].snapshot().unwrap().hash
    );
}

#[test]
fn test_missing_import_map_entries_force_rebuild() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    orchestrator.build();
    let analyzed = Calls::count(&fx.calls.analyze);

    fx.write("deno.json", "{ \"imports\": { \"react\": \"npm:react\" } }\n");
    assert!(matches!(orchestrator.build(), BuildOutcome::Rebuilt(_)));
    // Server exports are memoized; only the client bundle is rebuilt
    assert_eq!(Calls::count(&fx.calls.analyze), analyzed);
    assert_eq!(Calls::count(&fx.calls.rebuild), 2);

    let map = fx.import_map();
    assert!(map["scopes"]["./app.tsx"]["./actions.ts"].is_string());
    // Proxies already existed: no restart stamp
    assert!(map.get("updateId").is_none());
}

#[test]
fn test_read_only_requires_snapshot() {
    let fx = Fixture::new();
    let read_only = BuildOptions {
        read_only: Some(true),
        ..fx.options()
    };

    let outcome = fx.orchestrator_with(read_only.clone()).build();
    assert!(matches!(
        outcome,
        BuildOutcome::Failed(BuildError::ReadOnlyWithoutSnapshot(_))
    ));
    assert_eq!(fx.calls.bundler(), 0);

    fx.orchestrator().build();
    let calls = fx.calls.bundler();
    let before = fx.tree();

    let deployed = fx.orchestrator_with(read_only);
    assert!(matches!(deployed.build(), BuildOutcome::ServedFromCache(_)));
    assert!(deployed.handle().is_ready());
    assert_eq!(deployed.handle().bootstrap_paths().len(), 1);
    assert_eq!(fx.calls.bundler(), calls);
    assert_eq!(fx.tree(), before);
}

#[test]
fn test_failed_build_keeps_previous_snapshot() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let first = orchestrator.build().into_result().unwrap();

    fx.info.reports.lock().remove("app.tsx");
    let outcome = orchestrator.build();
    assert!(matches!(outcome, BuildOutcome::Failed(BuildError::Resolution { .. })));

    let handle = orchestrator.handle();
    assert_eq!(handle.snapshot().unwrap().hash, first.hash);
    let persisted = Snapshot::load(&orchestrator.layout().snapshot).unwrap().unwrap();
    assert_eq!(persisted.hash, first.hash);
}

#[test]
fn test_observes_recorded_modules() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    assert!(orchestrator.observes(&fx.path("anything.ts")));

    orchestrator.build();
    assert!(orchestrator.observes(&fx.path("components/Counter.tsx")));
    assert!(orchestrator.observes(&fx.path("runtime.ts")));
    assert!(orchestrator.observes(&fx.path("deno.json")));
    assert!(!orchestrator.observes(&fx.path("README.md")));
    assert!(!orchestrator.observes(&fx.path(&format!("{REF}/actions.ts.js"))));
}

#[test]
fn test_handle_rewrites_with_published_outputs() {
    use std::io::Read;

    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let snapshot = orchestrator.build().into_result().unwrap();
    let output = snapshot.output_for("/components/Counter.tsx").unwrap().to_string();

    let wire = format!("1:I[\"{}\",[],\"default\"]\n", fx.url("components/Counter.tsx"));
    let mut out = String::new();
    orchestrator
        .handle()
        .rewrite(wire.as_bytes())
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, format!("1:I[\"{output}\",[],\"default\"]\n"));
}

#[test]
fn test_profiles_keep_separate_outputs() {
    let fx = Fixture::new();
    fx.orchestrator().build();
    let prod = BuildOptions {
        profile: "prod".into(),
        minify: true,
        ..fx.options()
    };
    assert!(matches!(fx.orchestrator_with(prod).build(), BuildOutcome::Rebuilt(_)));

    assert!(fx.path(".splitbuild/default/snapshot.json").exists());
    assert!(fx.path(".splitbuild/prod/snapshot.json").exists());
    assert!(fx.path(&format!("{REF}/actions.ts.js")).exists());
    assert!(fx.path(".splitbuild/prod/ref/actions.ts.js").exists());
}
