//! esbuild driver.
//!
//! esbuild runs behind a small embedded script (`embed/driver.mjs`) hosted by
//! the configured JavaScript runtime (e.g. `["deno", "run", "-A"]`). The script
//! holds one `esbuild.context()` for the lifetime of a [`BundleContext`], so a
//! rebuild only re-processes what changed:
//!
//! ```text
//! splitbuild ──setup json──► driver.mjs ──esbuild.context()
//!            ──"rebuild"───►            ──ctx.rebuild()
//!            ◄──metafile────
//!            ──"dispose"───►            ──ctx.dispose(), exit
//! ```
//!
//! Client imports of `"use server"` modules are replaced by their stubs in an
//! `onResolve` plugin. The plugin resolves every import first and matches the
//! resolved file, so relative and bare imports of the same module both hit.

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout};

use super::{BundleContext, BundleRequest, BundleResult, Bundler, EntryOutput, EntryPoint, Metafile};
use crate::debug;
use crate::utils::exec::Cmd;
use crate::utils::path::relative_slash;

/// Deno-style specifiers esbuild cannot resolve; left as runtime imports.
const EXTERNAL_SCHEMES: [&str; 5] = ["npm:*", "jsr:*", "node:*", "https:*", "http:*"];

const DRIVER: &str = include_str!("embed/driver.mjs");

#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    /// JavaScript runtime command; the driver script path is appended.
    runtime: Vec<String>,
    /// Specifier the driver imports esbuild from.
    module: String,
}

/// Which kind of run this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Server-side export discovery.
    Analyze,
    /// Client bundles.
    Bundle,
}

impl EsbuildBundler {
    pub fn new(runtime: Vec<String>, module: impl Into<String>) -> Self {
        Self {
            runtime,
            module: module.into(),
        }
    }

    /// First line sent to the driver: esbuild options and the stub table.
    fn setup(&self, request: &BundleRequest, mode: Mode) -> Value {
        let entry_points: Map<String, Value> = request
            .entries
            .iter()
            .map(|e| (e.name(), Value::from(e.input.clone())))
            .collect();

        let mut options = json!({
            "absWorkingDir": request.cwd.display().to_string(),
            "entryPoints": entry_points,
            "bundle": true,
            "format": "esm",
            "treeShaking": true,
            "entryNames": "[name]-[hash]",
            "chunkNames": "chunk-[hash]",
            "outdir": request.out_dir.display().to_string(),
            "metafile": true,
            "logLevel": "warning",
            "color": false,
            "external": EXTERNAL_SCHEMES,
            "minify": request.minify,
        });
        match mode {
            Mode::Analyze => {
                options["platform"] = "node".into();
                options["packages"] = "external".into();
            }
            Mode::Bundle => {
                options["platform"] = "browser".into();
                options["splitting"] = true.into();
            }
        }

        let stubs: Map<String, Value> = request
            .stubs
            .iter()
            .map(|(file, stub)| (file.clone(), Value::from(stub.clone())))
            .collect();

        json!({
            "esbuild": self.module,
            "options": options,
            "stubs": stubs,
        })
    }

    fn start(&self, request: &BundleRequest, mode: Mode) -> Result<Driver> {
        fs::create_dir_all(&request.out_dir)?;
        let script = driver_path(&request.out_dir);
        if fs::read_to_string(&script).ok().as_deref() != Some(DRIVER) {
            fs::write(&script, DRIVER)
                .with_context(|| format!("failed to write {}", script.display()))?;
        }

        let mut child = Cmd::from_slice(&self.runtime)
            .arg(&script)
            .cwd(&request.cwd)
            .envs([("NO_COLOR", "1")])
            .spawn_piped()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            bail!("bundler driver started without pipes");
        };

        let mut driver = Driver {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        driver.send(&self.setup(request, mode).to_string())?;
        Ok(driver)
    }
}

/// Driver script lives beside the output directory so it is never mistaken for a bundle.
fn driver_path(out_dir: &Path) -> PathBuf {
    let mut name = out_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".driver.mjs");
    out_dir.with_file_name(name)
}

/// One line written by the driver per `rebuild`.
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    metafile: Option<Metafile>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Running driver process.
struct Driver {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Driver {
    fn send(&mut self, line: &str) -> Result<()> {
        writeln!(self.stdin, "{line}")
            .and_then(|()| self.stdin.flush())
            .context("bundler driver is not running")
    }

    fn rebuild(&mut self) -> Result<Metafile> {
        self.send("rebuild")?;
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            let status = self.child.wait()?;
            bail!("bundler driver exited with {status}");
        }

        let reply: Reply = serde_json::from_str(&line).context("invalid bundler driver reply")?;
        if !reply.errors.is_empty() {
            bail!("bundling failed:\n{}", reply.errors.join("\n"));
        }
        reply.metafile.context("bundler driver replied without a metafile")
    }

    fn dispose(mut self) {
        if self.send("dispose").is_ok() {
            let _ = self.child.wait();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Map metafile outputs back to entry ids.
fn collect(meta: &Metafile, request: &BundleRequest) -> Result<BundleResult> {
    let by_name: FxHashMap<String, &EntryPoint> =
        request.entries.iter().map(|e| (e.name(), e)).collect();

    let mut result = BundleResult::default();
    for (path, name, exports) in meta.entry_outputs() {
        let Some(entry) = by_name.get(name) else {
            continue;
        };
        let output = relative_slash(&request.cwd.join(path), &request.out_dir);
        result.entries.insert(
            entry.id.clone(),
            EntryOutput {
                path: output,
                exports: exports.to_vec(),
            },
        );
    }

    if let Some(missing) = request
        .entries
        .iter()
        .find(|e| !result.entries.contains_key(&e.id))
    {
        bail!("bundler produced no output for `{}`", missing.id);
    }
    Ok(result)
}

impl Bundler for EsbuildBundler {
    fn analyze(&self, request: &BundleRequest) -> Result<BundleResult> {
        let result = self.start(request, Mode::Analyze).and_then(|mut driver| {
            let meta = driver.rebuild();
            driver.dispose();
            collect(&meta?, request)
        });
        // Analysis bundles are scratch output
        let _ = fs::remove_dir_all(&request.out_dir);
        result
    }

    fn context(&self, request: BundleRequest) -> Result<Box<dyn BundleContext>> {
        debug!("bundle"; "new context with {} entries, {} stubs", request.entries.len(), request.stubs.len());
        let driver = self.start(&request, Mode::Bundle)?;
        Ok(Box::new(EsbuildContext { driver, request }))
    }
}

struct EsbuildContext {
    driver: Driver,
    request: BundleRequest,
}

impl BundleContext for EsbuildContext {
    fn request(&self) -> &BundleRequest {
        &self.request
    }

    fn rebuild(&mut self) -> Result<BundleResult> {
        let meta = self.driver.rebuild()?;
        collect(&meta, &self.request)
    }

    fn dispose(self: Box<Self>) {
        debug!("bundle"; "context with {} entries disposed", self.request.entries.len());
        self.driver.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(root: &Path) -> BundleRequest {
        BundleRequest {
            cwd: root.to_path_buf(),
            entries: vec![
                EntryPoint::new("/components/Counter.tsx", "./components/Counter.tsx"),
                EntryPoint::new("react", "react"),
            ],
            out_dir: root.join(".splitbuild/default/dist"),
            stubs: Vec::new(),
            minify: false,
        }
    }

    fn bundler(runtime: Vec<String>) -> EsbuildBundler {
        EsbuildBundler::new(runtime, "npm:esbuild")
    }

    /// Metafile naming both entries of [`request`] plus a shared chunk.
    fn metafile_json(request: &BundleRequest) -> String {
        let counter = request.entries[0].name();
        let react = request.entries[1].name();
        format!(
            r#"{{"outputs": {{
                ".splitbuild/default/dist/{counter}-AAAA1111.js": {{"entryPoint": "components/Counter.tsx", "exports": ["default"]}},
                ".splitbuild/default/dist/{react}-BBBB2222.js": {{"entryPoint": "node_modules/react/index.js", "exports": ["useState"]}},
                ".splitbuild/default/dist/chunk-CCCC3333.js": {{"exports": []}}
            }}}}"#
        )
    }

    #[test]
    fn test_driver_beside_out_dir() {
        assert_eq!(
            driver_path(Path::new("/p/.splitbuild/default/dist")),
            PathBuf::from("/p/.splitbuild/default/dist.driver.mjs")
        );
    }

    #[test]
    fn test_collect_maps_names_to_ids() {
        let request = request(Path::new("/project"));
        let counter = request.entries[0].name();
        let meta: Metafile = serde_json::from_str(&metafile_json(&request)).unwrap();
        let result = collect(&meta, &request).unwrap();

        let counter_out = &result.entries["/components/Counter.tsx"];
        assert_eq!(counter_out.path, format!("{counter}-AAAA1111.js"));
        assert_eq!(counter_out.exports, ["default"]);
        assert_eq!(result.entries["react"].exports, ["useState"]);
    }

    #[test]
    fn test_collect_missing_entry_fails() {
        let meta = Metafile::default();
        assert!(collect(&meta, &request(Path::new("/project"))).is_err());
    }

    #[test]
    fn test_setup_carries_resolved_stub_table() {
        let mut request = request(Path::new("/project"));
        request.minify = true;
        request.stubs = vec![(
            "/project/actions.ts".into(),
            "/project/.splitbuild/default/ref/actions.ts.stub.js".into(),
        )];

        let setup = bundler(vec!["deno".into()]).setup(&request, Mode::Bundle);
        assert_eq!(setup["esbuild"], "npm:esbuild");
        assert_eq!(
            setup["stubs"]["/project/actions.ts"],
            "/project/.splitbuild/default/ref/actions.ts.stub.js"
        );

        let options = &setup["options"];
        assert_eq!(options["platform"], "browser");
        assert_eq!(options["splitting"], true);
        assert_eq!(options["minify"], true);
        assert_eq!(options["absWorkingDir"], "/project");
        let counter = request.entries[0].name();
        assert_eq!(options["entryPoints"][counter.as_str()], "./components/Counter.tsx");
    }

    #[test]
    fn test_analyze_setup_keeps_packages_external() {
        let setup = bundler(vec!["deno".into()]).setup(&request(Path::new("/project")), Mode::Analyze);
        assert_eq!(setup["options"]["platform"], "node");
        assert_eq!(setup["options"]["packages"], "external");
        assert!(setup["options"].get("splitting").is_none());
        assert_eq!(setup["stubs"], json!({}));
    }

    #[test]
    fn test_driver_resolves_before_stubbing() {
        assert!(DRIVER.contains("build.onResolve({ filter: /.*/ }"));
        assert!(DRIVER.contains("stubs[resolved.path]"));
        assert!(DRIVER.contains("esbuild.context("));
    }

    /// Shell stand-in for the runtime: logs every stdin line, answers `rebuild`.
    #[cfg(unix)]
    fn fake_runtime(temp: &TempDir, reply: &str) -> (Vec<String>, PathBuf) {
        let log = temp.path().join("driver.log");
        let script = temp.path().join("runtime.sh");
        fs::write(
            &script,
            format!(
                "echo start >> '{log}'\n\
                 while IFS= read -r line; do\n\
                 printf '%s\\n' \"$line\" >> '{log}'\n\
                 case \"$line\" in\n\
                 rebuild) printf '%s\\n' '{reply}' ;;\n\
                 dispose) exit 0 ;;\n\
                 esac\n\
                 done\n",
                log = log.display(),
                reply = reply.replace('\n', " "),
            ),
        )
        .unwrap();
        (vec!["sh".into(), script.display().to_string()], log)
    }

    #[cfg(unix)]
    fn log_lines(log: &Path) -> Vec<String> {
        fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_context_process_is_resident() {
        let temp = TempDir::new().unwrap();
        let request = request(temp.path());
        let reply = format!(r#"{{"metafile": {}}}"#, metafile_json(&request));
        let (runtime, log) = fake_runtime(&temp, &reply);

        let mut context = bundler(runtime).context(request.clone()).unwrap();
        let first = context.rebuild().unwrap();
        let second = context.rebuild().unwrap();
        assert_eq!(first, second);
        assert!(first.entries.contains_key("/components/Counter.tsx"));
        context.dispose();

        let lines = log_lines(&log);
        assert_eq!(lines.iter().filter(|l| *l == "start").count(), 1);
        let setup: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(setup["options"]["platform"], "browser");
        assert_eq!(&lines[2..], ["rebuild", "rebuild", "dispose"]);
        assert!(driver_path(&request.out_dir).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_analyze_runs_once_and_removes_scratch() {
        let temp = TempDir::new().unwrap();
        let request = request(temp.path());
        let reply = format!(r#"{{"metafile": {}}}"#, metafile_json(&request));
        let (runtime, log) = fake_runtime(&temp, &reply);

        let result = bundler(runtime).analyze(&request).unwrap();
        assert_eq!(result.entries["react"].exports, ["useState"]);
        assert!(!request.out_dir.exists());

        let lines = log_lines(&log);
        let setup: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(setup["options"]["packages"], "external");
        assert_eq!(&lines[2..], ["rebuild", "dispose"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_error_reply_fails_rebuild() {
        let temp = TempDir::new().unwrap();
        let (runtime, _log) = fake_runtime(&temp, r#"{"errors": ["app.tsx:3: Could not resolve \"./gone.ts\""]}"#);

        let mut context = bundler(runtime).context(request(temp.path())).unwrap();
        let err = context.rebuild().unwrap_err();
        assert!(format!("{err:#}").contains("Could not resolve"));
        context.dispose();
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_driver_fails_rebuild() {
        let temp = TempDir::new().unwrap();
        let runtime = vec!["sh".into(), "-c".into(), "exit 3".into()];

        // The setup write or the first rebuild notices, whichever comes first
        let result = bundler(runtime)
            .context(request(temp.path()))
            .and_then(|mut context| context.rebuild());
        assert!(result.is_err());
    }
}
