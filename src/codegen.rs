//! Reference code generation.
//!
//! Pure functions of (module id, export names): identical input yields
//! byte-identical text, which is what lets the orchestrator skip writes of
//! unchanged files. Every generated file starts with [`GENERATED_MARKER`];
//! garbage collection only ever deletes files carrying it.
//!
//! A `default` export cannot be declared by name, so it is always bound
//! locally first:
//!
//! ```js
//! const __default = clientReference("/components/Counter.tsx", "default");
//! export { __default as default };
//! ```

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::LazyLock;

/// First line of every generated file.
pub const GENERATED_MARKER: &str = "// @generated by splitbuild. Do not edit.";

/// Whether `content` was produced by this module.
pub fn is_generated(content: &[u8]) -> bool {
    content.starts_with(GENERATED_MARKER.as_bytes())
}

/// Global flag the client runtime sets before loading server-rendered modules.
const CLIENT_GUARD: &str = "globalThis.__SPLITBUILD_CLIENT__";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"));

/// Export names that can be emitted; others cannot be declared in JS.
fn emittable(exports: &[String]) -> impl Iterator<Item = &str> {
    exports
        .iter()
        .map(String::as_str)
        .filter(|name| *name == "default" || IDENTIFIER.is_match(name))
}

/// JS string literal.
fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn header(out: &mut String, import_name: &str, runtime: &str) {
    out.push_str(GENERATED_MARKER);
    out.push('\n');
    let _ = writeln!(out, "import {{ {import_name} }} from {};", quote(runtime));
}

/// Emit `name = value` as an export, routing `default` through a local binding.
fn export_binding(out: &mut String, name: &str, value: &str) {
    if name == "default" {
        let _ = writeln!(out, "const __default = {value};");
        out.push_str("export { __default as default };\n");
    } else {
        let _ = writeln!(out, "export const {name} = {value};");
    }
}

// ============================================================================
// Generators
// ============================================================================

/// Server-side proxy for a client module.
///
/// The real module is only imported where the client guard holds; on the
/// server every export is an opaque client reference.
pub fn server_client_reference(id: &str, import: &str, exports: &[String], namespace: &str) -> String {
    let mut out = String::new();
    header(&mut out, "clientReference", &format!("{namespace}/server"));
    let _ = writeln!(out, "if ({CLIENT_GUARD}) await import({});", quote(import));
    for name in emittable(exports) {
        let value = format!("clientReference({}, {})", quote(id), quote(name));
        export_binding(&mut out, name, &value);
    }
    out
}

/// Server-side proxy for a server module: callable references by address.
pub fn server_action_reference(id: &str, import: &str, exports: &[String], namespace: &str) -> String {
    let mut out = String::new();
    header(&mut out, "serverReference", &format!("{namespace}/server"));
    let _ = writeln!(out, "import * as __module from {};", quote(import));
    for name in emittable(exports) {
        let value = format!(
            "serverReference(__module[{}], {}, {})",
            quote(name),
            quote(id),
            quote(name)
        );
        export_binding(&mut out, name, &value);
    }
    out
}

/// Client-side stub for a server module: each export calls the server.
pub fn client_server_stub(id: &str, exports: &[String], namespace: &str) -> String {
    let mut out = String::new();
    header(&mut out, "callServer", &format!("{namespace}/client"));
    for name in emittable(exports) {
        let local = if name == "default" { "__default" } else { name };
        let export = if name == "default" { "" } else { "export " };
        let _ = writeln!(
            out,
            "{export}async function {local}(...args) {{\n  return await callServer({}, {}, args);\n}}",
            quote(id),
            quote(name)
        );
        if name == "default" {
            out.push_str("export { __default as default };\n");
        }
    }
    out
}

/// Re-export proxy the import map points at.
pub fn reexport_proxy(reference: &str, exports: &[String]) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_MARKER);
    out.push('\n');
    let _ = writeln!(out, "export * from {};", quote(reference));
    if exports.iter().any(|e| e == "default") {
        let _ = writeln!(out, "export {{ default }} from {};", quote(reference));
    }
    out
}

// ============================================================================
// Parsing
// ============================================================================

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^export[ \t]+(?:const|let|var|(?:async[ \t]+)?function)[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("valid regex")
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^export[ \t]*\{([^}]*)\}").expect("valid regex"));

/// Names exported by generated code.
///
/// Understands exactly the forms this module emits (`export const`,
/// `export async function`, `export { a as b }` lists); star re-exports
/// contribute nothing.
pub fn parse_export_names(source: &str) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = EXPORT_DECL
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect();

    for list in EXPORT_LIST.captures_iter(source) {
        for item in list[1].split(',') {
            let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
            if !exported.is_empty() {
                names.insert(exported.to_string());
            }
        }
    }
    names
}
