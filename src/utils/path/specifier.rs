//! Module specifier helpers.
//!
//! Canonical specifiers are absolute URLs: `file:///…` for local modules and
//! `https://…` for network modules. A module's *public id* is what crosses the
//! wire: `/`-rooted and project-relative for local files, the URL itself
//! otherwise. Public ids never contain machine-specific paths.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use super::fs::relative_slash;

/// Whether the specifier is fetched over the network.
#[inline]
pub fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("https://") || specifier.starts_with("http://")
}

/// Local path of a `file://` specifier.
pub fn file_path(specifier: &str) -> Option<PathBuf> {
    let url = Url::parse(specifier).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// `file://` specifier for an absolute path.
pub fn file_url(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Project-relative public id of a canonical specifier.
pub fn public_id(specifier: &str, root: &Path) -> String {
    match file_path(specifier) {
        Some(path) if path.starts_with(root) => format!("/{}", relative_slash(&path, root)),
        _ => specifier.to_string(),
    }
}

/// Canonicalize a module path found in the wire stream.
///
/// Accepts `file://` URLs, `./`-relative and `/`-rooted ids; percent-encoded
/// characters are decoded.
pub fn canonical_id(raw: &str, root: &Path) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    if decoded.starts_with("file://") {
        return public_id(raw, root);
    }
    if let Some(rest) = decoded.strip_prefix("./") {
        return format!("/{rest}");
    }
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://esm.sh/react@18.2.0"));
        assert!(!is_remote("file:///app/mod.ts"));
        assert!(!is_remote("npm:react"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_roundtrip() {
        let spec = file_url(Path::new("/project/app.tsx")).unwrap();
        assert_eq!(spec, "file:///project/app.tsx");
        assert_eq!(file_path(&spec), Some(PathBuf::from("/project/app.tsx")));
        assert_eq!(file_path("https://esm.sh/react"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_public_id() {
        let root = Path::new("/project");
        assert_eq!(
            public_id("file:///project/components/Counter.tsx", root),
            "/components/Counter.tsx"
        );
        assert_eq!(
            public_id("https://esm.sh/react@18.2.0", root),
            "https://esm.sh/react@18.2.0"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_canonical_id_forms() {
        let root = Path::new("/project");
        assert_eq!(canonical_id("./components/A.tsx", root), "/components/A.tsx");
        assert_eq!(canonical_id("/components/A.tsx", root), "/components/A.tsx");
        assert_eq!(
            canonical_id("file:///project/components/A%20B.tsx", root),
            "/components/A B.tsx"
        );
        assert_eq!(canonical_id("/c/%5Bid%5D.tsx", root), "/c/[id].tsx");
    }
}
