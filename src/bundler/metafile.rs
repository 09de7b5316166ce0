//! esbuild metafile.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Subset of the metafile the orchestrator reads.
#[derive(Debug, Default, Deserialize)]
pub struct Metafile {
    #[serde(default)]
    pub outputs: BTreeMap<String, MetaOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaOutput {
    /// Entry module that produced this output; absent for shared chunks.
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub exports: Vec<String>,
}

impl Metafile {
    /// Entry outputs (JavaScript only), as (output path, bundle name, exports).
    ///
    /// Bundle names are recovered from `[name]-[hash].js` file names.
    pub fn entry_outputs(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.outputs.iter().filter_map(|(path, output)| {
            output.entry_point.as_ref()?;
            let file = path.rsplit('/').next()?.strip_suffix(".js")?;
            let (name, _hash) = file.rsplit_once('-')?;
            Some((path.as_str(), name, output.exports.as_slice()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_outputs_skip_chunks_and_css() {
        let meta: Metafile = serde_json::from_str(
            r#"{
                "inputs": {},
                "outputs": {
                    ".splitbuild/default/dist/Counter_1a2b3c4d-QX7K2M4A.js": {
                        "entryPoint": "components/Counter.tsx",
                        "exports": ["default", "Foo"],
                        "imports": []
                    },
                    ".splitbuild/default/dist/chunk-ABCDEF12.js": {"exports": ["a"]},
                    ".splitbuild/default/dist/Counter_1a2b3c4d-QX7K2M4A.css": {"entryPoint": "components/Counter.tsx"}
                }
            }"#,
        )
        .unwrap();

        let outputs: Vec<_> = meta.entry_outputs().collect();
        assert_eq!(outputs.len(), 1);
        let (path, name, exports) = outputs[0];
        assert!(path.ends_with("QX7K2M4A.js"));
        assert_eq!(name, "Counter_1a2b3c4d");
        assert_eq!(exports, ["default", "Foo"]);
    }
}
