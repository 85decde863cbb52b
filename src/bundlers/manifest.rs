//! package.json model
//!
//! Tolerant parsing: a malformed manifest contributes nothing rather than
//! failing the build.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    pub main: Option<String>,

    /// "module" marks the package tree as ES modules
    #[serde(rename = "type")]
    pub module_type: Option<String>,

    /// node-gyp build marker
    #[serde(default)]
    pub gypfile: bool,

    /// node-pre-gyp binary field; shape varies, presence is what matters
    pub binary: Option<serde_json::Value>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageJson {
    /// Parses manifest text, falling back to an empty manifest on malformed
    /// input.
    pub fn parse(text: &str, path: &Path) -> Self {
        match serde_json::from_str(text) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed package.json");
                Self::default()
            }
        }
    }

    pub fn declares_module_type(&self) -> bool {
        self.module_type.as_deref() == Some("module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = PackageJson::parse(
            r#"{
                "name": "sharp",
                "version": "0.33.0",
                "main": "lib/index.js",
                "gypfile": true,
                "dependencies": {"semver": "^7.0.0"}
            }"#,
            Path::new("/x/package.json"),
        );
        assert_eq!(manifest.name.as_deref(), Some("sharp"));
        assert_eq!(manifest.version.as_deref(), Some("0.33.0"));
        assert!(manifest.gypfile);
        assert!(manifest.dependencies.contains_key("semver"));
    }

    #[test]
    fn test_malformed_manifest_is_empty() {
        let manifest = PackageJson::parse("{not json", Path::new("/x/package.json"));
        assert_eq!(manifest.name, None);
        assert!(!manifest.gypfile);
    }

    #[test]
    fn test_module_type() {
        let esm = PackageJson::parse(r#"{"type": "module"}"#, Path::new("/x/package.json"));
        assert!(esm.declares_module_type());
        let cjs = PackageJson::parse(r#"{"type": "commonjs"}"#, Path::new("/x/package.json"));
        assert!(!cjs.declares_module_type());
    }
}
