//! Per-function configuration
//!
//! The library does not load configuration files itself; callers hand it an
//! already-parsed map of glob pattern -> configuration. Resolution merges
//! every entry whose pattern matches the function name, `*` declared
//! defaults first, then patterns in map order, later entries overriding
//! earlier ones field by field.

use crate::bundlers::BundlerId;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors surfaced to the user
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("rate limit window must be positive")]
    RateLimitWindow,

    #[error("rate limit must aggregate by at least one key")]
    RateLimitAggregation,
}

/// A route declaration: a bare path, or a path with HTTP methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteDeclaration {
    Path(String),
    Full {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        methods: Vec<String>,
    },
}

impl RouteDeclaration {
    pub fn path(&self) -> &str {
        match self {
            RouteDeclaration::Path(path) => path,
            RouteDeclaration::Full { path, .. } => path,
        }
    }

    pub fn methods(&self) -> &[String] {
        match self {
            RouteDeclaration::Path(_) => &[],
            RouteDeclaration::Full { methods, .. } => methods,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    RateLimit,
    Rewrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAggregator {
    Ip,
    Domain,
}

/// Rate-limit policy attached to a function's routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window size in seconds
    pub window_size: u64,
    /// Requests allowed per window
    pub window_limit: u64,
    #[serde(default = "default_rate_limit_action")]
    pub action: RateLimitAction,
    #[serde(default = "default_aggregate_by")]
    pub aggregate_by: Vec<RateLimitAggregator>,
}

fn default_rate_limit_action() -> RateLimitAction {
    RateLimitAction::RateLimit
}

fn default_aggregate_by() -> Vec<RateLimitAggregator> {
    vec![RateLimitAggregator::Domain]
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::RateLimitWindow);
        }
        if self.aggregate_by.is_empty() {
            return Err(ConfigError::RateLimitAggregation);
        }
        Ok(())
    }
}

/// Recognized per-function configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    /// Bundler choice for Node functions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundler: Option<BundlerId>,

    /// Target Node version, e.g. "18.x" or "nodejs18.x"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,

    /// Zip Go binaries using the custom-runtime entry convention
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_go: Option<bool>,

    /// Cargo target-directory override; `[name]` is substituted with the
    /// function name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rust_target_directory: Option<String>,

    /// Extra files to include in the archive, as globs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included_files: Vec<String>,

    /// Base path the included-files globs are anchored at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_files_base_path: Option<PathBuf>,

    /// Modules left out of bundles but kept as on-disk dependencies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_node_modules: Vec<String>,

    /// Modules excluded from the archive entirely
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_node_modules: Vec<String>,

    /// Emit source maps for bundled output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_sourcemap: Option<bool>,

    /// Cron schedule; may also come from an in-source declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Route declarations served by this function
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteDeclaration>,

    /// Rate-limit policy for the function's routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl FunctionConfig {
    /// Overlays `other` on top of `self`: scalar fields override when set,
    /// list fields replace when non-empty.
    pub fn merge(&mut self, other: &FunctionConfig) {
        macro_rules! take_if_some {
            ($($field:ident),*) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        macro_rules! take_if_nonempty {
            ($($field:ident),*) => {
                $(
                    if !other.$field.is_empty() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        take_if_some!(
            bundler,
            node_version,
            zip_go,
            rust_target_directory,
            included_files_base_path,
            node_sourcemap,
            schedule,
            rate_limit
        );
        take_if_nonempty!(
            included_files,
            external_node_modules,
            ignored_node_modules,
            routes
        );
    }

    /// Major component of the target Node version ("18.x", "nodejs18.x",
    /// "18" all parse to 18).
    pub fn node_major_version(&self) -> Option<u32> {
        let version = self.node_version.as_deref()?;
        let trimmed = version.trim_start_matches("nodejs");
        let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

/// Feature flags toggled per run rather than per function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Force the dependency-trace bundler for every Node function
    pub force_trace_bundler: bool,
}

/// Glob-pattern-keyed configuration, as loaded by the caller
pub type ConfigMap = BTreeMap<String, FunctionConfig>;

/// Resolves the effective configuration for one function name.
///
/// Invalid patterns are skipped with a warning - a bad pattern for one
/// function must not take down the discovery of the rest.
pub fn resolve_config(name: &str, map: &ConfigMap) -> FunctionConfig {
    let mut resolved = FunctionConfig::default();
    if let Some(defaults) = map.get("*") {
        resolved.merge(defaults);
    }
    for (pattern, config) in map {
        if pattern == "*" {
            continue;
        }
        match Glob::new(pattern) {
            Ok(glob) => {
                if glob.compile_matcher().is_match(name) {
                    resolved.merge(config);
                }
            }
            Err(err) => {
                tracing::warn!(pattern, error = %err, "Skipping invalid config pattern");
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_then_specific_pattern() {
        let mut map = ConfigMap::new();
        map.insert(
            "*".to_string(),
            FunctionConfig {
                node_version: Some("16.x".to_string()),
                external_node_modules: vec!["aws-sdk".to_string()],
                ..Default::default()
            },
        );
        map.insert(
            "my-*".to_string(),
            FunctionConfig {
                node_version: Some("18.x".to_string()),
                ..Default::default()
            },
        );

        let resolved = resolve_config("my-func", &map);
        assert_eq!(resolved.node_version.as_deref(), Some("18.x"));
        assert_eq!(resolved.external_node_modules, vec!["aws-sdk".to_string()]);

        let other = resolve_config("other", &map);
        assert_eq!(other.node_version.as_deref(), Some("16.x"));
    }

    #[test]
    fn test_exact_name_pattern() {
        let mut map = ConfigMap::new();
        map.insert(
            "billing".to_string(),
            FunctionConfig {
                schedule: Some("@daily".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            resolve_config("billing", &map).schedule.as_deref(),
            Some("@daily")
        );
        assert_eq!(resolve_config("other", &map).schedule, None);
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let mut map = ConfigMap::new();
        map.insert(
            "[".to_string(),
            FunctionConfig {
                schedule: Some("@daily".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(resolve_config("anything", &map).schedule, None);
    }

    #[test]
    fn test_node_major_version() {
        let config = |v: &str| FunctionConfig {
            node_version: Some(v.to_string()),
            ..Default::default()
        };
        assert_eq!(config("18.x").node_major_version(), Some(18));
        assert_eq!(config("nodejs16.x").node_major_version(), Some(16));
        assert_eq!(config("14").node_major_version(), Some(14));
        assert_eq!(config("latest").node_major_version(), None);
        assert_eq!(FunctionConfig::default().node_major_version(), None);
    }

    #[test]
    fn test_rate_limit_validation() {
        let valid = RateLimitConfig {
            window_size: 60,
            window_limit: 100,
            action: RateLimitAction::RateLimit,
            aggregate_by: vec![RateLimitAggregator::Ip],
        };
        assert!(valid.validate().is_ok());

        let zero_window = RateLimitConfig {
            window_size: 0,
            ..valid.clone()
        };
        assert!(matches!(
            zero_window.validate(),
            Err(ConfigError::RateLimitWindow)
        ));

        let no_keys = RateLimitConfig {
            aggregate_by: vec![],
            ..valid
        };
        assert!(matches!(
            no_keys.validate(),
            Err(ConfigError::RateLimitAggregation)
        ));
    }

    #[test]
    fn test_route_declaration_forms() {
        let bare: RouteDeclaration = serde_json::from_str("\"/products\"").unwrap();
        assert_eq!(bare.path(), "/products");
        assert!(bare.methods().is_empty());

        let full: RouteDeclaration =
            serde_json::from_str(r#"{"path": "/products", "methods": ["GET", "POST"]}"#).unwrap();
        assert_eq!(full.path(), "/products");
        assert_eq!(full.methods(), ["GET", "POST"]);
    }
}
