//! Command-line interface

pub mod commands;
pub mod output;

use crate::config::{ConfigMap, FeatureFlags};
use crate::pipeline::{self, RunOptions};
use commands::{ListArgs, OutputFormatArg, PackArgs};
use std::path::Path;
use tracing::error;

/// Runs the `pack` command. Returns the process exit code: non-zero when
/// any function failed.
pub async fn handle_pack(args: &PackArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            error!("{}", message);
            return 2;
        }
    };

    let options = RunOptions {
        dirs: args.dirs.clone(),
        dest_dir: args.out.clone(),
        format: args.format.into(),
        config,
        flags: FeatureFlags {
            force_trace_bundler: args.trace,
        },
        dedupe: !args.no_dedupe,
        concurrency: args.concurrency,
    };

    let result = match pipeline::pack_functions(options).await {
        Ok(result) => result,
        Err(err) => {
            error!("{}", err);
            return 2;
        }
    };

    if let Some(manifest_path) = &args.manifest {
        if let Err(err) = pipeline::write_manifest(manifest_path, &result).await {
            error!(path = %manifest_path.display(), "Could not write manifest: {}", err);
            return 2;
        }
    }

    let rendered = match args.output {
        OutputFormatArg::Human => output::render_run_human(&result),
        OutputFormatArg::Json => output::render_run_json(&result),
    };
    print!("{}", rendered);

    if result.errors.is_empty() {
        0
    } else {
        1
    }
}

/// Runs the `list` command.
pub async fn handle_list(args: &ListArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            error!("{}", message);
            return 2;
        }
    };

    let functions =
        match pipeline::list_functions(&args.dirs, config, !args.no_dedupe).await {
            Ok(functions) => functions,
            Err(err) => {
                error!("{}", err);
                return 2;
            }
        };

    let rendered = match args.output {
        OutputFormatArg::Human => output::render_list_human(&functions),
        OutputFormatArg::Json => output::render_list_json(&functions),
    };
    print!("{}", rendered);
    0
}

/// Loads the glob-pattern-keyed configuration map from a JSON file.
fn load_config(path: Option<&Path>) -> Result<ConfigMap, String> {
    let Some(path) = path else {
        return Ok(ConfigMap::new());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("could not read config file '{}': {}", path.display(), err))?;
    serde_json::from_str(&text)
        .map_err(|err| format!("could not parse config file '{}': {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_missing_is_empty() {
        assert!(load_config(None).unwrap().is_empty());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fnpack.json");
        std::fs::write(
            &path,
            r#"{"*": {"node_version": "18.x"}, "billing": {"schedule": "@daily"}}"#,
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(
            config.get("billing").unwrap().schedule.as_deref(),
            Some("@daily")
        );
    }

    #[test]
    fn test_load_config_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fnpack.json");
        std::fs::write(&path, "{oops").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
