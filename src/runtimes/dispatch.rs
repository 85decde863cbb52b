//! Runtime dispatch
//!
//! Classifiers are tried in fixed priority order. Each consumes a subset of
//! the candidate paths; the dispatcher forwards the remainder to the next
//! classifier. In dedupe mode results are keyed by function name and the
//! first (highest-priority) match wins; otherwise results are keyed by
//! source path, so the same name compiled for two runtimes survives.

use super::RuntimeRegistry;
use crate::function::FunctionSource;
use crate::pipeline::RunContext;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Result of discovery across every runtime
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub functions: Vec<FunctionSource>,
    pub warnings: Vec<String>,
}

pub struct RuntimeDispatcher<'r> {
    registry: &'r RuntimeRegistry,
    dedupe: bool,
}

impl<'r> RuntimeDispatcher<'r> {
    pub fn new(registry: &'r RuntimeRegistry, dedupe: bool) -> Self {
        Self { registry, dedupe }
    }

    pub async fn find_functions_in_paths(
        &self,
        paths: &[PathBuf],
        ctx: &RunContext,
    ) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut remaining: Vec<PathBuf> = paths.to_vec();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut seen_warnings: HashSet<String> = HashSet::new();

        for runtime in self.registry.in_priority_order() {
            if remaining.is_empty() {
                break;
            }
            let matches = runtime.find_functions_in_paths(&remaining, ctx).await;
            debug!(
                runtime = %runtime.id(),
                matched = matches.functions.len(),
                "Classifier pass complete"
            );

            let consumed: HashSet<PathBuf> = matches
                .functions
                .iter()
                .map(|f| f.src_path.clone())
                .collect();
            remaining.retain(|path| !consumed.contains(path));

            for warning in matches.warnings {
                if seen_warnings.insert(warning.clone()) {
                    outcome.warnings.push(warning);
                }
            }

            for function in matches.functions {
                let key = if self.dedupe {
                    function.name.clone()
                } else {
                    function.src_path.to_string_lossy().into_owned()
                };
                if seen_keys.insert(key) {
                    outcome.functions.push(function);
                } else {
                    debug!(
                        name = %function.name,
                        runtime = %function.runtime,
                        "Dropping duplicate function"
                    );
                }
            }
        }

        outcome
            .functions
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.runtime.cmp(&b.runtime)));
        outcome
    }

    /// Classifies one path with the highest-priority runtime that claims it.
    pub async fn find_function_in_path(
        &self,
        path: &PathBuf,
        ctx: &RunContext,
    ) -> Option<FunctionSource> {
        for runtime in self.registry.in_priority_order() {
            if let Some(function) = runtime.find_function_in_path(path, ctx).await {
                return Some(function);
            }
        }
        None
    }
}
