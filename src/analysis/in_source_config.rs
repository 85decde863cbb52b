//! In-source configuration extraction
//!
//! Functions can declare configuration by wrapping their main export in a
//! recognized helper call, e.g. `export const handler = schedule('@daily',
//! fn)` with `schedule` imported from the helper module. The walk locates
//! the main export, traces the callee back to its import, and extracts the
//! literal argument. Any step that does not resolve - non-literal argument,
//! untraceable binding, unrecognized import - means "feature not present",
//! never an error.

use super::ast::ExprKind;
use super::module::ModuleSummary;

/// Helper modules whose factories carry in-source configuration
pub const CONFIG_HELPER_MODULES: &[&str] = &["@fnpack/functions"];

/// The in-source schedule factory
const SCHEDULE_FACTORY: &str = "schedule";

/// The export every function's entry file is expected to provide
pub const MAIN_EXPORT: &str = "handler";

/// Configuration declared inside the source file itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InSourceConfig {
    /// Cron expression from a `schedule(...)` wrapper
    pub schedule: Option<String>,
}

/// Extracts in-source configuration from a module summary.
pub fn extract(summary: &ModuleSummary) -> InSourceConfig {
    InSourceConfig {
        schedule: extract_schedule(summary),
    }
}

fn extract_schedule(summary: &ModuleSummary) -> Option<String> {
    let export = summary.export_expr(MAIN_EXPORT)?;
    let ExprKind::Call { callee, args } = export.as_ref() else {
        return None;
    };
    if !callee_is_factory(summary, callee, SCHEDULE_FACTORY) {
        return None;
    }
    // The cron expression must be a string literal
    args.first()?.as_str().map(str::to_string)
}

/// True when the callee resolves to `factory` imported from a recognized
/// helper module - either directly (`schedule(...)`) or through a
/// namespace/whole-module binding (`helpers.schedule(...)`).
fn callee_is_factory(summary: &ModuleSummary, callee: &ExprKind, factory: &str) -> bool {
    match callee {
        ExprKind::Ident(name) => summary
            .bindings
            .get(name)
            .map(|binding| {
                CONFIG_HELPER_MODULES.contains(&binding.module.as_str())
                    && binding.imported == factory
            })
            .unwrap_or(false),
        ExprKind::Member {
            object,
            property,
            computed: false,
        } => {
            if property != factory {
                return false;
            }
            let ExprKind::Ident(object_name) = object.as_ref() else {
                return false;
            };
            summary
                .bindings
                .get(object_name)
                .map(|binding| {
                    CONFIG_HELPER_MODULES.contains(&binding.module.as_str())
                        && binding.imported == "*"
                })
                .unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::module::summarize;

    #[test]
    fn test_esm_schedule_extraction() {
        let summary = summarize(
            "import { schedule } from '@fnpack/functions'\n\
             export const handler = schedule('@daily', async () => {})",
        );
        assert_eq!(
            extract(&summary).schedule,
            Some("@daily".to_string())
        );
    }

    #[test]
    fn test_cjs_schedule_extraction() {
        let summary = summarize(
            "const { schedule } = require('@fnpack/functions')\n\
             module.exports.handler = schedule('0 0 * * *', fn)",
        );
        assert_eq!(
            extract(&summary).schedule,
            Some("0 0 * * *".to_string())
        );
    }

    #[test]
    fn test_namespace_call() {
        let summary = summarize(
            "const helpers = require('@fnpack/functions')\n\
             module.exports.handler = helpers.schedule('@hourly', fn)",
        );
        assert_eq!(
            extract(&summary).schedule,
            Some("@hourly".to_string())
        );
    }

    #[test]
    fn test_renamed_import() {
        let summary = summarize(
            "import { schedule as cron } from '@fnpack/functions'\n\
             export const handler = cron('@weekly', fn)",
        );
        assert_eq!(
            extract(&summary).schedule,
            Some("@weekly".to_string())
        );
    }

    #[test]
    fn test_non_literal_argument_yields_nothing() {
        let summary = summarize(
            "import { schedule } from '@fnpack/functions'\n\
             export const handler = schedule(CRON, fn)",
        );
        assert_eq!(extract(&summary).schedule, None);
    }

    #[test]
    fn test_unrecognized_module_yields_nothing() {
        let summary = summarize(
            "import { schedule } from 'some-other-library'\n\
             export const handler = schedule('@daily', fn)",
        );
        assert_eq!(extract(&summary).schedule, None);
    }

    #[test]
    fn test_plain_export_yields_nothing() {
        let summary = summarize("export const handler = async () => {}");
        assert_eq!(extract(&summary).schedule, None);
    }

    #[test]
    fn test_untraceable_binding_yields_nothing() {
        let summary = summarize("export const handler = schedule('@daily', fn)");
        assert_eq!(extract(&summary).schedule, None);
    }
}
