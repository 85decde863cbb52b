//! CLI output formatting

use crate::function::{ArchiveDescriptor, FunctionSource};
use crate::pipeline::RunResult;
use serde::Serialize;

/// Human-readable run summary.
pub fn render_run_human(result: &RunResult) -> String {
    let mut out = String::new();
    for archive in &result.archives {
        out.push_str(&render_archive_line(archive));
        out.push('\n');
        for warning in &archive.warnings {
            out.push_str(&format!("    warning: {}\n", warning));
        }
    }
    for warning in &result.warnings {
        out.push_str(&format!("warning: {}\n", warning));
    }
    for error in &result.errors {
        out.push_str(&format!("error: {}\n", error));
    }
    out.push_str(&format!(
        "{} function(s) packaged, {} failed\n",
        result.archives.len(),
        result.errors.len()
    ));
    out
}

fn render_archive_line(archive: &ArchiveDescriptor) -> String {
    let mut line = format!("{} [{}]", archive.name, archive.runtime);
    if let Some(bundler) = archive.bundler {
        line.push_str(&format!(" bundler={}", bundler));
    }
    if let Some(size) = archive.size {
        line.push_str(&format!(" {}", human_size(size)));
    }
    if let Some(schedule) = &archive.schedule {
        line.push_str(&format!(" schedule={}", schedule));
    }
    line.push_str(&format!(" -> {}", archive.path.display()));
    line
}

/// JSON run summary: descriptors as-is, errors as rendered strings.
pub fn render_run_json(result: &RunResult) -> String {
    #[derive(Serialize)]
    struct JsonRun<'a> {
        functions: &'a [ArchiveDescriptor],
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    }
    serde_json::to_string_pretty(&JsonRun {
        functions: &result.archives,
        errors: result.errors.iter().map(|e| e.to_string()).collect(),
        warnings: result.warnings.clone(),
    })
    .expect("run result serializes")
}

/// Human-readable discovery listing.
pub fn render_list_human(functions: &[FunctionSource]) -> String {
    let mut out = String::new();
    for function in functions {
        out.push_str(&format!(
            "{} [{}] {}\n",
            function.name,
            function.runtime,
            function.src_path.display()
        ));
    }
    out.push_str(&format!("{} function(s) found\n", functions.len()));
    out
}

/// JSON discovery listing.
pub fn render_list_json(functions: &[FunctionSource]) -> String {
    #[derive(Serialize)]
    struct JsonFunction<'a> {
        name: &'a str,
        runtime: crate::runtimes::RuntimeId,
        path: String,
        main_file: String,
    }
    let entries: Vec<JsonFunction> = functions
        .iter()
        .map(|f| JsonFunction {
            name: &f.name,
            runtime: f.runtime,
            path: f.src_path.display().to_string(),
            main_file: f.main_file.display().to_string(),
        })
        .collect();
    serde_json::to_string_pretty(&entries).expect("listing serializes")
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtimes::RuntimeId;
    use std::path::PathBuf;

    fn archive_fixture() -> ArchiveDescriptor {
        ArchiveDescriptor {
            name: "hello".to_string(),
            path: PathBuf::from("/dist/hello.zip"),
            size: Some(2048),
            runtime: RuntimeId::Node,
            bundler: Some(crate::bundlers::BundlerId::Trace),
            src_files: vec![],
            native_modules: Default::default(),
            schedule: Some("@daily".to_string()),
            routes: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_render_run_human() {
        let result = RunResult {
            archives: vec![archive_fixture()],
            ..Default::default()
        };
        let rendered = render_run_human(&result);
        assert!(rendered.contains("hello [js]"));
        assert!(rendered.contains("bundler=trace"));
        assert!(rendered.contains("schedule=@daily"));
        assert!(rendered.contains("1 function(s) packaged, 0 failed"));
    }

    #[test]
    fn test_render_run_json() {
        let result = RunResult {
            archives: vec![archive_fixture()],
            ..Default::default()
        };
        let parsed: serde_json::Value = serde_json::from_str(&render_run_json(&result)).unwrap();
        assert_eq!(parsed["functions"][0]["name"], "hello");
        assert_eq!(parsed["functions"][0]["runtime"], "js");
        assert!(parsed.get("errors").is_none());
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(2048), "2.0kB");
        assert_eq!(human_size(3_500_000), "3.5MB");
    }
}
