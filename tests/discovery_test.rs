//! Discovery and dispatch integration tests

mod support;

use fnpack::pipeline::list_functions;
use fnpack::{ConfigMap, RuntimeId};
use support::{go_binary_bytes, write, write_bytes};

#[tokio::test]
async fn test_mixed_runtimes_are_classified() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("functions");
    write(&src.join("hello.js"), "module.exports.handler = () => {}");
    write_bytes(&src.join("metrics"), &go_binary_bytes());
    write(&src.join("api/main.go"), "package main");
    write(
        &src.join("resizer/Cargo.toml"),
        "[package]\nname = \"resizer\"\nversion = \"0.1.0\"\n",
    );
    write(&src.join("resizer/src/main.rs"), "fn main() {}");
    write(&src.join("notes.txt"), "not a function");

    let functions = list_functions(&[src], ConfigMap::new(), true)
        .await
        .unwrap();

    let mut summary: Vec<(String, RuntimeId)> = functions
        .iter()
        .map(|f| (f.name.clone(), f.runtime))
        .collect();
    summary.sort();
    assert_eq!(
        summary,
        vec![
            ("api".to_string(), RuntimeId::Go),
            ("hello".to_string(), RuntimeId::Node),
            ("metrics".to_string(), RuntimeId::Go),
            ("resizer".to_string(), RuntimeId::Rust),
        ]
    );
}

#[tokio::test]
async fn test_dedupe_prefers_highest_priority_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("functions");
    // The same function name as a Node source file and a Go source
    // directory
    write(&src.join("hello.js"), "module.exports.handler = () => {}");
    write(&src.join("hello/main.go"), "package main");

    let deduped = list_functions(&[src.clone()], ConfigMap::new(), true)
        .await
        .unwrap();
    let hello: Vec<_> = deduped.iter().filter(|f| f.name == "hello").collect();
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0].runtime, RuntimeId::Node);

    // Non-dedupe mode keys by source path and keeps both
    let all = list_functions(&[src], ConfigMap::new(), false)
        .await
        .unwrap();
    let hello: Vec<_> = all.iter().filter(|f| f.name == "hello").collect();
    assert_eq!(hello.len(), 2);
}

#[tokio::test]
async fn test_unclassifiable_paths_are_excluded_silently() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("functions");
    write(&src.join("notes.txt"), "plain text");
    write_bytes(&src.join("garbled"), b"\x7fEL");
    write(&src.join("empty-dir/placeholder.md"), "");

    let functions = list_functions(&[src], ConfigMap::new(), true)
        .await
        .unwrap();
    assert!(functions.is_empty());
}
