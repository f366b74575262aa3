use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use oxid_cfg::cache::Cache;
use oxid_cfg::loader;

#[test]
fn file_cache_invalidates_on_mtime_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.hcl");
    std::fs::write(&path, r#"locals { x = 1 }"#).unwrap();

    let cache = Cache::new();
    let first = loader::load(&path, Some(&cache)).expect("should parse");
    assert_eq!(first.root.attr("x").is_none(), true, "attribute lives under the locals block, not the root");

    // A second load of unchanged content must hit the cache (same mtime).
    let second = loader::load(&path, Some(&cache)).expect("should parse");
    assert_eq!(second.path, first.path);

    // Changing the content (and therefore the mtime) must be observed on
    // the next load rather than silently reusing the stale parse.
    sleep(Duration::from_millis(1100));
    std::fs::write(&path, r#"locals { x = 2 }"#).unwrap();
    let third = loader::load(&path, Some(&cache)).expect("should reparse");
    let locals_block = third.top_level_blocks("locals").into_iter().next().unwrap();
    assert!(locals_block.body.has_attr("x"));
}

#[test]
fn load_missing_file_is_a_diagnostic_not_a_panic() {
    let cache = Cache::new();
    let result = loader::load(Path::new("/does/not/exist.hcl"), Some(&cache));
    assert!(result.is_err());
}
