use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;

use crate::ast::File;
use crate::config::ResolvedConfig;
use crate::decode::Subset;

/// Key for the parsed-file cache: invalidated automatically by mtime change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileCacheKey {
    path: PathBuf,
    mtime_micros: i128,
}

/// Key for the resolved-config cache. `subset_set` is sorted before hashing
/// so two equal sets built in different insertion order collide correctly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolvedCacheKey {
    config_path: PathBuf,
    content_hash: u64,
    include_from_child: Option<String>,
    subset: Vec<&'static str>,
}

fn subset_name(s: &Subset) -> &'static str {
    match s {
        Subset::Dependencies => "Dependencies",
        Subset::Dependency => "Dependency",
        Subset::Terraform => "Terraform",
        Subset::TerraformSource => "TerraformSource",
        Subset::Flags => "Flags",
        Subset::Inputs => "Inputs",
        Subset::VersionConstraints => "VersionConstraints",
        Subset::RemoteState => "RemoteState",
        Subset::FeatureFlags => "FeatureFlags",
        Subset::Engine => "Engine",
        Subset::Exclude => "Exclude",
        Subset::Errors => "Errors",
    }
}

fn sorted_subset_names(subset: &HashSet<Subset>) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = subset.iter().map(subset_name).collect();
    names.sort_unstable();
    names
}

fn content_hash(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Reads a file's mtime as whole microseconds since `UNIX_EPOCH`, used both
/// as the parsed-file cache key and for the `configPath-...-modTime-...`
/// display format.
pub fn mtime_micros(path: &Path) -> std::io::Result<i128> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let dur = modified.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    Ok(dur.as_micros() as i128)
}

pub fn cache_key_display(path: &Path, mtime_micros: i128) -> String {
    format!("configPath-{}-modTime-{}", path.display(), mtime_micros)
}

/// Two-layer cache: parsed files keyed by `(path, mtime)`, resolved configs
/// keyed by `(path, content hash, include_from_child, subset)`. Entries are
/// deep-cloned on both put and get so no caller can alias another caller's
/// mutation through the cache.
#[derive(Default)]
pub struct Cache {
    files: DashMap<FileCacheKey, File>,
    resolved: DashMap<ResolvedCacheKey, ResolvedConfig>,
}

impl Cache {
    pub fn new() -> Self {
        Self { files: DashMap::new(), resolved: DashMap::new() }
    }

    pub fn get_file(&self, path: &Path) -> std::io::Result<Option<File>> {
        let mtime = mtime_micros(path)?;
        let key = FileCacheKey { path: path.to_path_buf(), mtime_micros: mtime };
        Ok(self.files.get(&key).map(|f| f.value().clone()))
    }

    pub fn put_file(&self, path: &Path, file: File) -> std::io::Result<()> {
        let mtime = mtime_micros(path)?;
        let key = FileCacheKey { path: path.to_path_buf(), mtime_micros: mtime };
        self.files.insert(key, file);
        Ok(())
    }

    pub fn get_resolved(
        &self,
        config_path: &Path,
        bytes: &[u8],
        include_from_child: Option<&str>,
        subset: &HashSet<Subset>,
    ) -> Option<ResolvedConfig> {
        let key = ResolvedCacheKey {
            config_path: config_path.to_path_buf(),
            content_hash: content_hash(bytes),
            include_from_child: include_from_child.map(String::from),
            subset: sorted_subset_names(subset),
        };
        self.resolved.get(&key).map(|r| r.value().clone())
    }

    pub fn put_resolved(
        &self,
        config_path: &Path,
        bytes: &[u8],
        include_from_child: Option<&str>,
        subset: &HashSet<Subset>,
        resolved: ResolvedConfig,
    ) {
        let key = ResolvedCacheKey {
            config_path: config_path.to_path_buf(),
            content_hash: content_hash(bytes),
            include_from_child: include_from_child.map(String::from),
            subset: sorted_subset_names(subset),
        };
        self.resolved.insert(key, resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_cache_round_trips() {
        let cache = Cache::new();
        let subset: HashSet<Subset> = [Subset::Inputs].into_iter().collect();
        let mut resolved = ResolvedConfig::default();
        resolved.terraform_source = Some("git::https://example.com/module".into());

        cache.put_resolved(Path::new("/tmp/a.hcl"), b"hello", None, &subset, resolved.clone());
        let hit = cache.get_resolved(Path::new("/tmp/a.hcl"), b"hello", None, &subset);
        assert_eq!(hit.unwrap().terraform_source, resolved.terraform_source);

        let miss = cache.get_resolved(Path::new("/tmp/a.hcl"), b"different", None, &subset);
        assert!(miss.is_none());
    }

    #[test]
    fn cache_key_display_matches_format() {
        let s = cache_key_display(Path::new("/tmp/a.hcl"), 1234);
        assert_eq!(s, "configPath-/tmp/a.hcl-modTime-1234");
    }
}
