use std::path::PathBuf;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    NoMerge,
    ShallowMerge,
    DeepMerge,
    DeepMergeMapOnly,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_merge" => Some(Self::NoMerge),
            "shallow" => Some(Self::ShallowMerge),
            "deep" => Some(Self::DeepMerge),
            "deep_map_only" => Some(Self::DeepMergeMapOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncludeInfo {
    pub path: String,
    pub merge_strategy: MergeStrategy,
    pub expose: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleDep {
    pub name: String,
    pub config_path: String,
}

#[derive(Debug, Clone)]
pub struct DepBlock {
    pub name: String,
    pub config_path: String,
    pub enabled: Option<bool>,
    pub mock_outputs: Option<Value>,
    pub mock_outputs_allowed_commands: Vec<String>,
}

/// Which source file + merge strategy last set a `ResolvedConfig` field.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_file: PathBuf,
    pub strategy: MergeStrategy,
}

/// The final typed configuration object. Every field is
/// optional unless noted; `is_partial` marks configs produced by a
/// selective decode rather than a full one.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub terraform_source: Option<String>,
    pub inputs: Vec<(String, Value)>,
    pub locals: Vec<(String, Value)>,
    pub include_info: Vec<(String, IncludeInfo)>,
    pub dependencies: Vec<ModuleDep>,
    pub typed_dependencies: Vec<DepBlock>,
    pub prevent_destroy: Option<bool>,
    pub skip: Option<bool>,
    pub iam_role: Option<String>,
    pub version_constraints: Vec<(String, String)>,
    pub remote_state: Option<Value>,
    pub feature_flags: Vec<(String, Value)>,
    pub exclude: Option<Value>,
    pub errors: Option<Value>,
    pub generate_configs: Vec<(String, Value)>,
    pub field_provenance: Vec<(String, Provenance)>,
    pub is_partial: bool,
}

impl ResolvedConfig {
    pub fn set_provenance(&mut self, field: &str, source_file: PathBuf, strategy: MergeStrategy) {
        if let Some(existing) = self.field_provenance.iter_mut().find(|(f, _)| f == field) {
            existing.1 = Provenance { source_file, strategy };
        } else {
            self.field_provenance.push((field.to_string(), Provenance { source_file, strategy }));
        }
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::NoMerge
    }
}
