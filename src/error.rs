use std::fmt;
use std::path::{Path, PathBuf};

use colored::Colorize;
use thiserror::Error;

/// The full error taxonomy for the parser, evaluator, and merge pipeline.
///
/// Every variant corresponds to a named failure mode a caller can match on;
/// the diagnostic writer renders the `Display` impl as the "summary" line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CfgError {
    // ─── Input errors ───────────────────────────────────────────────────
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(String),
    #[error("panic while parsing {file}: {recovered_value}")]
    PanicWhileParsing { recovered_value: String, file: String },

    // ─── Structural errors ──────────────────────────────────────────────
    #[error("multiple bare include blocks in {0}")]
    MultipleBareIncludeBlocks(String),
    #[error("`include` is not a block")]
    IncludeIsNotABlock,
    #[error("too many levels of inheritance: {config} includes {first}, which includes {second}")]
    TooManyLevelsOfInheritance { config: String, first: String, second: String },
    #[error("duplicate dependency block: {label}")]
    DuplicateDependencyBlock { label: String },
    #[error("duplicate config path {path} declared by both {dep_a} and {dep_b}")]
    DuplicateConfigPath { path: String, dep_a: String, dep_b: String },
    #[error("invalid merge_strategy: {0}")]
    InvalidMergeStrategy(String),

    // ─── Reference errors ───────────────────────────────────────────────
    #[error("unresolved local: local.{name}")]
    UnresolvedLocal { name: String },
    #[error("unbound global: global.{name} is referenced but never defined in the parent")]
    UnboundGlobal { name: String },
    #[error("unknown variable root: {root}")]
    UnknownVariableRoot { root: String },
    #[error("invalid include key: {name}")]
    InvalidIncludeKey { name: String },
    #[error("global referenced from the include path: include must depend only on locals")]
    GlobalInIncludePath,

    // ─── Evaluation errors ──────────────────────────────────────────────
    #[error("function {name}: argument {arg_index}: {reason}")]
    FunctionError { name: String, arg_index: usize, reason: String },
    #[error("wrong number of parameters to {0}")]
    WrongNumberOfParams(String),
    #[error("invalid parameter type for {function}, argument {arg_index}: expected {expected}, got {got}")]
    InvalidParameterType { function: String, arg_index: usize, expected: String, got: String },
    #[error("empty string not allowed: {context}")]
    EmptyStringNotAllowed { context: String },
    #[error("invalid parameters to get_env")]
    InvalidGetEnvParams,
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("parent file not found: {path} (included from {file}): {cause}")]
    ParentFileNotFound { path: String, file: String, cause: String },
    #[error("terragrunt output: config not found: {0}")]
    TerragruntOutputConfigNotFound(String),
    #[error("terragrunt output: failed to parse outputs for {0}")]
    TerragruntOutputParsing(String),
    #[error("terragrunt output: target {0} has no outputs (not yet applied)")]
    TerragruntOutputTargetNoOutputs(String),

    // ─── Graph errors ────────────────────────────────────────────────────
    #[error("dependency cycle detected: {path}")]
    DependencyCycle { path: String },
    #[error("orphaned vertex unreachable from root: {0}")]
    OrphanedVertex(String),
    #[error("exceeded maximum evaluation iterations")]
    MaxEvaluationIterations,

    // ─── Meta-argument errors ───────────────────────────────────────────
    #[error("invalid count expression: {0}")]
    InvalidCountExpression(String),
    #[error("invalid for_each expression: {0}")]
    InvalidForEachExpression(String),
    #[error("count and for_each are mutually exclusive on {0}")]
    CountAndForEachMutuallyExclusive(String),
}

impl CfgError {
    /// Errors that halt evaluation of the whole file immediately (no partial
    /// walk continues past them) rather than merely poisoning one vertex.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CfgError::SyntaxError(_)
                | CfgError::InvalidJson(_)
                | CfgError::InvalidUtf8(_)
                | CfgError::PanicWhileParsing { .. }
                | CfgError::DependencyCycle { .. }
                | CfgError::MultipleBareIncludeBlocks(_)
                | CfgError::TooManyLevelsOfInheritance { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single positioned diagnostic: an error or warning anchored to a source
/// location, plus optional free-form detail text shown on the line below
/// the summary.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub error: CfgError,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn error(file: impl Into<PathBuf>, line: usize, column: usize, error: CfgError) -> Self {
        Self { severity: Severity::Error, file: file.into(), line, column, error, detail: None }
    }

    pub fn warning(file: impl Into<PathBuf>, line: usize, column: usize, error: CfgError) -> Self {
        Self { severity: Severity::Warning, file: file.into(), line, column, error, detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DIAG: {}:{}:{}: {}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.severity,
            self.error
        )?;
        if let Some(detail) = &self.detail {
            write!(f, "\n{}", detail)?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across a walk. The evaluator keeps walking past
/// per-vertex failures; this is the accumulator it feeds.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

/// Render diagnostics to a writer using the `DIAG: file:line:col: severity:
/// summary` format, colored when `color` is requested.
pub fn render<W: std::io::Write>(w: &mut W, diags: &Diagnostics, color: bool) -> std::io::Result<()> {
    for diag in diags.iter() {
        if color {
            let severity = match diag.severity {
                Severity::Error => "error".red().bold(),
                Severity::Warning => "warning".yellow().bold(),
            };
            writeln!(
                w,
                "{} {}:{}:{}: {}: {}",
                "DIAG:".dimmed(),
                diag.file.display(),
                diag.line,
                diag.column,
                severity,
                diag.error
            )?;
            if let Some(detail) = &diag.detail {
                writeln!(w, "{}", detail.dimmed())?;
            }
        } else {
            writeln!(w, "{}", diag)?;
        }
    }
    Ok(())
}

/// Whether diagnostics should be colored: stderr is a TTY and `NO_COLOR`/
/// `--no-color` hasn't disabled it.
pub fn should_color(no_color_flag: bool) -> bool {
    if no_color_flag || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

pub fn file_not_found(path: &Path) -> CfgError {
    CfgError::FileNotFound(path.display().to_string())
}
