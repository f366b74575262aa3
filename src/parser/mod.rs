pub mod hcl_source;
pub mod json_source;

use std::path::Path;

use crate::ast::{Block, File};
use crate::error::{CfgError, Diagnostic, Diagnostics};

/// Parses either native CL text or its JSON encoding into a `File`.
/// Detected by extension first, then by sniffing a leading `{`.
///
/// The third-party parse call runs behind `catch_unwind`: a panic deep in
/// `hcl-rs` or `serde_json` must not take the whole evaluator down with it,
/// it becomes a `PanicWhileParsing` diagnostic naming the offending file.
pub fn parse(bytes: &[u8], path: &Path) -> Result<File, Diagnostics> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| single(path, CfgError::InvalidUtf8(path.display().to_string())))?;

    let is_json = path.extension().map(|e| e == "json").unwrap_or(false)
        || text.trim_start().starts_with('{');

    let path_owned = path.to_path_buf();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        if is_json {
            json_source::parse_json(text)
        } else {
            hcl_source::parse_hcl(text)
        }
    }));

    let mut root = match outcome {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => return Err(single(path, e)),
        Err(payload) => {
            let recovered = panic_message(&payload);
            return Err(single(
                path,
                CfgError::PanicWhileParsing { recovered_value: recovered, file: path_owned.display().to_string() },
            ));
        }
    };

    normalize_bare_includes(&mut root.blocks, path)?;

    Ok(File { path: path_owned, root })
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn single(path: &Path, err: CfgError) -> Diagnostics {
    let mut d = Diagnostics::new();
    d.push(Diagnostic::error(path.to_path_buf(), 0, 0, err));
    d
}

/// Bare-include normalization. By the time `json_source`
/// finishes running, JSON bare-include forms have already been rewritten
/// into a labeled `""` include; this pass is the single place that enforces
/// the invariant for native HCL too and catches duplicates from either path.
fn normalize_bare_includes(blocks: &mut [Block], path: &Path) -> Result<(), Diagnostics> {
    let bare_count = blocks.iter().filter(|b| b.block_type == "include" && b.labels.is_empty()).count();
    if bare_count > 1 {
        let mut d = Diagnostics::new();
        d.push(Diagnostic::error(
            path.to_path_buf(),
            0,
            0,
            CfgError::MultipleBareIncludeBlocks(path.display().to_string()),
        ));
        return Err(d);
    }
    for b in blocks.iter_mut() {
        if b.block_type == "include" && b.labels.is_empty() {
            b.labels.push(String::new());
        }
    }
    Ok(())
}
