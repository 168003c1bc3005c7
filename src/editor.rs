//! Scoped external-editor session for manual correction.
//!
//! Seed a temp file with the current content, block until the operator's
//! editor exits, read the possibly-modified text back. The temp file is a
//! [`tempfile::NamedTempFile`], so it is removed on every exit path (early
//! return, spawn failure, panic) without any cleanup bookkeeping here.

use crate::error::KbError;
use std::io::Write;
use std::process::Command;
use tracing::debug;

/// Run one editor session over `initial` and return the edited text.
///
/// `program` is invoked as `program <tempfile>` and must block until the
/// operator closes it (the usual behaviour of terminal editors).
pub fn edit_text(program: &str, initial: &str) -> Result<String, KbError> {
    let mut file = tempfile::Builder::new()
        .prefix("guidekb-edit-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    let path = file.path().to_path_buf();
    debug!("Editor session: {} {}", program, path.display());

    let status = Command::new(program)
        .arg(&path)
        .status()
        .map_err(|e| KbError::EditorFailed {
            program: program.to_string(),
            detail: format!("failed to start: {e}"),
        })?;

    if !status.success() {
        return Err(KbError::EditorFailed {
            program: program.to_string(),
            detail: format!("exited with {status}"),
        });
    }

    let edited = std::fs::read_to_string(&path)?;
    Ok(edited)
}
