//! Line-oriented codec shared by the metadata formats, and whole-file writes.
//!
//! Every format is newline-terminated rows of single-space separated tokens
//! with no header. Readers split on ASCII whitespace so a trailing space per
//! row or a missing final newline is tolerated; writers always emit the
//! canonical form.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ectrans_error::{Result, TransitionError};
use tracing::{debug, warn};

/// One non-empty row of a metadata file.
#[derive(Debug)]
pub(crate) struct Row<'a> {
    pub line: usize,
    pub tokens: Vec<&'a str>,
}

/// Split file contents into token rows, rejecting blank lines.
pub(crate) fn rows<'a>(path: &Path, text: &'a str) -> Result<Vec<Row<'a>>> {
    let mut rows = Vec::new();
    let mut ragged = 0usize;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let tokens: Vec<&str> = raw.split_ascii_whitespace().collect();
        if tokens.is_empty() {
            return Err(TransitionError::parse(path, line, "blank line"));
        }
        if raw.len() != tokens.iter().map(|t| t.len()).sum::<usize>() + tokens.len() - 1 {
            ragged += 1;
        }
        rows.push(Row { line, tokens });
    }
    if ragged > 0 {
        warn!(
            path = %path.display(),
            rows = ragged,
            "non-canonical whitespace tolerated; rewrite will normalize it"
        );
    }
    Ok(rows)
}

/// Parse one token as `T`, naming the field in the error.
pub(crate) fn field<T: FromStr>(path: &Path, row: &Row<'_>, index: usize, what: &str) -> Result<T> {
    let token = row.tokens.get(index).ok_or_else(|| {
        TransitionError::parse(path, row.line, format!("missing {what} at column {index}"))
    })?;
    token.parse::<T>().map_err(|_| {
        TransitionError::parse(
            path,
            row.line,
            format!("invalid {what} '{token}' at column {index}"),
        )
    })
}

/// Read a metadata file, reporting invalid UTF-8 as a parse error at the
/// offending line.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
        TransitionError::parse(path, line, "invalid UTF-8")
    })?;
    debug!(path = %path.display(), bytes = text.len(), "metadata file read");
    Ok(text)
}

/// Write `bytes` to `path` in one step: temp file, fsync, rename.
///
/// Readers of `path` never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path_for(path);
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    debug!(path = %path.display(), bytes = bytes.len(), "metadata file written");
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_tolerate_trailing_space_and_missing_newline() {
        let path = Path::new("mem");
        let parsed = rows(path, "0 1 2 \n3 4 5").expect("tolerated");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tokens, vec!["0", "1", "2"]);
        assert_eq!(parsed[1].line, 2);
    }

    #[test]
    fn rows_reject_blank_line() {
        let err = rows(Path::new("mem"), "0 1\n\n2 3\n").expect_err("blank line");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn field_reports_column() {
        let parsed = rows(Path::new("mem"), "7 x\n").expect("rows");
        let ok: u32 = field(Path::new("mem"), &parsed[0], 0, "stripe id").expect("7");
        assert_eq!(ok, 7);
        let err = field::<u32>(Path::new("mem"), &parsed[0], 1, "block index").expect_err("x");
        assert!(err.to_string().contains("invalid block index 'x' at column 1"));
    }

    #[test]
    fn read_text_reports_invalid_utf8_as_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("placement");
        fs::write(&path, b"0 1 2\n0 0 1 /d/\xff\n").expect("write");
        let err = read_text(&path).expect_err("invalid UTF-8");
        assert!(err.is_input_error());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn read_text_keeps_io_errors_for_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_text(&dir.path().join("absent")).expect_err("missing file");
        assert!(!err.is_input_error());
    }

    #[test]
    fn write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out");
        write_atomic(&path, b"first\n").expect("first write");
        write_atomic(&path, b"second\n").expect("second write");
        assert_eq!(fs::read(&path).expect("read"), b"second\n");
        assert!(!temp_path_for(&path).exists());
    }
}
