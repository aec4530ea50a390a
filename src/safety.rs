//! Safety checks run by the binaries before they write anything.
//!
//! A typo on the command line must never overwrite a source playlist dump or
//! a catalog snapshot.

use anyhow::{bail, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// First bytes of every SQLite database file.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output must carry `required_extension` (e.g. "json", "sqlite3")
/// - Output cannot be the same as any of the provided source paths
/// - An existing SQLite database is only overwritten by a snapshot build
pub fn validate_output_path(
    output: &Path,
    required_extension: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if extension != required_extension.to_ascii_lowercase() {
        bail!(
            "Safety check failed: output file '{}' must have a .{} extension",
            output.display(),
            required_extension
        );
    }

    for source in source_paths {
        if same_file(output, source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    if !required_extension.starts_with("sqlite") && is_sqlite_file(output) {
        bail!(
            "Safety check failed: output '{}' is an existing SQLite database",
            output.display()
        );
    }

    Ok(())
}

/// Path equality, resolving both sides when they exist.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_sqlite_file(path: &Path) -> bool {
    let mut header = [0u8; 16];
    match File::open(path) {
        Ok(mut f) => f.read_exact(&mut header).is_ok() && &header == SQLITE_MAGIC,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_report_output() {
        let output = PathBuf::from("/tmp/resolved.json");
        let source = PathBuf::from("/data/playlist.json");
        let catalog = PathBuf::from("/data/spotify-us.sqlite3");
        assert!(validate_output_path(&output, "json", &[&source, &catalog]).is_ok());
    }

    #[test]
    fn test_valid_snapshot_output() {
        let output = PathBuf::from("/tmp/apple-us.sqlite3");
        let source = PathBuf::from("/data/apple-dump.json");
        assert!(validate_output_path(&output, "sqlite3", &[&source]).is_ok());
    }

    #[test]
    fn test_wrong_extension() {
        let output = PathBuf::from("/tmp/output.txt");
        let result = validate_output_path(&output, "json", &[]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must have a .json extension"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/playlist.json");
        let result = validate_output_path(&path, "json", &[&path]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_same_file_through_relative_path() {
        let dir = std::env::temp_dir();
        let file = dir.join("track-resolver-safety-test.json");
        std::fs::write(&file, "[]").unwrap();
        let dotted = dir.join(".").join("track-resolver-safety-test.json");

        let result = validate_output_path(&dotted, "json", &[&file]);
        std::fs::remove_file(&file).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_report_onto_sqlite_database_blocked() {
        let file = std::env::temp_dir().join("track-resolver-safety-db.json");
        let mut bytes = SQLITE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 84]);
        std::fs::write(&file, bytes).unwrap();

        let result = validate_output_path(&file, "json", &[]);
        std::fs::remove_file(&file).unwrap();
        assert!(result.unwrap_err().to_string().contains("existing SQLite database"));
    }
}
