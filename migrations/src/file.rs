//! Migration files
//!
//! A migration file is named `<version>.<action>[.<name>].sql`, for example
//! `003.do.add-orders.sql` / `003.undo.add-orders.sql`.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::MigrationError;

/// Direction of a migration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Do,
    Undo,
}

impl Action {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Do => "do",
            Self::Undo => "undo",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A migration file loaded from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    pub action: Action,
    /// Description part of the file name (may be empty)
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
    pub sql: String,
    /// SHA-256 of the content, hex encoded
    pub checksum: String,
}

impl MigrationFile {
    /// Read and parse a migration file
    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (version, action, name) = parse_file_name(&filename)?;

        let sql = std::fs::read_to_string(path)
            .map_err(|e| MigrationError::Io(path.to_path_buf(), e))?;
        let checksum = checksum(&sql);

        Ok(Self {
            version,
            action,
            name: name.to_string(),
            filename,
            path: path.to_path_buf(),
            sql,
            checksum,
        })
    }
}

/// Split a file name into version, action and description
pub fn parse_file_name(filename: &str) -> Result<(u64, Action, &str), MigrationError> {
    let invalid = || MigrationError::InvalidFileName(filename.to_string());

    let stem = filename.strip_suffix(".sql").ok_or_else(invalid)?;
    let mut parts = stem.splitn(3, '.');

    let version = parts
        .next()
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(invalid)?;

    let action = match parts.next() {
        Some(a) if a.eq_ignore_ascii_case("do") => Action::Do,
        Some(a) if a.eq_ignore_ascii_case("undo") => Action::Undo,
        _ => return Err(invalid()),
    };

    Ok((version, action, parts.next().unwrap_or("")))
}

/// Content checksum, insensitive to CRLF vs LF line endings
pub fn checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_names() {
        assert_eq!(
            parse_file_name("001.do.create-users.sql").unwrap(),
            (1, Action::Do, "create-users")
        );
        assert_eq!(parse_file_name("0012.undo.sql").unwrap(), (12, Action::Undo, ""));
        assert_eq!(
            parse_file_name("5.DO.with.dots.sql").unwrap(),
            (5, Action::Do, "with.dots")
        );
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["create.do.sql", "1.redo.sql", "1.do.txt", ".do.sql", "-1.do.sql", "1.sql"] {
            assert!(
                matches!(parse_file_name(name), Err(MigrationError::InvalidFileName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn checksum_ignores_line_endings() {
        assert_eq!(checksum("SELECT 1;\r\nSELECT 2;"), checksum("SELECT 1;\nSELECT 2;"));
        assert_ne!(checksum("SELECT 1;"), checksum("SELECT 2;"));
        assert_eq!(checksum("").len(), 64);
    }
}
