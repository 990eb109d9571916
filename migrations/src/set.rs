//! Loaded set of migration files and step planning

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::MigrationError;
use crate::file::{Action, MigrationFile};

/// All migration files matched by a pattern, ordered by version then action
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    files: Vec<MigrationFile>,
}

/// Which way a run moves the database version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction of a run from `current` to `target`; equal versions count as up
    #[inline]
    pub const fn between(current: u64, target: u64) -> Self {
        if target >= current { Self::Up } else { Self::Down }
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MigrationSet {
    /// Build a set from already loaded files, rejecting version conflicts
    pub fn new(files: impl IntoIterator<Item = MigrationFile>) -> Result<Self, MigrationError> {
        let mut files: Vec<_> = files.into_iter().collect();
        files.sort_by(|a, b| {
            (a.version, a.action, &a.filename).cmp(&(b.version, b.action, &b.filename))
        });

        let mut seen: HashMap<(u64, Action), &str> = HashMap::new();
        for file in &files {
            if let Some(first) = seen.insert((file.version, file.action), &file.filename) {
                return Err(MigrationError::VersionConflict {
                    version: file.version,
                    action: file.action,
                    first: first.to_string(),
                    second: file.filename.clone(),
                });
            }
        }

        Ok(Self { files })
    }

    /// Load every `.sql` file matching a glob pattern
    pub fn from_pattern(pattern: &str) -> Result<Self, MigrationError> {
        let paths = glob::glob(pattern).map_err(|source| MigrationError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in paths {
            let path: PathBuf = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                MigrationError::Io(path, e.into())
            })?;
            let is_sql = path.extension().is_some_and(|ext| ext == "sql");
            if path.is_file() && is_sql {
                files.push(MigrationFile::load(&path)?);
            }
        }

        tracing::debug!(pattern, count = files.len(), "loaded migration files");
        Self::new(files)
    }

    pub fn all(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Highest version among all files, 0 when empty
    pub fn max_version(&self) -> u64 {
        self.files.iter().map(|f| f.version).max().unwrap_or(0)
    }

    pub fn find(&self, version: u64, action: Action) -> Option<&MigrationFile> {
        self.files
            .iter()
            .find(|f| f.version == version && f.action == action)
    }

    /// Plan the files to run to get from `current` to `target`.
    ///
    /// Going up runs every `do` file in `(current, target]` ascending. Going
    /// down undoes every applied version in `(target, current]` descending and
    /// fails before anything runs when one of them has no `undo` file.
    pub fn plan(
        &self,
        current: u64,
        target: u64,
        applied: &[u64],
    ) -> Result<(Direction, Vec<&MigrationFile>), MigrationError> {
        if Direction::between(current, target) == Direction::Up {
            let steps = self
                .files
                .iter()
                .filter(|f| f.action == Action::Do && f.version > current && f.version <= target)
                .collect();
            return Ok((Direction::Up, steps));
        }

        let mut versions: Vec<u64> = applied
            .iter()
            .copied()
            .filter(|v| *v > target && *v <= current)
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();

        let steps = versions
            .into_iter()
            .map(|v| self.find(v, Action::Undo).ok_or(MigrationError::MissingUndo(v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((Direction::Down, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::checksum;

    fn file(version: u64, action: Action) -> MigrationFile {
        let filename = format!("{version:03}.{action}.step.sql");
        MigrationFile {
            version,
            action,
            name: "step".into(),
            path: PathBuf::from(&filename),
            filename,
            sql: String::new(),
            checksum: checksum(""),
        }
    }

    fn set() -> MigrationSet {
        MigrationSet::new([
            file(3, Action::Undo),
            file(1, Action::Do),
            file(2, Action::Do),
            file(3, Action::Do),
            file(1, Action::Undo),
            file(2, Action::Undo),
        ])
        .unwrap()
    }

    #[test]
    fn sorts_by_version_then_action() {
        let order: Vec<_> = set().all().iter().map(|f| (f.version, f.action)).collect();
        assert_eq!(
            order,
            vec![
                (1, Action::Do),
                (1, Action::Undo),
                (2, Action::Do),
                (2, Action::Undo),
                (3, Action::Do),
                (3, Action::Undo),
            ]
        );
        assert_eq!(set().max_version(), 3);
    }

    #[test]
    fn duplicate_version_and_action_is_a_conflict() {
        let mut dup = file(2, Action::Do);
        dup.filename = "002.do.other.sql".into();
        let err = MigrationSet::new([file(1, Action::Do), file(2, Action::Do), dup]).unwrap_err();
        match err {
            MigrationError::VersionConflict { version, action, .. } => {
                assert_eq!(version, 2);
                assert_eq!(action, Action::Do);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn same_version_different_action_is_fine() {
        assert!(MigrationSet::new([file(1, Action::Do), file(1, Action::Undo)]).is_ok());
    }

    #[test]
    fn plans_up_ascending() {
        let set = set();
        let (dir, steps) = set.plan(1, 3, &[1]).unwrap();
        assert_eq!(dir, Direction::Up);
        let versions: Vec<_> = steps.iter().map(|f| (f.version, f.action)).collect();
        assert_eq!(versions, vec![(2, Action::Do), (3, Action::Do)]);
    }

    #[test]
    fn plans_down_descending() {
        let set = set();
        let (dir, steps) = set.plan(3, 0, &[1, 2, 3]).unwrap();
        assert_eq!(dir, Direction::Down);
        let versions: Vec<_> = steps.iter().map(|f| (f.version, f.action)).collect();
        assert_eq!(versions, vec![(3, Action::Undo), (2, Action::Undo), (1, Action::Undo)]);
    }

    #[test]
    fn same_version_plans_nothing() {
        let set = set();
        let (dir, steps) = set.plan(3, 3, &[1, 2, 3]).unwrap();
        assert_eq!(dir, Direction::Up);
        assert!(steps.is_empty());
    }

    #[test]
    fn missing_undo_fails_before_planning() {
        let set = MigrationSet::new([file(1, Action::Do), file(2, Action::Do), file(2, Action::Undo)])
            .unwrap();
        assert!(matches!(set.plan(2, 0, &[1, 2]), Err(MigrationError::MissingUndo(1))));
    }
}
