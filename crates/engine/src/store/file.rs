use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{RuleStore, StorageError};

/// One file per rule id under a flat directory. Writes go to a temp file in
/// the same directory, are fsynced, then renamed over the target so readers
/// only ever see a complete old or new version; the directory entry is
/// fsynced afterwards so the rename survives a crash.
pub struct FileRuleStore {
    dir: PathBuf,
}

const SUFFIX: &str = ".rule.json";

impl FileRuleStore {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{SUFFIX}"))
    }

    fn sync_dir(&self) -> Result<(), StorageError> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

impl RuleStore for FileRuleStore {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.dir.join(format!(".{id}.tmp"));
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, self.path_for(id))?;
        self.sync_dir()
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => self.sync_dir(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(SUFFIX) else {
                continue;
            };
            let bytes = fs::read(entry.path())?;
            entries.push((id.to_string(), bytes));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
