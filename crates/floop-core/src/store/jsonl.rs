//! JSONL source-of-truth log (§4.A, §6.2): one record per line, append-only,
//! write-temp+fsync+rename for atomic appends, tolerant of a truncated
//! trailing line (power-loss during append) but strict about any other line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FloopError, Result};

/// An append-only log of records of type `T`, one JSON object per line.
pub struct JsonlLog<T> {
    path: PathBuf,
    _marker: std::marker::PhantomData<T>,
}

impl<T> JsonlLog<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed record. The last line, if truncated (no
    /// trailing newline and not valid JSON), is skipped rather than treated
    /// as corruption — anywhere else, a malformed line is an integrity
    /// error.
    pub fn read_all(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;

        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let is_last = i == lines.len() - 1;
                    if is_last {
                        tracing::warn!(path = %self.path.display(), "ignoring truncated trailing JSONL line");
                    } else {
                        return Err(FloopError::Integrity(format!(
                            "malformed JSONL record at {}:{}: {e}",
                            self.path.display(),
                            i + 1
                        )));
                    }
                }
            }
        }
        Ok(records)
    }

    /// Append one record, fsync'd before returning.
    pub fn append(&self, record: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Rewrite the entire log via write-temp+fsync+rename, used when
    /// compacting (e.g. dropping forgotten records) rather than appending.
    pub fn rewrite(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for record in records {
                let mut line = serde_json::to_string(record)?;
                line.push('\n');
                tmp.write_all(line.as_bytes())?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        id: String,
        value: u32,
    }

    #[test]
    fn append_then_read_all_roundtrips() {
        let dir = tempdir().unwrap();
        let log: JsonlLog<Rec> = JsonlLog::new(dir.path().join("recs.jsonl"));
        log.append(&Rec { id: "a".into(), value: 1 }).unwrap();
        log.append(&Rec { id: "b".into(), value: 2 }).unwrap();
        let all = log.read_all().unwrap();
        assert_eq!(all, vec![Rec { id: "a".into(), value: 1 }, Rec { id: "b".into(), value: 2 }]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let log: JsonlLog<Rec> = JsonlLog::new(dir.path().join("missing.jsonl"));
        assert_eq!(log.read_all().unwrap(), Vec::new());
    }

    #[test]
    fn truncated_trailing_line_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.jsonl");
        fs::write(&path, "{\"id\":\"a\",\"value\":1}\n{\"id\":\"b\",\"valu").unwrap();
        let log: JsonlLog<Rec> = JsonlLog::new(&path);
        let all = log.read_all().unwrap();
        assert_eq!(all, vec![Rec { id: "a".into(), value: 1 }]);
    }

    #[test]
    fn malformed_non_trailing_line_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.jsonl");
        fs::write(&path, "not json\n{\"id\":\"b\",\"value\":2}\n").unwrap();
        let log: JsonlLog<Rec> = JsonlLog::new(&path);
        assert!(log.read_all().is_err());
    }

    #[test]
    fn rewrite_replaces_contents_atomically() {
        let dir = tempdir().unwrap();
        let log: JsonlLog<Rec> = JsonlLog::new(dir.path().join("recs.jsonl"));
        log.append(&Rec { id: "a".into(), value: 1 }).unwrap();
        log.rewrite(&[Rec { id: "b".into(), value: 2 }]).unwrap();
        assert_eq!(log.read_all().unwrap(), vec![Rec { id: "b".into(), value: 2 }]);
    }
}
