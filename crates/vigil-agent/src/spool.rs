//! Durable FIFO of samples that have not been delivered yet.
//!
//! On disk the spool is a JSON-lines file, one `{"seq": N, "sample": {...}}`
//! record per line. Appends go straight to the end of the file and are
//! synced before returning; removals rewrite the file through a temporary
//! sibling and an atomic rename. A crash can therefore only ever leave a torn
//! final line, which [`Spool::open`] drops before compacting the file.

use crate::error::SpoolError;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use vigil_common::types::Sample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolEntry {
    pub seq: u64,
    pub sample: Sample,
}

pub struct Spool {
    path: PathBuf,
    entries: VecDeque<SpoolEntry>,
    next_seq: u64,
    max_entries: Option<usize>,
}

impl Spool {
    /// Opens (or creates) the spool at `path` and recovers every complete
    /// entry already on disk.
    pub fn open(path: &Path, max_entries: Option<usize>) -> Result<Self, SpoolError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SpoolError::io(parent, e))?;
        }

        let mut spool = Self {
            path: path.to_path_buf(),
            entries: VecDeque::new(),
            next_seq: 1,
            max_entries,
        };

        if !path.exists() {
            return Ok(spool);
        }

        let file = File::open(path).map_err(|e| SpoolError::io(path, e))?;
        let mut needs_compaction = false;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| SpoolError::io(path, e))?;
            if read == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Torn write from a crash mid-append
                needs_compaction = true;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SpoolEntry>(trimmed) {
                Ok(entry) => {
                    spool.next_seq = spool.next_seq.max(entry.seq + 1);
                    spool.entries.push_back(entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Dropping unreadable spool line");
                    needs_compaction = true;
                }
            }
        }

        if needs_compaction {
            spool.rewrite()?;
        }
        if !spool.entries.is_empty() {
            tracing::info!(
                path = %path.display(),
                pending = spool.entries.len(),
                "Recovered undelivered samples from spool"
            );
        }
        Ok(spool)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persists `sample` at the tail and returns the stored entry.
    pub fn append(&mut self, sample: Sample) -> Result<SpoolEntry, SpoolError> {
        if let Some(max) = self.max_entries {
            if self.entries.len() >= max {
                return Err(SpoolError::Full(max));
            }
        }

        let entry = SpoolEntry {
            seq: self.next_seq,
            sample,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SpoolError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| SpoolError::io(&self.path, e))?;
        file.sync_data().map_err(|e| SpoolError::io(&self.path, e))?;

        self.next_seq += 1;
        self.entries.push_back(entry.clone());
        Ok(entry)
    }

    /// Snapshot of the pending entries, oldest first.
    ///
    /// Nothing is removed by reading: a consumer that stops half way simply
    /// calls `drain` again and resumes at the first entry it did not
    /// [`remove`](Self::remove).
    pub fn drain(&self) -> Vec<SpoolEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Removes the entries with the given sequence numbers, keeping the rest
    /// in their original order. Returns how many entries were removed.
    pub fn remove(&mut self, seqs: &[u64]) -> Result<usize, SpoolError> {
        if seqs.is_empty() {
            return Ok(0);
        }
        let doomed: HashSet<u64> = seqs.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|entry| !doomed.contains(&entry.seq));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rewrite()?;
        }
        Ok(removed)
    }

    fn rewrite(&self) -> Result<(), SpoolError> {
        if self.entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SpoolError::io(&self.path, e)),
            };
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| SpoolError::io(&tmp_path, e))?;
            for entry in &self.entries {
                let mut line = serde_json::to_string(entry)?;
                line.push('\n');
                tmp.write_all(line.as_bytes())
                    .map_err(|e| SpoolError::io(&tmp_path, e))?;
            }
            tmp.sync_all().map_err(|e| SpoolError::io(&tmp_path, e))?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|e| SpoolError::io(&self.path, e))?;
        Ok(())
    }
}
