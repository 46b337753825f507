//! Partitioned JSON-Lines storage
//!
//! The index on disk is the ordered concatenation of `<base>-000.jsonl`,
//! `<base>-001.jsonl`, ... Each partition holds whole records, one JSON
//! line each, and is closed once it reaches the byte cap, so only the last
//! partition may sit below it after a full rewrite. Discovery probes
//! sequential indices until one is missing; an un-partitioned legacy
//! `<base>.jsonl` from older versions is read but never written.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use super::chunks::ChunkRecord;
use super::IndexError;

/// Partition file naming and byte budget
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    dir: PathBuf,
    base: String,
    cap_bytes: u64,
}

/// Minimal per-line probe used when filtering by path
#[derive(Deserialize)]
struct PathProbe {
    path: String,
}

impl PartitionLayout {
    pub fn new(dir: PathBuf, base: &str, cap_bytes: u64) -> Result<Self, IndexError> {
        if base.is_empty() || base.contains(['/', '\\']) || base.contains('.') {
            return Err(IndexError::InvalidBaseName(base.to_string()));
        }
        if cap_bytes == 0 {
            return Err(IndexError::ZeroPartitionCap);
        }
        Ok(Self {
            dir,
            base: base.to_string(),
            cap_bytes,
        })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn partition_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}-{:03}.jsonl", self.base, index))
    }

    fn legacy_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", self.base))
    }

    /// Existing partition files in index order, probing until a gap.
    /// Falls back to the legacy single file when no partitions exist.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for index in 0.. {
            let path = self.partition_path(index);
            if !path.exists() {
                break;
            }
            paths.push(path);
        }
        if paths.is_empty() {
            let legacy = self.legacy_path();
            if legacy.exists() {
                paths.push(legacy);
            }
        }
        paths
    }

    /// Read and parse every record. A missing index is an empty record
    /// set, not an error; malformed lines are skipped with a warning.
    pub fn read_records(&self) -> Result<Vec<ChunkRecord>> {
        let mut records = Vec::new();
        self.for_each_line(|line| {
            match serde_json::from_str::<ChunkRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed index line: {}", e),
            }
            Ok(())
        })?;
        Ok(records)
    }

    /// Stream every line of every partition, in index order
    pub fn for_each_line<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        for path in self.discover() {
            let file = File::open(&path)
                .with_context(|| format!("opening partition {}", path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("reading {}", path.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                f(&line)?;
            }
        }
        Ok(())
    }

    /// Full rewrite from an iterator of records. Removes the legacy file
    /// and any stale partitions a previous, larger index left behind.
    pub fn write_records<'a, I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a ChunkRecord>,
    {
        let mut writer = PartitionWriter::create(self)?;
        for record in records {
            writer.push(record)?;
        }
        writer.finish()
    }

    /// Delete every partition and the legacy file
    pub fn clear(&self) -> Result<()> {
        for index in 0.. {
            let path = self.partition_path(index);
            if !path.exists() {
                break;
            }
            fs::remove_file(&path)
                .with_context(|| format!("removing partition {}", path.display()))?;
        }
        let legacy = self.legacy_path();
        if legacy.exists() {
            fs::remove_file(&legacy).context("removing legacy index file")?;
        }
        Ok(())
    }

    /// Replace one note path's records without loading the index.
    ///
    /// Partitions that do not mention the path are left byte-for-byte
    /// untouched. Ones that do are rewritten in place with the path's
    /// lines dropped; the replacement records are appended at the tail,
    /// rolling into fresh partitions past the byte cap. A legacy-only
    /// index is migrated to partitions by the same pass.
    pub fn replace_path_records(&self, path: &str, records: &[ChunkRecord]) -> Result<()> {
        let existing = self.discover();
        let legacy_only = existing.len() == 1 && existing[0] == self.legacy_path();

        if legacy_only {
            // One streaming pass: keep foreign lines, drop the target's,
            // then append the replacements. Never writes the legacy form.
            let mut writer = PartitionWriter::create(self)?;
            let file = File::open(&existing[0]).context("opening legacy index")?;
            for line in BufReader::new(file).lines() {
                let line = line.context("reading legacy index")?;
                if line.trim().is_empty() || line_matches_path(&line, path) {
                    continue;
                }
                writer.push_line(&line)?;
            }
            for record in records {
                writer.push(record)?;
            }
            writer.finish()?;
            return Ok(());
        }

        // Rewrite only partitions that contain the target path
        for partition in &existing {
            let file = File::open(partition)
                .with_context(|| format!("opening partition {}", partition.display()))?;
            let mut contains = false;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line_matches_path(&line, path) {
                    contains = true;
                    break;
                }
            }
            if !contains {
                continue;
            }

            let tmp = partition.with_extension("jsonl.tmp");
            {
                let source = File::open(partition)?;
                let mut sink = BufWriter::new(File::create(&tmp)?);
                for line in BufReader::new(source).lines() {
                    let line = line?;
                    if line.trim().is_empty() || line_matches_path(&line, path) {
                        continue;
                    }
                    sink.write_all(line.as_bytes())?;
                    sink.write_all(b"\n")?;
                }
                sink.flush()?;
            }
            fs::rename(&tmp, partition)
                .with_context(|| format!("replacing partition {}", partition.display()))?;
            debug!("rewrote partition {}", partition.display());
        }

        if records.is_empty() {
            return Ok(());
        }

        // Append replacements at the tail, rotating past the cap
        fs::create_dir_all(&self.dir).context("creating index directory")?;
        let mut index = existing.len().saturating_sub(1);
        let mut bytes = fs::metadata(self.partition_path(index))
            .map(|m| m.len())
            .unwrap_or(0);
        let mut sink = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.partition_path(index))?,
        );
        for record in records {
            if bytes >= self.cap_bytes {
                sink.flush()?;
                index += 1;
                bytes = 0;
                sink = BufWriter::new(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(self.partition_path(index))?,
                );
            }
            let line = serde_json::to_string(record).context("serializing chunk record")?;
            sink.write_all(line.as_bytes())?;
            sink.write_all(b"\n")?;
            bytes += line.len() as u64 + 1;
        }
        sink.flush()?;
        Ok(())
    }
}

fn line_matches_path(line: &str, path: &str) -> bool {
    // Cheap reject before parsing: the path string must appear somewhere
    if !line.contains(path) {
        return false;
    }
    serde_json::from_str::<PathProbe>(line)
        .map(|probe| probe.path == path)
        .unwrap_or(false)
}

// ============================================================================
// Streaming writer
// ============================================================================

/// Streams records into capped partitions. Partition files are created
/// lazily on first write, so a rotation at the exact cap never leaves an
/// empty trailing file. `finish` deletes stale trailing partitions and the
/// legacy file, so the layout on disk always matches the records pushed.
pub struct PartitionWriter<'a> {
    layout: &'a PartitionLayout,
    created: usize,
    bytes: u64,
    sink: Option<BufWriter<File>>,
}

impl<'a> PartitionWriter<'a> {
    pub fn create(layout: &'a PartitionLayout) -> Result<Self> {
        fs::create_dir_all(&layout.dir).context("creating index directory")?;
        Ok(Self {
            layout,
            created: 0,
            bytes: 0,
            sink: None,
        })
    }

    pub fn push(&mut self, record: &ChunkRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("serializing chunk record")?;
        self.push_line(&line)
    }

    pub fn push_line(&mut self, line: &str) -> Result<()> {
        if self.sink.is_none() {
            let path = self.layout.partition_path(self.created);
            self.sink = Some(BufWriter::new(
                File::create(&path).with_context(|| format!("creating {}", path.display()))?,
            ));
            self.created += 1;
            self.bytes = 0;
        }
        let sink = self.sink.as_mut().unwrap();
        sink.write_all(line.as_bytes())?;
        sink.write_all(b"\n")?;
        self.bytes += line.len() as u64 + 1;
        if self.bytes >= self.layout.cap_bytes {
            sink.flush()?;
            self.sink = None;
        }
        Ok(())
    }

    /// Flush and clean up: returns the number of partitions written
    pub fn finish(mut self) -> Result<usize> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }

        // Shrink cleanup: stale partitions from a previously larger index
        for stale in self.created.. {
            let path = self.layout.partition_path(stale);
            if !path.exists() {
                break;
            }
            fs::remove_file(&path)
                .with_context(|| format!("removing stale partition {}", path.display()))?;
        }
        let legacy = self.layout.legacy_path();
        if legacy.exists() {
            fs::remove_file(&legacy).context("removing legacy index file")?;
        }

        Ok(self.created)
    }
}
