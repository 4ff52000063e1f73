//! Append-only staging areas for payloads that are not yet in final order.
//!
//! An area is a byte log plus a table of `(offset, len)` ranges addressed by
//! `StageHandle`. Memory areas live in a `Vec<u8>`; disk areas are files in
//! a per-build `tempfile::TempDir`. Dropping an area releases it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::trace;

use crate::config::{BuildConfig, StagingMode};
use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageHandle(usize);

enum Backing {
    Memory(Vec<u8>),
    Disk { file: BufWriter<File>, path: PathBuf },
}

pub struct StagingArea {
    name: String,
    backing: Backing,
    len: u64,
    ranges: Vec<(u64, u64)>,
}

impl StagingArea {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backing: Backing::Memory(Vec::new()),
            len: 0,
            ranges: Vec::new(),
        }
    }

    pub fn on_disk(dir: &Path, name: impl Into<String>) -> Result<Self, BuildError> {
        let name = name.into();
        let path = dir.join(&name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| BuildError::Staging {
                name: name.clone(),
                dir: dir.to_path_buf(),
                source,
            })?;
        trace!(area = %name, path = %path.display(), "staging area opened");
        Ok(Self {
            name,
            backing: Backing::Disk {
                file: BufWriter::new(file),
                path,
            },
            len: 0,
            ranges: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append bytes without recording a range (delimiters).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), BuildError> {
        match &mut self.backing {
            Backing::Memory(buf) => buf.extend_from_slice(bytes),
            Backing::Disk { file, .. } => file.write_all(bytes)?,
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Append a payload and return its handle.
    pub fn append(&mut self, bytes: &[u8]) -> Result<StageHandle, BuildError> {
        let offset = self.len;
        self.write_raw(bytes)?;
        self.ranges.push((offset, bytes.len() as u64));
        Ok(StageHandle(self.ranges.len() - 1))
    }

    /// Payload previously returned by `append`.
    pub fn read(&mut self, handle: StageHandle) -> Result<Vec<u8>, BuildError> {
        let (offset, len) = *self.ranges.get(handle.0).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no payload {} in staging area {}", handle.0, self.name),
            )
        })?;
        match &mut self.backing {
            Backing::Memory(buf) => Ok(buf[offset as usize..(offset + len) as usize].to_vec()),
            Backing::Disk { file, .. } => {
                file.flush()?;
                let f = file.get_mut();
                f.seek(SeekFrom::Start(offset))?;
                let mut out = vec![0u8; len as usize];
                f.read_exact(&mut out)?;
                f.seek(SeekFrom::End(0))?;
                Ok(out)
            }
        }
    }

    /// Sequential reader over everything written, from the start.
    pub fn reader(&mut self) -> Result<Box<dyn BufRead + '_>, BuildError> {
        trace!(area = %self.name, bytes = self.len, "staging area rewound");
        match &mut self.backing {
            Backing::Memory(buf) => Ok(Box::new(buf.as_slice())),
            Backing::Disk { file, .. } => {
                file.flush()?;
                let f = file.get_mut();
                f.seek(SeekFrom::Start(0))?;
                Ok(Box::new(BufReader::new(f)))
            }
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Backing::Disk { path, .. } = &self.backing {
            if let Err(e) = std::fs::remove_file(path) {
                trace!(area = %self.name, error = %e, "staging file not removed");
            }
        }
        trace!(area = %self.name, "staging area released");
    }
}

/// Creates the staging areas of one build.
pub struct Stager {
    dir: Option<TempDir>,
}

impl Stager {
    pub fn new(config: &BuildConfig) -> Result<Self, BuildError> {
        let dir = match config.staging {
            StagingMode::Memory => None,
            StagingMode::Disk => {
                let mut builder = tempfile::Builder::new();
                builder.prefix("fasttrie-");
                let parent = config.tmpdir.clone().unwrap_or_else(std::env::temp_dir);
                let dir = builder
                    .tempdir_in(&parent)
                    .map_err(|source| BuildError::Staging {
                        name: "build directory".to_string(),
                        dir: parent,
                        source,
                    })?;
                trace!(dir = %dir.path().display(), "staging directory created");
                Some(dir)
            }
        };
        Ok(Self { dir })
    }

    /// Staging area `<ordinal>-<role>`.
    pub fn area(&self, ordinal: u32, role: &str) -> Result<StagingArea, BuildError> {
        let name = format!("{ordinal}-{role}");
        match &self.dir {
            None => Ok(StagingArea::in_memory(name)),
            Some(dir) => StagingArea::on_disk(dir.path(), name),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(area: &mut StagingArea) {
        let a = area.append(b"alpha").unwrap();
        area.write_raw(b"\n").unwrap();
        let b = area.append(b"be").unwrap();
        area.write_raw(b"\n").unwrap();
        assert_eq!(area.read(b).unwrap(), b"be");
        assert_eq!(area.read(a).unwrap(), b"alpha");
        // Appending after a random read still goes to the end.
        area.append(b"c").unwrap();
        let mut all = Vec::new();
        area.reader().unwrap().read_to_end(&mut all).unwrap();
        assert_eq!(all, b"alpha\nbe\nc");
        assert_eq!(area.len(), 10);
    }

    #[test]
    fn memory_area() {
        exercise(&mut StagingArea::in_memory("0-a"));
    }

    #[test]
    fn disk_area_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            staging: StagingMode::Disk,
            tmpdir: Some(parent.path().to_path_buf()),
        };
        let stager = Stager::new(&config).unwrap();
        let dir = stager.dir().unwrap().to_path_buf();
        {
            let mut area = stager.area(3, "a").unwrap();
            exercise(&mut area);
            assert!(dir.join("3-a").exists());
        }
        assert!(!dir.join("3-a").exists());
        drop(stager);
        assert!(!dir.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let mut area = StagingArea::in_memory("x");
        let mut other = StagingArea::in_memory("y");
        let h = other.append(b"1").unwrap();
        assert!(area.read(h).is_err());
    }
}
