//! Line-oriented key-value settings file.
//!
//! Each meaningful line is `key = value`. The line is split on the first
//! `=` and both sides are trimmed; lines without `=` or with an empty key
//! or value are not entries and are carried through updates unchanged.
//!
//! Lines that are not valid UTF-8 are never entries: lookups skip them and
//! updates copy their bytes through.
//!
//! Every operation opens, processes and closes the file; nothing is cached
//! between calls. Updates are serialized through an advisory lock on a
//! `<file>.lock` sidecar next to the settings file.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Settings file store
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Split a line into a trimmed `(key, value)` pair
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Read the next raw line, newline included; `false` at end of file
fn next_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

/// Entry on a raw line, if it is UTF-8 and has one
fn parse_raw(buf: &[u8]) -> Option<(&str, &str)> {
    std::str::from_utf8(buf).ok().and_then(parse_line)
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the settings file, for same-filesystem temp files
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Sidecar file that update locks; it outlives the renames of the settings file
    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Value of the first line whose key matches exactly
    pub fn get(&self, key: &str) -> Result<String> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buf = Vec::new();

        while next_line(&mut reader, &mut buf)? {
            if let Some((parsed_key, value)) = parse_raw(&buf) {
                if parsed_key == key {
                    return Ok(value.to_string());
                }
            }
        }

        Err(Error::NotFound(key.to_string()))
    }

    /// File contents, with invalid UTF-8 replaced by U+FFFD
    pub fn list(&self) -> Result<String> {
        let bytes = std::fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace the value of `key`, keeping every other line in place
    ///
    /// Matching lines are rewritten as `key = new_value`, other entries are
    /// re-serialized as `key = value` and non-entry lines are copied as-is.
    /// The new contents go to a temp file next to the original, which is
    /// then renamed over it in one step. If `key` is absent the temp file
    /// is discarded and the original is left byte-for-byte unchanged.
    pub fn update(&self, key: &str, new_value: &str) -> Result<()> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        // Opened under the lock so a concurrent update's rename is visible
        let original = File::open(&self.path)?;
        let temp = NamedTempFile::new_in(self.parent_dir())?;
        let mut key_found = false;

        {
            let mut reader = BufReader::new(&original);
            let mut writer = BufWriter::new(temp.as_file());
            let mut buf = Vec::new();

            while next_line(&mut reader, &mut buf)? {
                match parse_raw(&buf) {
                    Some((parsed_key, _)) if parsed_key == key => {
                        writeln!(writer, "{} = {}", key, new_value)?;
                        key_found = true;
                    }
                    Some((parsed_key, value)) => {
                        writeln!(writer, "{} = {}", parsed_key, value)?;
                    }
                    None => {
                        writer.write_all(&buf)?;
                        if !buf.ends_with(b"\n") {
                            writer.write_all(b"\n")?;
                        }
                    }
                }
            }
            writer.flush()?;
        }

        if !key_found {
            lock.unlock()?;
            tracing::debug!("Key {:?} not in {:?}, discarding update", key, self.path);
            // Temp file is removed when dropped
            return Err(Error::NotFound(key.to_string()));
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        lock.unlock()?;

        tracing::debug!("Updated {:?} in {:?}", key, self.path);
        Ok(())
    }

    /// Write a new settings file from `pairs`; never overwrites
    pub fn initialize(&self, pairs: &[(&str, String)]) -> Result<()> {
        std::fs::create_dir_all(self.parent_dir())?;

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Config(format!(
                    "Settings file {:?} already exists",
                    self.path
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut writer = BufWriter::new(&file);
        for (key, value) in pairs {
            writeln!(writer, "{} = {}", key, value)?;
        }
        writer.flush()?;

        tracing::info!("Created settings file {:?}", self.path);
        Ok(())
    }
}
