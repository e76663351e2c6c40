//! Immutable sorted segment files
//!
//! Segment format: [MAGIC:4][PAYLOAD_LEN:8][PAYLOAD][CRC32:4]
//! where PAYLOAD is the bincode encoding of the sorted entries.

use crate::common::{crc32, Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SEGMENT_MAGIC: [u8; 4] = [0x52, 0x4B, 0x53, 0x31]; // "RKS1"
const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_EXT: &str = "seg";

/// A flushed memtable, loaded in memory for lookups
#[derive(Debug)]
pub struct Segment {
    pub id: u64,
    pub path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Segment {
    pub fn file_name(id: u64) -> String {
        format!("{}{:06}.{}", SEGMENT_PREFIX, id, SEGMENT_EXT)
    }

    fn parse_id(path: &Path) -> Option<u64> {
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix(SEGMENT_PREFIX)?
            .parse()
            .ok()
    }

    /// Write `entries` as segment `id` under `dir`.
    ///
    /// The file is written under a temporary name and renamed into place,
    /// so a crash never leaves a half-written segment behind.
    pub fn write(dir: &Path, id: u64, entries: BTreeMap<String, String>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(id));
        let tmp_path = path.with_extension("tmp");

        let payload = bincode::serialize(&entries)?;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&SEGMENT_MAGIC)?;
            writer.write_all(&(payload.len() as u64).to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.write_all(&crc32(&payload).to_le_bytes())?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        Ok(Self { id, path, entries })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let id = Self::parse_id(path)
            .ok_or_else(|| Error::Corrupted(format!("not a segment file: {:?}", path)))?;
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != SEGMENT_MAGIC {
            return Err(Error::Corrupted(format!("bad segment magic in {:?}", path)));
        }

        let mut len_bytes = [0u8; 8];
        reader.read_exact(&mut len_bytes)?;
        let mut payload = vec![0u8; u64::from_le_bytes(len_bytes) as usize];
        reader.read_exact(&mut payload)?;

        let mut checksum = [0u8; 4];
        reader.read_exact(&mut checksum)?;
        if crc32(&payload) != u32::from_le_bytes(checksum) {
            return Err(Error::Corrupted(format!(
                "segment checksum mismatch in {:?}",
                path
            )));
        }

        let entries: BTreeMap<String, String> = bincode::deserialize(&payload)?;
        Ok(Self {
            id,
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Load every segment under `dir`, oldest first.
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut segments = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if Self::parse_id(&path).is_some() {
                segments.push(Self::open(&path)?);
            }
        }
        segments.sort_by_key(|s| s.id);
        Ok(segments)
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove_file(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_load() {
        let dir = tempdir().unwrap();
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), "1".to_string());
        entries.insert("b".to_string(), "2".to_string());

        Segment::write(dir.path(), 7, entries.clone()).unwrap();
        Segment::write(dir.path(), 3, BTreeMap::new()).unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        let segments = Segment::load_all(dir.path()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].id, 3);
        assert!(segments[0].is_empty());
        assert_eq!(segments[1].id, 7);
        assert_eq!(segments[1].entries(), &entries);
        assert_eq!(segments[1].get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_corrupted_segment_is_rejected() {
        let dir = tempdir().unwrap();
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), "1".to_string());
        let segment = Segment::write(dir.path(), 1, entries).unwrap();

        let mut bytes = std::fs::read(&segment.path).unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xFF;
        std::fs::write(&segment.path, bytes).unwrap();

        assert!(matches!(
            Segment::open(&segment.path),
            Err(Error::Corrupted(_))
        ));
    }
}
