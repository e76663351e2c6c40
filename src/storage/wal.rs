//! Write-Ahead Log (WAL) implementation
//!
//! Every set is appended here before it touches the memtable, so a crash
//! loses nothing that was acknowledged. The log is truncated once the
//! memtable it protects has been flushed to a segment.
//!
//! WAL format: [MAGIC][SEQUENCE][OP][KEY_LEN][VALUE_LEN][KEY][VALUE][CRC32]

use crate::common::{crc32, Error, Result, WalSyncPolicy};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const WAL_MAGIC: [u8; 4] = [0x52, 0x4B, 0x57, 0x31]; // "RKW1"
const OP_SET: u8 = 1;

/// WAL entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub sequence: u64,
    pub key: String,
    pub value: String,
}

/// Append-only write-ahead log
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    next_sequence: u64,
    sync_policy: WalSyncPolicy,
}

impl Wal {
    /// Open or create the WAL file, resuming after its last sequence number.
    pub fn open(path: impl AsRef<Path>, sync_policy: WalSyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let mut next_sequence = 0;
        let valid_len = Self::replay(&path, |entry| {
            next_sequence = next_sequence.max(entry.sequence + 1);
            Ok(())
        })?;

        // New records must not land behind a torn tail
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                "Truncating WAL {:?} from {} to {} bytes",
                path,
                file_len,
                valid_len
            );
            file.set_len(valid_len)?;
        }

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            next_sequence,
            sync_policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a SET operation. Returns the sequence number assigned to it.
    pub fn append(&mut self, key: &str, value: &str) -> Result<u64> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.write_entry(sequence, key.as_bytes(), value.as_bytes())?;
        self.maybe_sync()?;

        Ok(sequence)
    }

    fn write_entry(&mut self, sequence: u64, key: &[u8], value: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(4 + 8 + 1 + 4 + 4 + key.len() + value.len() + 4);
        record.extend_from_slice(&WAL_MAGIC);
        record.extend_from_slice(&sequence.to_le_bytes());
        record.push(OP_SET);
        record.extend_from_slice(&(key.len() as u32).to_le_bytes());
        record.extend_from_slice(&(value.len() as u32).to_le_bytes());
        record.extend_from_slice(key);
        record.extend_from_slice(value);

        // Checksum covers everything after the magic
        let checksum = crc32(&record[WAL_MAGIC.len()..]);
        record.extend_from_slice(&checksum.to_le_bytes());

        self.writer.write_all(&record)?;
        Ok(())
    }

    fn maybe_sync(&mut self) -> Result<()> {
        match self.sync_policy {
            WalSyncPolicy::Always => {
                self.writer.flush()?;
                self.writer.get_ref().sync_all()?;
            }
            WalSyncPolicy::Interval => {
                self.writer.flush()?;
            }
            WalSyncPolicy::Never => {}
        }
        Ok(())
    }

    /// Replay WAL entries in order. Stops quietly at a torn or corrupted tail.
    ///
    /// Returns the length in bytes of the intact prefix.
    pub fn replay<F>(path: impl AsRef<Path>, mut callback: F) -> Result<u64>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut valid_len = 0u64;

        loop {
            match Self::read_entry(&mut reader) {
                Ok(Some(entry)) => {
                    valid_len += record_len(&entry);
                    callback(entry)?;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("WAL replay stopped at corrupted entry: {}", e);
                    break;
                }
            }
        }

        Ok(valid_len)
    }

    fn read_entry<R: Read>(reader: &mut R) -> Result<Option<WalEntry>> {
        let mut magic = [0u8; 4];
        match reader.read_exact(&mut magic) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if magic != WAL_MAGIC {
            return Err(Error::Wal("Invalid WAL magic".into()));
        }

        // sequence(8) + op(1) + key_len(4) + value_len(4)
        let mut header = [0u8; 17];
        reader.read_exact(&mut header)?;

        let sequence = u64::from_le_bytes(header[0..8].try_into().map_err(|_| {
            Error::Wal("short sequence field".into())
        })?);
        let op = header[8];
        let key_len = u32::from_le_bytes(
            header[9..13]
                .try_into()
                .map_err(|_| Error::Wal("short key length".into()))?,
        ) as usize;
        let val_len = u32::from_le_bytes(
            header[13..17]
                .try_into()
                .map_err(|_| Error::Wal("short value length".into()))?,
        ) as usize;

        if op != OP_SET {
            return Err(Error::Wal(format!("Unknown op code: {}", op)));
        }

        let mut payload = vec![0u8; key_len + val_len];
        reader.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let mut checksum_data = Vec::with_capacity(header.len() + payload.len());
        checksum_data.extend_from_slice(&header);
        checksum_data.extend_from_slice(&payload);
        if crc32(&checksum_data) != stored_checksum {
            return Err(Error::Wal("Checksum mismatch".into()));
        }

        let value = payload.split_off(key_len);
        let key =
            String::from_utf8(payload).map_err(|_| Error::Wal("Invalid UTF-8 in key".into()))?;
        let value =
            String::from_utf8(value).map_err(|_| Error::Wal("Invalid UTF-8 in value".into()))?;

        Ok(Some(WalEntry {
            sequence,
            key,
            value,
        }))
    }

    /// Drop every entry (after the memtable has been flushed to a segment)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;

        let file = OpenOptions::new()
            .append(true)
            .read(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.next_sequence = 0;

        Ok(())
    }

    /// Sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// magic(4) + header(17) + key + value + crc(4)
fn record_len(entry: &WalEntry) -> u64 {
    (WAL_MAGIC.len() + 17 + entry.key.len() + entry.value.len() + 4) as u64
}

impl Drop for Wal {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collect(path: &Path) -> Vec<WalEntry> {
        let mut entries = Vec::new();
        Wal::replay(path, |entry| {
            entries.push(entry);
            Ok(())
        })
        .unwrap();
        entries
    }

    #[test]
    fn test_wal_basic() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.log");

        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            assert_eq!(wal.append("key1", "value1").unwrap(), 0);
            assert_eq!(wal.append("key2", "value2").unwrap(), 1);
            assert_eq!(wal.append("key1", "value3").unwrap(), 2);
            wal.sync().unwrap();
        }

        let entries = collect(&wal_path);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "key1");
        assert_eq!(entries[0].value, "value1");
        assert_eq!(entries[2].sequence, 2);
        assert_eq!(entries[2].value, "value3");
    }

    #[test]
    fn test_wal_reopen() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("reopen.log");

        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            wal.append("key1", "value1").unwrap();
            wal.append("key2", "value2").unwrap();
        }

        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            assert_eq!(wal.next_sequence, 2);
            assert_eq!(wal.append("key3", "value3").unwrap(), 2);
        }

        assert_eq!(collect(&wal_path).len(), 3);
    }

    #[test]
    fn test_wal_truncate() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("trunc.log");

        let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
        wal.append("key1", "value1").unwrap();
        wal.truncate().unwrap();
        assert!(collect(&wal_path).is_empty());

        assert_eq!(wal.append("key2", "value2").unwrap(), 0);
        let entries = collect(&wal_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "key2");
    }

    #[test]
    fn test_wal_torn_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("torn.log");

        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            wal.append("key1", "value1").unwrap();
            wal.append("key2", "value2").unwrap();
        }

        let len = std::fs::metadata(&wal_path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
        file.set_len(len - 3).unwrap();

        let entries = collect(&wal_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "key1");
    }

    #[test]
    fn test_append_after_torn_tail_survives_reopen() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("torn.log");

        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            wal.append("key1", "value1").unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
            file.write_all(b"garbage").unwrap();
        }
        {
            let mut wal = Wal::open(&wal_path, WalSyncPolicy::Always).unwrap();
            assert_eq!(wal.append("key2", "value2").unwrap(), 1);
        }

        let keys: Vec<_> = collect(&wal_path).into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["key1", "key2"]);
    }
}
