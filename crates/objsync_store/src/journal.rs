//! Append-only commit journal.
//!
//! Each frame is laid out as:
//!
//! ```text
//! | magic (4) | payload length u32 LE (4) | CBOR payload | sha256 prefix (8) |
//! ```
//!
//! On open, intact frames are replayed in order. An incomplete frame at the
//! end of the file is a torn write and is cut off; damage anywhere else is
//! reported as corruption.

use crate::change::StoredRow;
use crate::error::{StoreError, StoreResult};
use crate::object_id::ObjectId;
use crate::types::SequenceNumber;
use crate::value::Row;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FRAME_MAGIC: [u8; 4] = *b"OSJ1";
const HEADER_LEN: usize = 8;
const CHECKSUM_LEN: usize = 8;

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalEntry {
    /// A commit with the final rows it wrote.
    Commit {
        sequence: SequenceNumber,
        upserts: Vec<(ObjectId, Row)>,
        deletes: Vec<ObjectId>,
    },
    /// The full store contents, written by a checkpoint.
    Snapshot {
        sequence: SequenceNumber,
        rows: Vec<(ObjectId, StoredRow)>,
    },
}

pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    sync_on_commit: bool,
}

impl Journal {
    /// Opens the journal, returning it with every intact entry.
    pub(crate) fn open(path: &Path, sync_on_commit: bool) -> StoreResult<(Self, Vec<JournalEntry>)> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (entries, intact_len) = decode_frames(&bytes)?;
        if intact_len < bytes.len() {
            warn!(
                path = %path.display(),
                dropped = bytes.len() - intact_len,
                "dropping torn journal tail"
            );
            file.set_len(intact_len as u64)?;
            file.sync_all()?;
        }
        debug!(path = %path.display(), entries = entries.len(), "journal opened");

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                sync_on_commit,
            },
            entries,
        ))
    }

    /// Appends one entry. A failed write leaves the file as it was.
    pub(crate) fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        let frame = encode_frame(entry)?;
        write_frame(&mut self.file, &frame)?;
        if self.sync_on_commit {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Replaces the whole journal with one entry.
    pub(crate) fn rewrite(&mut self, entry: &JournalEntry, temp_path: &Path) -> StoreResult<()> {
        let frame = encode_frame(entry)?;
        {
            let mut temp = File::create(temp_path)?;
            temp.write_all(&frame)?;
            temp.sync_all()?;
        }
        fs::rename(temp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        Ok(())
    }
}

/// Destination of journal frames that can be cut back after a failed write.
trait FrameSink: Write {
    fn position(&mut self) -> std::io::Result<u64>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl FrameSink for File {
    fn position(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

fn write_frame<S: FrameSink>(sink: &mut S, frame: &[u8]) -> StoreResult<()> {
    let start = sink.position()?;
    if let Err(e) = sink.write_all(frame).and_then(|()| sink.flush()) {
        warn!(error = %e, "journal append failed, cutting partial frame");
        if let Err(cut) = sink.truncate(start) {
            warn!(error = %cut, "could not cut partial journal frame");
        }
        return Err(e.into());
    }
    Ok(())
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn encode_frame(entry: &JournalEntry) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| StoreError::encoding(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::encoding("journal frame exceeds 4 GiB"))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&checksum(&payload));
    Ok(frame)
}

/// Decodes frames, returning the entries and the length of the intact prefix.
fn decode_frames(bytes: &[u8]) -> StoreResult<(Vec<JournalEntry>, usize)> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_LEN {
            break;
        }
        if rest[..4] != FRAME_MAGIC {
            return Err(StoreError::corrupted(format!("bad frame magic at offset {offset}")));
        }
        let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let frame_len = HEADER_LEN + len + CHECKSUM_LEN;
        if rest.len() < frame_len {
            break;
        }

        let payload = &rest[HEADER_LEN..HEADER_LEN + len];
        let stored = &rest[HEADER_LEN + len..frame_len];
        if stored != checksum(payload) {
            if offset + frame_len == bytes.len() {
                break;
            }
            return Err(StoreError::corrupted(format!("checksum mismatch at offset {offset}")));
        }

        let entry: JournalEntry =
            ciborium::from_reader(payload).map_err(|e| StoreError::encoding(e.to_string()))?;
        entries.push(entry);
        offset += frame_len;
    }

    Ok((entries, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;
    use tempfile::tempdir;

    fn commit(seq: u64) -> JournalEntry {
        let mut row = Row::new();
        row.insert("firstName".into(), AttributeValue::from("A"));
        JournalEntry::Commit {
            sequence: SequenceNumber::new(seq),
            upserts: vec![(ObjectId::new("User"), row)],
            deletes: Vec::new(),
        }
    }

    #[test]
    fn append_and_replay() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("journal.log");
        let (mut journal, entries) = Journal::open(&path, true).unwrap();
        assert!(entries.is_empty());
        journal.append(&commit(1)).unwrap();
        journal.append(&commit(2)).unwrap();
        drop(journal);

        let (_, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("journal.log");
        let (mut journal, _) = Journal::open(&path, true).unwrap();
        journal.append(&commit(1)).unwrap();
        drop(journal);

        let intact = fs::metadata(&path).unwrap().len();
        let frame = encode_frame(&commit(2)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&frame[..frame.len() / 2]).unwrap();
        drop(file);

        let (_, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);
    }

    #[test]
    fn damaged_middle_frame_is_corruption() {
        let mut bytes = encode_frame(&commit(1)).unwrap();
        bytes.extend(encode_frame(&commit(2)).unwrap());
        bytes[HEADER_LEN + 2] ^= 0xff;
        assert!(matches!(
            decode_frames(&bytes),
            Err(StoreError::Corrupted { .. })
        ));
    }

    /// Accepts `budget` bytes, then fails every write.
    struct ShortSink {
        bytes: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.bytes.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl FrameSink for ShortSink {
        fn position(&mut self) -> std::io::Result<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> std::io::Result<()> {
            self.bytes.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_append_leaves_no_partial_frame() {
        let first = encode_frame(&commit(1)).unwrap();
        let second = encode_frame(&commit(2)).unwrap();
        let mut sink = ShortSink {
            bytes: Vec::new(),
            budget: first.len() + second.len() / 2,
        };
        write_frame(&mut sink, &first).unwrap();
        assert!(matches!(
            write_frame(&mut sink, &second),
            Err(StoreError::Io(_))
        ));
        assert_eq!(sink.bytes, first);

        sink.budget = usize::MAX;
        write_frame(&mut sink, &encode_frame(&commit(3)).unwrap()).unwrap();
        let (entries, intact) = decode_frames(&sink.bytes).unwrap();
        let sequences: Vec<u64> = entries
            .iter()
            .map(|entry| match entry {
                JournalEntry::Commit { sequence, .. } | JournalEntry::Snapshot { sequence, .. } => {
                    sequence.as_u64()
                }
            })
            .collect();
        assert_eq!(sequences, vec![1, 3]);
        assert_eq!(intact, sink.bytes.len());
    }

    #[test]
    fn rewrite_replaces_contents() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("journal.log");
        let (mut journal, _) = Journal::open(&path, true).unwrap();
        journal.append(&commit(1)).unwrap();
        journal.append(&commit(2)).unwrap();

        let snapshot = JournalEntry::Snapshot {
            sequence: SequenceNumber::new(2),
            rows: Vec::new(),
        };
        journal
            .rewrite(&snapshot, &temp.path().join("journal.log.tmp"))
            .unwrap();
        journal.append(&commit(3)).unwrap();
        drop(journal);

        let (_, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], snapshot);
    }
}
