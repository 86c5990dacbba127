//! Durable journal backing the change ledger.
//!
//! Append-only file of framed CBOR records. Each frame carries magic,
//! version, payload length, the CBOR payload, and a CRC32 over everything
//! before it. Replay folds frames in order; a torn frame at the tail (crash
//! mid-append) is discarded, while corruption anywhere earlier is surfaced
//! as an error for the pass to handle.

use crate::entry::{EntryId, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use fitlog_core::Timestamp;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes identifying a journal frame.
const JOURNAL_MAGIC: [u8; 4] = *b"FLJL";

/// Current journal format version.
const JOURNAL_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + length (4).
const HEADER_SIZE: usize = 10;

const JOURNAL_FILE: &str = "ledger.journal";
const LOCK_FILE: &str = "ledger.lock";

/// A journal record, replayed in order to rebuild ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalRecord {
    /// A new entry was appended.
    Append(LedgerEntry),
    /// An existing entry was superseded in place (compaction).
    Replace(LedgerEntry),
    /// Entries were confirmed remotely and removed.
    Confirm(Vec<EntryId>),
    /// An entry's retry state changed.
    Attempt {
        /// The entry whose state changed.
        entry_id: EntryId,
        /// New attempt count.
        attempt_count: u32,
        /// When the attempt failed.
        last_attempt_at: Option<Timestamp>,
        /// Whether the entry is now excluded from automatic retry.
        stuck: bool,
    },
    /// A checkpoint: complete live state, replacing everything before it.
    Checkpoint {
        /// The next entry id to assign.
        next_entry_id: EntryId,
        /// All live entries at checkpoint time.
        entries: Vec<LedgerEntry>,
    },
}

/// The append-only journal file plus its directory lock.
#[derive(Debug)]
pub(crate) struct Journal {
    dir: PathBuf,
    file: Mutex<File>,
    _lock_file: File,
}

impl Journal {
    /// Opens (or creates) the journal in `dir`, replaying existing frames.
    ///
    /// Takes an exclusive advisory lock on the directory; a second open of
    /// the same directory fails with [`LedgerError::Locked`].
    pub(crate) fn open(dir: &Path) -> LedgerResult<(Self, Vec<JournalRecord>)> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| LedgerError::Locked)?;

        let path = dir.join(JOURNAL_FILE);
        let records = read_frames(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok((
            Self {
                dir: dir.to_path_buf(),
                file: Mutex::new(file),
                _lock_file: lock_file,
            },
            records,
        ))
    }

    /// Appends one record and syncs it to disk.
    pub(crate) fn append(&self, record: &JournalRecord) -> LedgerResult<()> {
        let frame = encode_frame(record)?;
        let mut file = self.file.lock();
        file.write_all(&frame)?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrites the journal as a single checkpoint frame.
    ///
    /// Writes a temporary file and renames it over the journal so a crash
    /// during checkpointing leaves either the old or the new journal intact.
    pub(crate) fn checkpoint(
        &self,
        next_entry_id: EntryId,
        entries: Vec<LedgerEntry>,
    ) -> LedgerResult<()> {
        let frame = encode_frame(&JournalRecord::Checkpoint {
            next_entry_id,
            entries,
        })?;

        let tmp_path = self.dir.join(format!("{JOURNAL_FILE}.tmp"));
        let path = self.dir.join(JOURNAL_FILE);

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&frame)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &path)?;

        let file = OpenOptions::new().append(true).open(&path)?;
        *self.file.lock() = file;
        Ok(())
    }
}

fn encode_frame(record: &JournalRecord) -> LedgerResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(record, &mut payload)
        .map_err(|e| LedgerError::corruption(format!("journal encode failed: {e}")))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| LedgerError::corruption("journal record too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + 4);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);

    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

enum Fill {
    Full,
    Partial,
    Eof,
}

fn fill(reader: &mut impl Read, buf: &mut [u8]) -> LedgerResult<Fill> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => {
                return Ok(if read == 0 { Fill::Eof } else { Fill::Partial });
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Fill::Full)
}

/// Reads all complete frames from `path`.
///
/// A missing file is an empty journal. A partial frame at the tail is
/// discarded (crash mid-append); a CRC or structure failure on a complete
/// frame is corruption.
fn read_frames(path: &Path) -> LedgerResult<Vec<JournalRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut records = Vec::new();

    loop {
        let mut header = [0u8; HEADER_SIZE];
        match fill(&mut reader, &mut header)? {
            Fill::Eof => break,
            Fill::Partial => {
                warn!("discarding torn journal frame header at tail");
                break;
            }
            Fill::Full => {}
        }

        if header[0..4] != JOURNAL_MAGIC {
            return Err(LedgerError::corruption("bad journal magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != JOURNAL_VERSION {
            return Err(LedgerError::corruption(format!(
                "unsupported journal version {version}"
            )));
        }
        let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

        let mut payload = vec![0u8; len];
        match fill(&mut reader, &mut payload)? {
            Fill::Full => {}
            _ => {
                warn!("discarding torn journal payload at tail");
                break;
            }
        }

        let mut crc_bytes = [0u8; 4];
        match fill(&mut reader, &mut crc_bytes)? {
            Fill::Full => {}
            _ => {
                warn!("discarding torn journal checksum at tail");
                break;
            }
        }

        let expected = u32::from_le_bytes(crc_bytes);
        let mut framed = Vec::with_capacity(HEADER_SIZE + len);
        framed.extend_from_slice(&header);
        framed.extend_from_slice(&payload);
        let actual = compute_crc32(&framed);
        if actual != expected {
            return Err(LedgerError::corruption(format!(
                "journal checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }

        let record: JournalRecord = ciborium::from_reader(payload.as_slice())
            .map_err(|e| LedgerError::corruption(format!("journal decode failed: {e}")))?;
        records.push(record);
    }

    Ok(records)
}

/// CRC32 (IEEE polynomial).
fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
