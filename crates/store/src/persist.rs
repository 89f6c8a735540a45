//! Checkpoint-log persistence for the savepoint stack.
//!
//! On `close(persist = true)` the stack is materialized to
//! `token_database_savepoints.log` so that uncommitted rollback information
//! survives a restart. The write protocol mirrors a dual-phase commit: the
//! header's dirty flag is written as 1 first, the payload is flushed and
//! synced, then the flag is rewritten as 0 and synced again. A load that
//! observes a non-zero flag refuses the file.
//!
//! Wire format, in sequence:
//!
//! ```text
//! header  { dirty_flag: u32 LE }
//! payload sequence of groups:
//!   seq: i64 LE
//!   action count: varuint
//!   per action { op: u16 LE, type: u16 LE,
//!                key: varuint len ‖ bytes, value: varuint len ‖ bytes }
//! ```
//!
//! An empty `value` means "no prior value": rollback deletes the key.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use snafu::ResultExt;
use tokenledger_types::{decode_varuint, encode_varuint};

use crate::error::{DatabaseSnafu, DirtyFlagSnafu, Error, PersistSnafu, Result};

/// Filename of the checkpoint log inside the store directory.
pub const SAVEPOINTS_LOG_FILENAME: &str = "token_database_savepoints.log";

const HEADER_LEN: usize = 4;

/// One materialized rollback record: `(op, type, key, prior value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntry {
    /// Wire discriminant of the mutation op.
    pub op: u16,
    /// Wire discriminant of the token type.
    pub ty: u16,
    /// The encoded key the mutation touched.
    pub key: Vec<u8>,
    /// The key's prior value; empty means the key did not exist.
    pub value: Vec<u8>,
}

/// One savepoint in persistent form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentGroup {
    /// The savepoint's sequence number.
    pub seq: i64,
    /// Materialized rollback records, in recording order.
    pub entries: Vec<RecordedEntry>,
}

/// Writes the checkpoint log for the given groups.
///
/// The file is complete only once the dirty flag has been rewritten to
/// zero; a crash at any earlier point leaves a file that [`load_log`] will
/// reject.
pub fn write_log(path: &Path, groups: &[PersistentGroup]) -> Result<()> {
    let mut payload = Vec::new();
    for group in groups {
        payload.extend_from_slice(&group.seq.to_le_bytes());
        encode_varuint(&mut payload, group.entries.len() as u64);
        for entry in &group.entries {
            payload.extend_from_slice(&entry.op.to_le_bytes());
            payload.extend_from_slice(&entry.ty.to_le_bytes());
            encode_varuint(&mut payload, entry.key.len() as u64);
            payload.extend_from_slice(&entry.key);
            encode_varuint(&mut payload, entry.value.len() as u64);
            payload.extend_from_slice(&entry.value);
        }
    }

    let mut file = File::create(path).context(PersistSnafu)?;
    file.write_all(&1u32.to_le_bytes()).context(PersistSnafu)?;
    file.write_all(&payload).context(PersistSnafu)?;
    file.sync_all().context(PersistSnafu)?;

    // Payload is durable; clear the dirty flag.
    file.seek(SeekFrom::Start(0)).context(PersistSnafu)?;
    file.write_all(&0u32.to_le_bytes()).context(PersistSnafu)?;
    file.sync_all().context(PersistSnafu)?;
    Ok(())
}

fn take<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = cursor.checked_add(len).filter(|&end| end <= data.len()).ok_or_else(|| {
        Error::Database { reason: format!("truncated checkpoint log at offset {cursor}") }
    })?;
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn take_varuint(data: &[u8], cursor: &mut usize) -> Result<u64> {
    decode_varuint(data, cursor)
        .map_err(|_| Error::Database { reason: format!("bad varint in checkpoint log at offset {cursor}") })
}

/// Loads the checkpoint log, returning the savepoint groups in file order.
///
/// Fails with `DirtyFlag` when the header shows an incomplete persist.
pub fn load_log(path: &Path) -> Result<Vec<PersistentGroup>> {
    let data = std::fs::read(path).context(PersistSnafu)?;
    if data.len() < HEADER_LEN {
        return DatabaseSnafu { reason: "checkpoint log is shorter than its header".to_string() }
            .fail();
    }
    let dirty = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if dirty != 0 {
        return DirtyFlagSnafu.fail();
    }

    let mut cursor = HEADER_LEN;
    let mut groups = Vec::new();
    while cursor < data.len() {
        let seq_bytes: [u8; 8] = take(&data, &mut cursor, 8)?
            .try_into()
            .map_err(|_| Error::Database { reason: "bad seq width".to_string() })?;
        let seq = i64::from_le_bytes(seq_bytes);

        let count = take_varuint(&data, &mut cursor)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let op_bytes: [u8; 2] = take(&data, &mut cursor, 2)?
                .try_into()
                .map_err(|_| Error::Database { reason: "bad op width".to_string() })?;
            let ty_bytes: [u8; 2] = take(&data, &mut cursor, 2)?
                .try_into()
                .map_err(|_| Error::Database { reason: "bad type width".to_string() })?;
            let key_len = take_varuint(&data, &mut cursor)?;
            let key = take(&data, &mut cursor, key_len as usize)?.to_vec();
            let value_len = take_varuint(&data, &mut cursor)?;
            let value = take(&data, &mut cursor, value_len as usize)?.to_vec();
            entries.push(RecordedEntry {
                op: u16::from_le_bytes(op_bytes),
                ty: u16::from_le_bytes(ty_bytes),
                key,
                value,
            });
        }
        groups.push(PersistentGroup { seq, entries });
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_groups() -> Vec<PersistentGroup> {
        vec![
            PersistentGroup {
                seq: 3,
                entries: vec![
                    RecordedEntry { op: 1, ty: 1, key: b"key-one".to_vec(), value: Vec::new() },
                    RecordedEntry {
                        op: 2,
                        ty: 2,
                        key: b"key-two".to_vec(),
                        value: b"prior".to_vec(),
                    },
                ],
            },
            PersistentGroup { seq: 9, entries: Vec::new() },
        ]
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SAVEPOINTS_LOG_FILENAME);

        let groups = sample_groups();
        write_log(&path, &groups).expect("write");
        let loaded = load_log(&path).expect("load");
        assert_eq!(loaded, groups);
    }

    #[test]
    fn test_final_dirty_flag_is_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SAVEPOINTS_LOG_FILENAME);
        write_log(&path, &sample_groups()).expect("write");

        let bytes = std::fs::read(&path).expect("read");
        assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_load_rejects_dirty_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SAVEPOINTS_LOG_FILENAME);
        write_log(&path, &sample_groups()).expect("write");

        // Flip the flag back to "in progress".
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[0] = 1;
        std::fs::write(&path, &bytes).expect("rewrite");

        assert!(matches!(load_log(&path).unwrap_err(), Error::DirtyFlag));
    }

    #[test]
    fn test_load_rejects_truncated_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SAVEPOINTS_LOG_FILENAME);
        write_log(&path, &sample_groups()).expect("write");

        let bytes = std::fs::read(&path).expect("read");
        std::fs::write(&path, &bytes[..bytes.len() - 3]).expect("truncate");

        assert!(matches!(load_log(&path).unwrap_err(), Error::Database { .. }));
    }

    #[test]
    fn test_empty_log_has_no_groups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SAVEPOINTS_LOG_FILENAME);
        write_log(&path, &[]).expect("write");
        assert!(load_log(&path).expect("load").is_empty());
    }
}
