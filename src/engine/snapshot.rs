//! Snapshot encoding
//!
//! Whole-database snapshots written by `save_database` and read on open.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                            │
//! │   Magic: "TRBS" (4) | Version: u16 (2) | CRC: u32 (4)        │
//! │   PayloadLen: u32 (4)                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                                   │
//! │   bincode(DbSnapshot)                                        │
//! │   documents are stored as JSON text                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The CRC covers the payload only.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Magic bytes identifying a turbostore snapshot
pub const MAGIC: &[u8; 4] = b"TRBS";

/// Current snapshot format version
pub const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + CRC (4) + PayloadLen (4) = 14 bytes
pub const HEADER_SIZE: usize = 14;

/// Everything needed to rebuild a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbSnapshot {
    pub name: String,
    pub collections: Vec<CollectionSnapshot>,
}

/// One collection: configuration, id counter and documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub indices: Vec<String>,
    pub unique: Vec<String>,
    pub next_id: u64,
    /// (id, JSON text) pairs in id order
    pub documents: Vec<(u64, String)>,
}

/// Encode a snapshot with header and checksum
pub fn encode(snapshot: &DbSnapshot) -> Result<Bytes> {
    let payload = bincode::serialize(snapshot)?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Serialization(format!(
            "Snapshot too large: {} bytes (max {})",
            payload.len(),
            u32::MAX
        ))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_u32_le(payload_len);
    buf.put_slice(&payload);

    Ok(buf.freeze())
}

/// Decode and verify a snapshot
pub fn decode(bytes: &[u8]) -> Result<DbSnapshot> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corruption(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];

    let mut magic = [0u8; 4];
    header.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(StoreError::Corruption(format!("Bad magic: {:?}", magic)));
    }

    let version = header.get_u16_le();
    if version != VERSION {
        return Err(StoreError::Corruption(format!(
            "Unsupported snapshot version {} (expected {})",
            version, VERSION
        )));
    }

    let expected_crc = header.get_u32_le();
    let payload_len = header.get_u32_le() as usize;

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(StoreError::Corruption(format!(
            "Payload length mismatch: header says {}, found {}",
            payload_len,
            payload.len()
        )));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(StoreError::Corruption(format!(
            "CRC mismatch: expected {:08x}, computed {:08x}",
            expected_crc, actual_crc
        )));
    }

    Ok(bincode::deserialize(payload)?)
}
