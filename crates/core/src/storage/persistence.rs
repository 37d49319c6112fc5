//! Disk persistence for index snapshots using bincode serialization.
//!
//! Snapshots are serialized with bincode and framed with a CRC32 footer:
//! `[bincode payload][magic "KNN1"][u32 CRC32 BE]`. Writes use atomic
//! temp-file + rename to prevent corruption on crash.

use crate::config::SNAPSHOT_CRC_MAGIC;
use crate::error::{HnswError, Result};
use crate::hnsw::{HnswIndex, IndexSnapshot};
use std::fs;
use std::path::Path;

const FOOTER_LEN: usize = 8;

/// Serializes a snapshot and appends the checksum footer.
pub fn encode_snapshot(snapshot: &IndexSnapshot) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(snapshot)?;
    let crc = crc32fast::hash(&bytes);

    let mut output = Vec::with_capacity(bytes.len() + FOOTER_LEN);
    output.extend_from_slice(&bytes);
    output.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());
    Ok(output)
}

/// Verifies the checksum footer and deserializes the payload.
pub fn decode_snapshot(raw: &[u8]) -> Result<IndexSnapshot> {
    if raw.len() < FOOTER_LEN {
        return Err(HnswError::Corrupt(format!(
            "snapshot is {} bytes, shorter than its footer",
            raw.len()
        )));
    }
    let (payload, footer) = raw.split_at(raw.len() - FOOTER_LEN);
    if &footer[..4] != SNAPSHOT_CRC_MAGIC {
        return Err(HnswError::Corrupt("snapshot footer magic missing".into()));
    }

    let stored_crc = u32::from_be_bytes([footer[4], footer[5], footer[6], footer[7]]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(HnswError::Corrupt(format!(
            "snapshot CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"
        )));
    }
    tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored_crc);

    Ok(bincode::deserialize(payload)?)
}

/// Snapshot `index` and write it to `path` atomically.
pub async fn save_index(index: &HnswIndex, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let snapshot = index.snapshot().await?;
    let output = encode_snapshot(&snapshot)?;

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    fs::write(tmp_path, &output)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(tmp_path, path)?;

    tracing::info!(
        "Saved index to {:?} ({} nodes, {} bytes)",
        path,
        snapshot.nodes.len(),
        output.len()
    );
    Ok(())
}

/// Load an index from `path`, verifying the checksum and graph invariants.
pub fn load_index(path: impl AsRef<Path>) -> Result<HnswIndex> {
    let path = path.as_ref();
    let raw = fs::read(path)?;

    let snapshot = decode_snapshot(&raw).inspect_err(|e| {
        tracing::warn!("Failed to decode snapshot {:?}: {}", path, e);
    })?;
    let nodes = snapshot.nodes.len();
    let index = HnswIndex::from_snapshot(snapshot).inspect_err(|e| {
        tracing::warn!("Snapshot {:?} failed validation: {}", path, e);
    })?;

    tracing::info!("Loaded index from {:?} ({} nodes)", path, nodes);
    Ok(index)
}
