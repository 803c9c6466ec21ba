//! Backup & restore (§4.K): V1 plain JSON, V2 header + gzip-compressed
//! payload with a checksum. Packs (§4.J) are a V2 file with extra header
//! fields; see `crate::packs`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FloopError, Result};
use crate::model::{Behavior, Edge};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The portable payload every backup/pack ultimately carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPayload {
    pub nodes: Vec<Behavior>,
    pub edges: Vec<Edge>,
}

/// V2 file header (line 1 of the file, UTF-8 JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupHeader {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub compressed: bool,
    #[serde(default)]
    pub schema_version: u32,
    pub checksum: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// V1 file: a single plain JSON document, no header line, no compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupV1 {
    created_at: DateTime<Utc>,
    nodes: Vec<Behavior>,
    edges: Vec<Edge>,
}

fn checksum_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn host_platform_metadata(caller_metadata: serde_json::Value) -> serde_json::Value {
    let hostname = hostname_best_effort();
    let platform = format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH);
    let mut merged = serde_json::json!({
        "hostname": hostname,
        "platform": platform,
        "schema": CURRENT_SCHEMA_VERSION,
    });
    if let (Some(merged_map), Some(caller_map)) = (merged.as_object_mut(), caller_metadata.as_object()) {
        for (k, v) in caller_map {
            merged_map.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn hostname_best_effort() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn set_restrictive_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Write a V2 backup file: header line, then gzip-compressed JSON payload.
/// Returns the header actually written (with checksum filled in).
pub fn write_v2(
    path: &Path,
    payload: &BackupPayload,
    caller_metadata: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<BackupHeader> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
        }
    }

    let payload_json = serde_json::to_vec(payload)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload_json)?;
    let compressed = encoder.finish()?;
    let checksum = checksum_hex(&compressed);

    let header = BackupHeader {
        version: 2,
        created_at: now,
        node_count: payload.nodes.len(),
        edge_count: payload.edges.len(),
        compressed: true,
        schema_version: CURRENT_SCHEMA_VERSION,
        checksum,
        metadata: host_platform_metadata(caller_metadata),
    };

    let mut file = File::create(path)?;
    let mut header_line = serde_json::to_string(&header)?;
    header_line.push('\n');
    file.write_all(header_line.as_bytes())?;
    file.write_all(&compressed)?;
    file.sync_all()?;
    drop(file);
    set_restrictive_permissions(path)?;

    Ok(header)
}

/// Write a V1 plain-JSON backup file (no compression, no header line).
pub fn write_v1(path: &Path, payload: &BackupPayload, now: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let doc = BackupV1 {
        created_at: now,
        nodes: payload.nodes.clone(),
        edges: payload.edges.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&doc)?;
    fs::write(path, bytes)?;
    set_restrictive_permissions(path)?;
    Ok(())
}

/// Bounded read: refuses to read more than `max_bytes` off disk.
fn bounded_read(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > max_bytes {
        return Err(FloopError::Integrity(format!(
            "backup file {} exceeds max restore size ({} > {} bytes)",
            path.display(),
            metadata.len(),
            max_bytes
        )));
    }
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read either a V1 or V2 backup file, auto-detecting the format by
/// attempting to parse a header line first.
pub fn read(path: &Path, max_bytes: u64) -> Result<BackupPayload> {
    let bytes = bounded_read(path, max_bytes)?;

    if let Some(newline_pos) = bytes.iter().position(|&b| b == b'\n') {
        let (header_bytes, rest) = bytes.split_at(newline_pos);
        if let Ok(header) = serde_json::from_slice::<BackupHeader>(header_bytes) {
            let payload_bytes = &rest[1..]; // skip the newline itself
            return read_v2_body(&header, payload_bytes);
        }
    }

    // Fall back to V1: the whole file is one JSON document.
    let doc: BackupV1 = serde_json::from_slice(&bytes)?;
    Ok(BackupPayload { nodes: doc.nodes, edges: doc.edges })
}

fn read_v2_body(header: &BackupHeader, payload_bytes: &[u8]) -> Result<BackupPayload> {
    if header.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(FloopError::Integrity(format!(
            "backup schema_version {} is newer than supported {}",
            header.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let actual_checksum = checksum_hex(payload_bytes);
    if actual_checksum != header.checksum {
        return Err(FloopError::Integrity("backup checksum mismatch".to_string()));
    }

    let json_bytes = if header.compressed {
        let mut decoder = GzDecoder::new(payload_bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        payload_bytes.to_vec()
    };

    let payload: BackupPayload = serde_json::from_slice(&json_bytes)?;
    Ok(payload)
}

/// Keep only the `keep_newest` most recently modified files in `dir` whose
/// name matches `prefix`/ends with one of `.json`/`.json.gz`/`.fpack`.
/// Non-fatal per-file delete failures are logged and skipped (§7 policy).
pub fn rotate(dir: &Path, prefix: &str, keep_newest: usize) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut candidates: Vec<(std::time::SystemTime, std::path::PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(prefix) {
            continue;
        }
        let is_backup = name.ends_with(".json") || name.ends_with(".json.gz") || name.ends_with(".fpack");
        if !is_backup {
            continue;
        }
        let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        candidates.push((modified, entry.path()));
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in candidates.into_iter().skip(keep_newest) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to rotate backup file"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_payload() -> BackupPayload {
        BackupPayload {
            nodes: vec![Behavior::new("a", "n", "never commit secrets")],
            edges: vec![],
        }
    }

    #[test]
    fn v2_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json.gz");
        let payload = sample_payload();
        write_v2(&path, &payload, serde_json::json!({}), Utc::now()).unwrap();
        let restored = read(&path, 50 * 1024 * 1024).unwrap();
        assert_eq!(restored.nodes.len(), 1);
        assert_eq!(restored.nodes[0].id, "a");
    }

    #[test]
    fn v1_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let payload = sample_payload();
        write_v1(&path, &payload, Utc::now()).unwrap();
        let restored = read(&path, 50 * 1024 * 1024).unwrap();
        assert_eq!(restored.nodes.len(), 1);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json.gz");
        let payload = sample_payload();
        write_v2(&path, &payload, serde_json::json!({}), Utc::now()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let result = read(&path, 50 * 1024 * 1024);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json.gz");
        let payload = sample_payload();
        write_v2(&path, &payload, serde_json::json!({}), Utc::now()).unwrap();
        let result = read(&path, 1);
        assert!(result.is_err());
    }

    #[test]
    fn rotation_keeps_only_newest_files() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("backup-{i}.json"));
            fs::write(&path, "{}").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let removed = rotate(dir.path(), "backup-", 2).unwrap();
        assert_eq!(removed, 3);
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }
}
