//! Durable, atomic file representation of each collection.
//!
//! One `<collection>.json` file per collection. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! reader never observes a partially written file.

use crate::config::DurabilityMode;
use crate::error::DocDbError;
use crate::store::document::Document;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const COLLECTION_FILE_EXT: &str = "json";

pub fn collection_file_name(collection: &str) -> String {
    format!("{collection}.{COLLECTION_FILE_EXT}")
}

pub fn collection_file_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(collection_file_name(collection))
}

pub(crate) fn encode_collection(
    docs: &[Document],
    pretty: bool,
) -> Result<Vec<u8>, DocDbError> {
    let result = if pretty {
        serde_json::to_vec_pretty(docs)
    } else {
        serde_json::to_vec(docs)
    };
    result.map_err(|e| DocDbError::Encode(e.to_string()))
}

/// Serializes the collection and atomically replaces its file.
pub fn write_collection_atomic(
    dir: &Path,
    collection: &str,
    docs: &[Document],
    durability: DurabilityMode,
    pretty: bool,
) -> Result<(), DocDbError> {
    fs::create_dir_all(dir)?;
    let bytes = encode_collection(docs, pretty)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    if matches!(durability, DurabilityMode::Full) {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(collection_file_path(dir, collection))
        .map_err(|e| DocDbError::Io(e.error))?;
    if matches!(durability, DurabilityMode::Full) {
        fsync_dir(dir)?;
    }
    Ok(())
}

/// Parses one collection file. Malformed JSON is fatal for that file.
pub fn read_collection_file(path: &Path) -> Result<Vec<Document>, DocDbError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DocDbError::Decode(format!("{}: {e}", path.display())))
}

/// Loads every collection file in the data directory. A missing directory
/// yields an empty store; any other I/O failure propagates.
pub fn load_data_dir(dir: &Path) -> Result<BTreeMap<String, Vec<Document>>, DocDbError> {
    let mut collections = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(collections),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = collection_name_from_path(&path) else {
            continue;
        };
        collections.insert(name, read_collection_file(&path)?);
    }
    Ok(collections)
}

/// Copies every collection file from `src` into `dst` untransformed.
/// Returns the copied file names.
pub fn copy_collection_files(src: &Path, dst: &Path) -> Result<Vec<String>, DocDbError> {
    fs::create_dir_all(dst)?;
    let mut copied = Vec::new();
    let entries = match fs::read_dir(src) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(copied),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || collection_name_from_path(&path).is_none() {
            continue;
        }
        let file_name = entry.file_name();
        fs::copy(&path, dst.join(&file_name))?;
        copied.push(file_name.to_string_lossy().into_owned());
    }
    copied.sort();
    Ok(copied)
}

/// Lists `(collection name, file path)` pairs for every collection file in
/// `dir`, sorted by name.
pub(crate) fn collection_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, DocDbError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = collection_name_from_path(&path) {
            files.push((name, path));
        }
    }
    files.sort();
    Ok(files)
}

pub fn dir_size_bytes(dir: &Path) -> Result<u64, DocDbError> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Collection name is the filename without the `.json` extension. In-flight
/// temp files and anything else in the directory are ignored.
fn collection_name_from_path(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext != COLLECTION_FILE_EXT {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

fn fsync_dir(path: &Path) -> Result<(), DocDbError> {
    let dir = fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn docs(values: &[serde_json::Value]) -> Vec<Document> {
        values
            .iter()
            .map(|v| v.as_object().expect("object").clone())
            .collect()
    }

    #[test]
    fn write_then_load_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let contacts = docs(&[json!({"id": "c-1", "name": "Ada"})]);
        write_collection_atomic(dir.path(), "contacts", &contacts, DurabilityMode::Full, true)
            .expect("write");
        let loaded = load_data_dir(dir.path()).expect("load");
        assert_eq!(loaded.get("contacts"), Some(&contacts));
    }

    #[test]
    fn missing_data_dir_yields_empty_store() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("never-created");
        let loaded = load_data_dir(&missing).expect("load");
        assert!(loaded.is_empty());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("contacts.json"), b"[{broken").expect("write");
        let err = load_data_dir(dir.path()).expect_err("must fail");
        assert!(matches!(err, DocDbError::Decode(_)));
    }

    #[test]
    fn stray_temp_files_are_ignored_on_load() {
        // A crash between temp-write and rename leaves a temp file behind;
        // the previously persisted file must stay authoritative.
        let dir = tempdir().expect("tempdir");
        let contacts = docs(&[json!({"id": "c-1"})]);
        write_collection_atomic(dir.path(), "contacts", &contacts, DurabilityMode::Full, true)
            .expect("write");
        fs::write(dir.path().join(".tmpAbC123"), b"[{torn").expect("stray tmp");
        let loaded = load_data_dir(dir.path()).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("contacts"), Some(&contacts));
    }

    #[test]
    fn idempotent_writes_are_byte_identical() {
        let dir = tempdir().expect("tempdir");
        let deals = docs(&[json!({"id": "d-1", "amount": 10})]);
        write_collection_atomic(dir.path(), "deals", &deals, DurabilityMode::Full, true)
            .expect("write 1");
        let first = fs::read(collection_file_path(dir.path(), "deals")).expect("read 1");
        write_collection_atomic(dir.path(), "deals", &deals, DurabilityMode::Full, true)
            .expect("write 2");
        let second = fs::read(collection_file_path(dir.path(), "deals")).expect("read 2");
        assert_eq!(first, second);
    }

    #[test]
    fn copy_skips_non_collection_entries() {
        let src = tempdir().expect("src");
        let dst = tempdir().expect("dst");
        fs::write(src.path().join("tasks.json"), b"[]").expect("tasks");
        fs::write(src.path().join("notes.txt"), b"not a collection").expect("txt");
        fs::create_dir(src.path().join("sub")).expect("subdir");
        let copied = copy_collection_files(src.path(), dst.path()).expect("copy");
        assert_eq!(copied, vec!["tasks.json".to_string()]);
        assert!(dst.path().join("tasks.json").exists());
        assert!(!dst.path().join("notes.txt").exists());
    }
}
