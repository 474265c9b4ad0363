//! Artifact file I/O
//!
//! Writes go through a temp file that is fsynced and renamed over the
//! target, so a reader never observes a partially written artifact.

use crate::codec::{Codec, ReportCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use testtrace_core::{Result, TracerError};

/// Write bytes to `path` atomically (temp + fsync + rename)
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TracerError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    {
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| TracerError::io(&tmp_path, e))?;
        file.write_all(bytes).map_err(|e| TracerError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| TracerError::io(&tmp_path, e))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| TracerError::io(path, e))?;
    Ok(())
}

/// Encode and write an artifact atomically
pub fn write_artifact<T: Serialize + ?Sized>(codec: &Codec, path: &Path, value: &T) -> Result<()> {
    let bytes = codec.encode(value)?;
    write_atomic(path, &bytes)
}

/// Read and decode an artifact; `None` when the file does not exist
pub fn read_artifact<T: DeserializeOwned>(codec: &Codec, path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| TracerError::io(path, e))?;
    let value = codec.decode(&bytes).map_err(|e| {
        TracerError::serialization(format!("{}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::get_codec;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/ids.json");
        let codec = get_codec("json").unwrap();

        write_artifact(&codec, &path, &vec!["a", "b"]).unwrap();
        let back: Option<Vec<String>> = read_artifact(&codec, &path).unwrap();
        assert_eq!(back, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!dir.path().join("nested/ids.json.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let codec = get_codec("json").unwrap();
        let back: Option<Vec<String>> = read_artifact(&codec, &dir.path().join("missing.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_read_corrupt_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let codec = get_codec("json").unwrap();
        let err = read_artifact::<Vec<String>>(&codec, &path).unwrap_err();
        assert!(matches!(err, TracerError::Serialization(_)));
        assert!(err.to_string().contains("bad.json"));
    }
}
