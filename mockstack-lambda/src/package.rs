//! Deployment packages (zip archives of function code)

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Cursor, Write};
use std::path::Path;
use thiserror::Error;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Could not unzip uploaded file. Please check your file, then try to upload again. ({0})")]
    InvalidArchive(String),

    #[error("Uploaded file must be a non-empty zip")]
    Empty,

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for PackageError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::InvalidArchive(other.to_string()),
        }
    }
}

/// A validated zip archive holding function code
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentPackage {
    bytes: Bytes,
}

impl DeploymentPackage {
    /// Wrap uploaded archive bytes, rejecting anything that is not a
    /// readable zip with at least one entry
    pub fn from_zip_bytes(bytes: impl Into<Bytes>) -> Result<Self, PackageError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(PackageError::Empty);
        }

        let archive = ZipArchive::new(Cursor::new(bytes.as_ref()))?;
        if archive.len() == 0 {
            return Err(PackageError::Empty);
        }

        Ok(Self { bytes })
    }

    /// Build a single-entry deflate archive
    pub fn from_entry(name: &str, contents: &[u8]) -> Result<Self, PackageError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(PackageError::InvalidFileName(name.to_string()));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file(name, options)?;
        writer.write_all(contents)?;
        let cursor = writer.finish()?;

        Ok(Self {
            bytes: Bytes::from(cursor.into_inner()),
        })
    }

    /// Package a local file; the entry is named after the file's base name
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackageError::InvalidFileName(path.display().to_string()))?;

        let contents = std::fs::read(path)?;
        Self::from_entry(name, &contents)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 SHA-256 of the archive, as reported in `CodeSha256`
    pub fn sha256_base64(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        general_purpose::STANDARD.encode(hasher.finalize())
    }


    /// Extract every entry below `dir`
    pub fn extract_to(&self, dir: &Path) -> Result<(), PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_ref()))?;
        archive.extract(dir)?;
        Ok(())
    }
}

impl fmt::Debug for DeploymentPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentPackage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLER: &[u8] = b"def lambda_handler(event, context):\n    print(\"log message\")\n";

    #[test]
    fn test_single_entry_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handler.py");
        std::fs::write(&path, HANDLER).unwrap();

        let package = DeploymentPackage::from_file(&path).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(package.as_bytes())).unwrap();
        assert_eq!(archive.len(), 1);
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "handler.py");
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_extract_round_trip() {
        let package = DeploymentPackage::from_entry("handler.py", HANDLER).unwrap();
        let dir = tempfile::tempdir().unwrap();

        package.extract_to(dir.path()).unwrap();
        let extracted = std::fs::read(dir.path().join("handler.py")).unwrap();
        assert_eq!(extracted, HANDLER);
    }

    #[test]
    fn test_rejects_non_zip() {
        assert!(matches!(
            DeploymentPackage::from_zip_bytes(b"not a zip".to_vec()),
            Err(PackageError::InvalidArchive(_))
        ));
        assert!(matches!(
            DeploymentPackage::from_zip_bytes(Vec::new()),
            Err(PackageError::Empty)
        ));
    }

    #[test]
    fn test_sha256_is_stable() {
        let package = DeploymentPackage::from_entry("handler.py", HANDLER).unwrap();
        let reparsed = DeploymentPackage::from_zip_bytes(package.clone().into_bytes()).unwrap();

        assert_eq!(package.sha256_base64(), reparsed.sha256_base64());
        assert_eq!(package.sha256_base64().len(), 44);
    }
}
