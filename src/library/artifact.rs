//! Artifact bundle validation, staging and manifests.
//!
//! An artifact bundle is a ZIP archive. It may carry a manifest binding class
//! names to constructor symbols registered in the [`DriverCatalog`]:
//!
//! ```text
//! META-INF/isolated/manifest.json
//! {
//!   "classes": {
//!     "parquet.hadoop.ParquetInputFormat": "parquet-1.4::input-format",
//!     "parquet.hadoop.ParquetInputSplit": "parquet-1.4::input-split"
//!   }
//! }
//! ```
//!
//! [`DriverCatalog`]: crate::driver::DriverCatalog

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IsolationError, Result};
use crate::registry::Location;

/// Leading bytes of every ZIP archive.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Archive entry holding the bundle manifest.
pub const MANIFEST_ENTRY: &str = "META-INF/isolated/manifest.json";

/// Makes an artifact available on local storage.
pub trait ArtifactStager: Send + Sync {
    /// Return a local path holding the same bytes as `location`.
    fn stage(&self, location: &Location) -> Result<PathBuf>;
}

/// Stager for artifacts that are already local.
///
/// Remote locations need a stager that knows how to fetch them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStager;

impl ArtifactStager for LocalStager {
    fn stage(&self, location: &Location) -> Result<PathBuf> {
        location.local_path().ok_or_else(|| {
            IsolationError::invalid_artifact(
                location.as_str(),
                format!(
                    "location is not local and no stager handles scheme '{}'",
                    location.scheme().unwrap_or_default()
                ),
            )
        })
    }
}

/// Check that `path` is a single file starting with the ZIP magic bytes.
pub fn validate_artifact(location: &Location, path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        IsolationError::invalid_artifact(location.as_str(), format!("can't stat {}: {}", path.display(), e))
    })?;
    if metadata.is_dir() {
        return Err(IsolationError::invalid_artifact(
            location.as_str(),
            "should be an archive, found a directory",
        ));
    }

    let not_an_archive = || IsolationError::invalid_artifact(location.as_str(), "not a valid archive");

    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(not_an_archive()),
        Err(e) => return Err(e.into()),
    }
    if header != ZIP_MAGIC {
        return Err(not_an_archive());
    }
    Ok(())
}

/// Class bindings declared by one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Class name to catalog symbol.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Read the manifest from a validated bundle.
    ///
    /// A bundle without a manifest declares no classes.
    pub fn read(location: &Location, path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| IsolationError::invalid_artifact(location.as_str(), e.to_string()))?;

        let mut entry = match archive.by_name(MANIFEST_ENTRY) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                tracing::debug!(location = %location, "Artifact has no manifest");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(IsolationError::invalid_artifact(location.as_str(), e.to_string()));
            }
        };

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        serde_json::from_slice(&contents).map_err(|e| {
            IsolationError::invalid_artifact(location.as_str(), format!("invalid manifest: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    fn write_bundle(dir: &Path, name: &str, manifest: Option<&str>) -> PathBuf {
        let path = dir.join(name);
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        if let Some(manifest) = manifest {
            writer.start_file(MANIFEST_ENTRY, options).unwrap();
            writer.write_all(manifest.as_bytes()).unwrap();
        }
        writer.start_file("README", options).unwrap();
        writer.write_all(b"bundle").unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_validate_accepts_zip() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(dir.path(), "ok.zip", None);
        validate_artifact(&Location::from(path.clone()), &path).unwrap();
    }

    #[test]
    fn test_validate_rejects_non_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.zip");
        std::fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE]).unwrap();

        let err = validate_artifact(&Location::from(path.clone()), &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactValidation);
        assert!(err.to_string().contains("not a valid archive"));
    }

    #[test]
    fn test_validate_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.zip");
        std::fs::write(&path, [0x50, 0x4B]).unwrap();
        let err = validate_artifact(&Location::from(path.clone()), &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactValidation);
        assert!(err.to_string().contains("not a valid archive"));
    }

    #[test]
    fn test_validate_rejects_directory_and_missing() {
        let dir = TempDir::new().unwrap();
        let err = validate_artifact(&Location::from(dir.path().to_path_buf()), dir.path()).unwrap_err();
        assert!(err.to_string().contains("directory"));

        let missing = dir.path().join("missing.zip");
        let err = validate_artifact(&Location::from(missing.clone()), &missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactValidation);
    }

    #[test]
    fn test_manifest_read() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(
            dir.path(),
            "lib.zip",
            Some(r#"{"classes": {"acme.Format": "acme-1::format"}}"#),
        );
        let manifest = ArtifactManifest::read(&Location::from(path.clone()), &path).unwrap();
        assert_eq!(
            manifest.classes.get("acme.Format").map(String::as_str),
            Some("acme-1::format")
        );
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(dir.path(), "plain.zip", None);
        let manifest = ArtifactManifest::read(&Location::from(path.clone()), &path).unwrap();
        assert!(manifest.classes.is_empty());
    }

    #[test]
    fn test_invalid_manifest_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_bundle(dir.path(), "broken.zip", Some("{not json"));
        let err = ArtifactManifest::read(&Location::from(path.clone()), &path).unwrap_err();
        assert!(err.to_string().contains("invalid manifest"));
    }

    #[test]
    fn test_local_stager() {
        let staged = LocalStager.stage(&Location::new("file:///jars/a.zip")).unwrap();
        assert_eq!(staged, PathBuf::from("/jars/a.zip"));
        assert!(LocalStager.stage(&Location::new("hdfs://nn/a.zip")).is_err());
    }
}
