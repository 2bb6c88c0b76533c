use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entry name the custom runtime executes.
pub const BOOTSTRAP_ENTRY: &str = "bootstrap";
const BOOTSTRAP_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read handler artifact `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("handler artifact `{0}` is empty")]
    Empty(PathBuf),
    #[error("failed to build deployment archive: {0}")]
    Zip(#[from] ZipError),
}

/// Where the handler executable comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ArtifactSource {
    pub fn package(&self) -> Result<Vec<u8>, ArchiveError> {
        match self {
            Self::Path(path) => package_artifact(path),
            Self::Bytes(bytes) => package_bootstrap(bytes),
        }
    }
}

pub fn package_artifact(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let binary = fs::read(path)
        .map_err(|source| ArchiveError::Read { path: path.to_path_buf(), source })?;
    if binary.is_empty() {
        return Err(ArchiveError::Empty(path.to_path_buf()));
    }
    package_bootstrap(&binary)
}

/// Zips `binary` as a single executable `bootstrap` entry.
pub fn package_bootstrap(binary: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(BOOTSTRAP_MODE);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(BOOTSTRAP_ENTRY, options)?;
    writer.write_all(binary).map_err(ZipError::Io)?;
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use zip::ZipArchive;

    use super::{package_artifact, package_bootstrap, ArchiveError, BOOTSTRAP_ENTRY};

    #[test]
    fn archive_holds_single_executable_bootstrap() {
        let bytes = package_bootstrap(b"\x7fELF fake handler").expect("package");

        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("open archive");
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_name(BOOTSTRAP_ENTRY).expect("bootstrap entry");
        let mode = entry.unix_mode().expect("unix mode recorded");
        assert_eq!(mode & 0o777, 0o755);

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).expect("read entry");
        assert_eq!(contents, b"\x7fELF fake handler");
    }

    #[test]
    fn missing_artifact_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bootstrap");

        let error = package_artifact(&path).expect_err("artifact is missing");

        assert!(matches!(error, ArchiveError::Read { .. }));
        assert!(error.to_string().contains("bootstrap"));
    }

    #[test]
    fn empty_artifact_is_rejected() {
        let file = tempfile::NamedTempFile::new().expect("temp file");

        let error = package_artifact(file.path()).expect_err("artifact is empty");

        assert!(matches!(error, ArchiveError::Empty(_)));
    }
}
