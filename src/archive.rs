//! Deployment archive extraction.
//!
//! Every invocation that executes a step needs the archive's file tree: the
//! first one to read the deployment document, later ones to read the files
//! their step uploads. Nothing survives between invocations, so resumed
//! invocations extract the archive again from the location recorded in the
//! continuation record.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use thiserror::Error;

use crate::store::{ObjectError, ObjectLocation, ObjectStore};

/// Supported archive formats, detected from the key's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// # Examples
    ///
    /// ```
    /// use lambduh::archive::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::from_key("a/b.tar.gz"), Some(ArchiveFormat::TarGz));
    /// assert_eq!(ArchiveFormat::from_key("b.TGZ"), Some(ArchiveFormat::TarGz));
    /// assert_eq!(ArchiveFormat::from_key("b.zip"), Some(ArchiveFormat::Zip));
    /// assert_eq!(ArchiveFormat::from_key("b.gz"), None);
    /// ```
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        if key.ends_with(".tar.gz") || key.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if key.ends_with(".tar") {
            Some(Self::Tar)
        } else if key.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to download archive")]
    Download(#[source] ObjectError),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to extract zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// An extracted file tree. Scratch space is removed when the last clone is
/// dropped.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    _scratch: Option<Arc<TempDir>>,
}

impl Workspace {
    /// Wraps an existing directory that the caller owns.
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _scratch: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Produces an extracted file tree from an archive in object storage.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &ObjectLocation) -> Result<Workspace, ArchiveError>;
}

/// Downloads archives through an [`ObjectStore`] and unpacks them into a
/// temporary directory under `work_dir`.
pub struct StoreArchiveExtractor {
    store: Arc<dyn ObjectStore>,
    work_dir: PathBuf,
}

impl StoreArchiveExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl ArchiveExtractor for StoreArchiveExtractor {
    async fn extract(&self, archive: &ObjectLocation) -> Result<Workspace, ArchiveError> {
        let format = ArchiveFormat::from_key(&archive.key)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(archive.key.clone()))?;
        let bytes = self
            .store
            .get(archive)
            .await
            .map_err(ArchiveError::Download)?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("lambduh-")
            .tempdir_in(&self.work_dir)?;
        let archive_path = scratch.path().join(archive.file_name());
        let tree = scratch.path().join("tree");
        tokio::fs::write(&archive_path, &bytes).await?;
        tokio::fs::create_dir_all(&tree).await?;

        tracing::debug!(%archive, size = bytes.len(), dir = %tree.display(), "extracting archive");
        let target = tree.clone();
        tokio::task::spawn_blocking(move || unpack(&archive_path, &target, format)).await??;

        Ok(Workspace {
            root: tree,
            _scratch: Some(Arc::new(scratch)),
        })
    }
}

fn unpack(archive_path: &Path, extract_to: &Path, format: ArchiveFormat) -> Result<(), ArchiveError> {
    let file = File::open(archive_path)?;
    match format {
        ArchiveFormat::TarGz => Archive::new(GzDecoder::new(file)).unpack(extract_to)?,
        ArchiveFormat::Tar => Archive::new(file).unpack(extract_to)?,
        ArchiveFormat::Zip => zip::ZipArchive::new(file)?.extract(extract_to)?,
    }
    Ok(())
}
