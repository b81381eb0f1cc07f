use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::modality::Modality;

use super::error::StorageError;
use super::sanitize::normalize_relative;
use super::traits::{BlobStore, BoxReader, OpenedBlob, RemovalOutcome, StoredBlob};

/// How many names to try before giving up on a crowded bucket.
const MAX_NAME_ATTEMPTS: usize = 16;

/// Storage configuration handed to [`FilesystemBlobStore::new`].
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Storage root. Relative roots are resolved against the working directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Largest accepted blob, in bytes.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from("uploaded_files")
}
fn default_max_blob_size() -> u64 {
    128 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

/// Filesystem-backed blob store.
///
/// Blobs live in one directory per modality bucket:
/// `{root}/{bucket}/{sanitized filename}`. Every path that leaves this type
/// has passed a containment check against the canonical root.
pub struct FilesystemBlobStore {
    root: PathBuf,
    configured_root: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create the root and all bucket directories, then pin the canonical root.
    pub async fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.root).await?;
        for modality in Modality::ALL {
            fs::create_dir_all(config.root.join(modality.bucket())).await?;
        }
        let root = fs::canonicalize(&config.root).await?;

        Ok(Self {
            root,
            configured_root: config.root,
            max_size: config.max_blob_size,
        })
    }

    /// Map any accepted stored form onto a normalized root-relative path.
    ///
    /// Accepted forms are root-relative paths, absolute paths under the root,
    /// and legacy paths that start with the root as it was configured.
    fn relative_of(&self, stored: &str) -> Result<PathBuf, StorageError> {
        let unified = stored.trim().replace('\\', "/");
        let as_path = Path::new(&unified);

        if as_path.is_absolute() {
            let rel = as_path
                .strip_prefix(&self.root)
                .or_else(|_| as_path.strip_prefix(&self.configured_root))
                .map_err(|_| StorageError::PathViolation(stored.to_string()))?;
            return normalize_relative(&rel.to_string_lossy());
        }

        if let Ok(rel) = as_path.strip_prefix(&self.configured_root) {
            return normalize_relative(&rel.to_string_lossy());
        }

        normalize_relative(&unified)
    }

    /// Canonicalize an existing path and require it to sit strictly below the root.
    async fn contain_existing(&self, path: &Path, shown: &str) -> Result<PathBuf, StorageError> {
        let real = match fs::canonicalize(path).await {
            Ok(real) => real,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(shown.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if real == self.root || !real.starts_with(&self.root) {
            return Err(StorageError::PathViolation(shown.to_string()));
        }
        Ok(real)
    }

    /// Make sure the bucket directory exists and resolves inside the root.
    async fn prepare_dir(&self, relative_dir: &Path, shown: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(relative_dir);

        // Check the deepest existing ancestor first so that a symlinked
        // component cannot make us create directories outside the root.
        let mut ancestor = dir.as_path();
        while !fs::try_exists(ancestor).await? {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        let real_ancestor = fs::canonicalize(ancestor).await?;
        if !real_ancestor.starts_with(&self.root) {
            return Err(StorageError::PathViolation(shown.to_string()));
        }

        fs::create_dir_all(&dir).await?;
        let real_dir = fs::canonicalize(&dir).await?;
        if !real_dir.starts_with(&self.root) {
            return Err(StorageError::PathViolation(shown.to_string()));
        }
        Ok(real_dir)
    }

    /// Exclusively create a file in `dir`, suffixing the name on collision.
    async fn reserve(&self, dir: &Path, name: &str) -> Result<(fs::File, String), StorageError> {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.to_string()
            } else {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                match ext {
                    Some(ext) => format!("{stem}_{}.{ext}", &suffix[..8]),
                    None => format!("{stem}_{}", &suffix[..8]),
                }
            };

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await
            {
                Ok(file) => return Ok((file, candidate)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %candidate, "blob name taken, retrying with suffix");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for '{name}' after {MAX_NAME_ATTEMPTS} attempts"),
        )))
    }

    async fn copy_limited(
        &self,
        file: &mut fs::File,
        mut reader: BoxReader,
    ) -> Result<u64, StorageError> {
        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        Ok(total_bytes)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(&self, stored: &str) -> Result<PathBuf, StorageError> {
        self.relative_of(stored)
    }

    async fn put_stream(
        &self,
        bucket_relative: &str,
        reader: BoxReader,
    ) -> Result<StoredBlob, StorageError> {
        let relative = normalize_relative(bucket_relative)?;
        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidFilename(bucket_relative.to_string()))?
            .to_string();
        let relative_dir = relative.parent().unwrap_or(Path::new(""));

        let dir = self.prepare_dir(relative_dir, bucket_relative).await?;
        let (mut file, used_name) = self.reserve(&dir, &name).await?;
        let absolute_path = dir.join(&used_name);

        let size = match self.copy_limited(&mut file, reader).await {
            Ok(size) => size,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&absolute_path).await;
                return Err(e);
            }
        };

        let mut segments: Vec<String> = relative_dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        segments.push(used_name);

        Ok(StoredBlob {
            relative_path: segments.join("/"),
            absolute_path,
            size,
        })
    }

    async fn resolve(&self, stored: &str) -> Result<PathBuf, StorageError> {
        let relative = self.relative_of(stored)?;
        let real = self.contain_existing(&self.root.join(relative), stored).await?;

        if !fs::metadata(&real).await?.is_file() {
            return Err(StorageError::NotFound(stored.to_string()));
        }
        Ok(real)
    }

    async fn open(&self, stored: &str) -> Result<OpenedBlob, StorageError> {
        let path = self.resolve(stored).await?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(stored.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        Ok(OpenedBlob {
            path,
            size,
            reader: Box::new(BufReader::new(file)),
        })
    }

    async fn remove(&self, absolute: &Path) -> RemovalOutcome {
        if !absolute.starts_with(&self.root) {
            warn!(path = %absolute.display(), "Refusing to remove blob outside storage root");
            return RemovalOutcome::Failed("path outside storage root".into());
        }

        match fs::remove_file(absolute).await {
            Ok(()) => RemovalOutcome::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RemovalOutcome::AlreadyAbsent,
            Err(e) => {
                warn!(path = %absolute.display(), error = %e, "Failed to remove blob");
                RemovalOutcome::Failed(e.to_string())
            }
        }
    }
}
