//! Download worker - streams one object to its mirrored local path

use crate::error::DownloadError;
use crate::providers::ObjectStore;
use log::debug;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Map an object key onto a path under `root`.
///
/// `"a/b/c.txt"` becomes `root/a/b/c.txt`. Keys that would land outside
/// `root` (absolute paths, `..` components) or that name a directory are
/// rejected.
pub fn local_path(root: &Path, key: &str) -> Result<PathBuf, DownloadError> {
    let unsafe_key = |reason| DownloadError::UnsafeKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(unsafe_key("empty key"));
    }
    if key.ends_with('/') {
        return Err(unsafe_key("directory marker"));
    }

    let mut path = root.to_path_buf();
    let mut parts = 0;
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                parts += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(unsafe_key("contains '..'")),
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_key("absolute path")),
        }
    }
    if parts == 0 {
        return Err(unsafe_key("no file name"));
    }

    Ok(path)
}

/// Fetches objects from one bucket and writes them under a local root
pub struct Downloader<S> {
    store: Arc<S>,
    bucket: String,
    root: PathBuf,
    chunk_size: usize,
}

impl<S: ObjectStore> Downloader<S> {
    pub fn new(
        store: Arc<S>,
        bucket: impl Into<String>,
        root: impl Into<PathBuf>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Download `key` to its local path, returning the number of bytes written.
    ///
    /// The remote body and the local file are both dropped before this
    /// returns, whatever the outcome. An existing file is truncated. A failure
    /// or cancellation mid-copy leaves a partial file behind.
    pub async fn download(&self, key: &str, cancel: &CancellationToken) -> Result<u64, DownloadError> {
        let cancelled = || DownloadError::Cancelled {
            key: key.to_string(),
        };
        let destination = local_path(&self.root, key)?;

        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            body = self.store.get_object(&self.bucket, key) => body?,
        };

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| DownloadError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let mut file = File::create(&destination)
            .await
            .map_err(|source| DownloadError::CreateFile {
                path: destination.clone(),
                source,
            })?;

        let write_error = |source| DownloadError::Write {
            path: destination.clone(),
            source,
        };

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;
        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                read = body.read(&mut buffer) => read.map_err(|source| DownloadError::Read {
                    key: key.to_string(),
                    source,
                })?,
            };
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n]).await.map_err(write_error)?;
            written += n as u64;
        }

        // tokio's File completes writes in the background; flush surfaces their errors
        file.flush().await.map_err(write_error)?;
        drop(file);
        drop(body);

        debug!("download_written: {} -> {} bytes={}", key, destination.display(), written);
        Ok(written)
    }
}
