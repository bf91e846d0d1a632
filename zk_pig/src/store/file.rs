use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{Headers, Store, StoreError};

/// Stores content as files under a root directory.
///
/// Files are written next to their destination and renamed into place, so a
/// reader never sees a partial artifact.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file(&self, path: &str, headers: Headers) -> PathBuf {
        self.root.join(headers.key(path))
    }
}

fn io_error(file: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: file.display().to_string(),
        source,
    }
}

impl Store for FileStore {
    async fn store(&self, path: &str, bytes: Vec<u8>, headers: Headers) -> Result<(), StoreError> {
        let file = self.file(path, headers);
        if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;
        }
        let mut partial = file.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(io_error(&partial))?;
        tokio::fs::rename(&partial, &file)
            .await
            .map_err(io_error(&file))?;
        debug!(file = %file.display(), len = bytes.len(), "stored");
        Ok(())
    }

    async fn load(&self, path: &str, headers: Headers) -> Result<Vec<u8>, StoreError> {
        let file = self.file(path, headers);
        match tokio::fs::read(&file).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(file.display().to_string()))
            }
            res => res.map_err(io_error(&file)),
        }
    }
}
