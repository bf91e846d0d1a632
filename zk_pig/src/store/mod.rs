//! Durable storage of the pipeline artifacts.

use std::{fmt, future::Future};

use clap::ValueEnum;

mod artifacts;
pub mod codec;
mod file;
mod memory;

pub use artifacts::ArtifactStore;
pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ContentType {
    #[default]
    Json,
    Cbor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ContentEncoding {
    #[default]
    Plain,
    Gzip,
}

/// How stored bytes are to be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Headers {
    pub content_type: ContentType,
    pub content_encoding: ContentEncoding,
}

impl Headers {
    /// File extension for content stored with these headers.
    pub fn extension(&self) -> &'static str {
        match (self.content_type, self.content_encoding) {
            (ContentType::Json, ContentEncoding::Plain) => "json",
            (ContentType::Json, ContentEncoding::Gzip) => "json.gz",
            (ContentType::Cbor, ContentEncoding::Plain) => "cbor",
            (ContentType::Cbor, ContentEncoding::Gzip) => "cbor.gz",
        }
    }

    fn key(&self, path: &str) -> String {
        format!("{path}.{}", self.extension())
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("i/o error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bytes addressed by slash-separated paths.
pub trait Store: Send + Sync + 'static {
    fn store(
        &self,
        path: &str,
        bytes: Vec<u8>,
        headers: Headers,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load(
        &self,
        path: &str,
        headers: Headers,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}

/// Writes to both stores; reads from the first one that has the content.
#[derive(Clone, Debug)]
pub struct MultiStore<A, B> {
    first: A,
    second: B,
}

impl<A, B> MultiStore<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Store, B: Store> Store for MultiStore<A, B> {
    async fn store(&self, path: &str, bytes: Vec<u8>, headers: Headers) -> Result<(), StoreError> {
        futures::try_join!(
            self.first.store(path, bytes.clone(), headers),
            self.second.store(path, bytes, headers),
        )?;
        Ok(())
    }

    async fn load(&self, path: &str, headers: Headers) -> Result<Vec<u8>, StoreError> {
        match self.first.load(path, headers).await {
            Err(StoreError::NotFound(_)) => self.second.load(path, headers).await,
            res => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[tokio::test]
    async fn multi_store_falls_back() {
        let first = MemoryStore::default();
        let second = MemoryStore::default();
        let headers = Headers::default();
        second.store("1/2/x", b"old".to_vec(), headers).await.unwrap();

        let multi = MultiStore::new(first.clone(), second.clone());
        check!(multi.load("1/2/x", headers).await.unwrap() == b"old");

        multi.store("1/2/y", b"new".to_vec(), headers).await.unwrap();
        check!(first.load("1/2/y", headers).await.unwrap() == b"new");
        check!(second.load("1/2/y", headers).await.unwrap() == b"new");

        let_assert!(Err(StoreError::NotFound(_)) = multi.load("1/2/z", headers).await);
    }

    #[test]
    fn extensions() {
        let headers = Headers {
            content_type: ContentType::Cbor,
            content_encoding: ContentEncoding::Gzip,
        };
        check!(headers.key("1/5/preflight") == "1/5/preflight.cbor.gz");
        check!(Headers::default().to_string() == "json");
    }
}
