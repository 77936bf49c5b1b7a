//! Remote object store capability
//!
//! The mirror pipeline only needs two things from a store: one page of keys
//! under a bucket + prefix, and a readable body for a single key.

pub mod aws;
pub mod memory;
pub mod s3_client;

use crate::error::StoreError;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use aws::AwsStore;
pub use memory::MemoryStore;

/// Streaming body of a remote object. Dropping it releases the connection.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// One page of a paginated listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Cursor for the next page, `None` once the listing is exhausted
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch one page of keys under `prefix`, starting after `continuation_token`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Open the body of `key` as a byte stream.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError>;
}
