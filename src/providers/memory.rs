//! In-process object store
//!
//! Serves a single bucket held in memory through `ObjectStore`. Listing and
//! fetch failures, broken or stalled bodies and request latency can be
//! injected, and the number of simultaneously open bodies is tracked so
//! callers can check how many downloads were in flight at once.

use crate::error::StoreError;
use crate::providers::{ListPage, ObjectBody, ObjectStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::ops::Bound;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Default)]
pub struct MemoryStats {
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    open_bodies: AtomicUsize,
    peak_open_bodies: AtomicUsize,
}

impl MemoryStats {
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Bodies currently open (fetch started, body not yet dropped)
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }

    pub fn peak_open_bodies(&self) -> usize {
        self.peak_open_bodies.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    bucket: String,
    objects: BTreeMap<String, Arc<[u8]>>,
    page_size: usize,
    read_chunk: usize,
    latency: Option<Duration>,
    fail_list_page: Option<usize>,
    fail_get: HashSet<String>,
    fail_read: HashSet<String>,
    stall_read: HashSet<String>,
    delay_get: HashMap<String, Duration>,
    stats: Arc<MemoryStats>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: BTreeMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            read_chunk: DEFAULT_READ_CHUNK,
            latency: None,
            fail_list_page: None,
            fail_get: HashSet::new(),
            fail_read: HashSet::new(),
            stall_read: HashSet::new(),
            delay_get: HashMap::new(),
            stats: Arc::new(MemoryStats::default()),
        }
    }

    pub fn with_object(mut self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(key.into(), Arc::from(content.into()));
        self
    }

    /// Keys returned per listing page (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Largest slice a body hands out per read (at least 1)
    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    /// Delay applied to every list and fetch request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the listing request for the given 1-based page number
    pub fn fail_list_page(mut self, page: usize) -> Self {
        self.fail_list_page = Some(page);
        self
    }

    /// Fail the fetch request for `key`
    pub fn fail_get(mut self, key: impl Into<String>) -> Self {
        self.fail_get.insert(key.into());
        self
    }

    /// Break the body of `key` after its first chunk
    pub fn fail_read(mut self, key: impl Into<String>) -> Self {
        self.fail_read.insert(key.into());
        self
    }

    /// Hang the body of `key` after its first chunk; reads never complete
    pub fn stall_read(mut self, key: impl Into<String>) -> Self {
        self.stall_read.insert(key.into());
        self
    }

    /// Extra delay before the fetch of `key` answers, on top of any latency
    pub fn delay_get(mut self, key: impl Into<String>, delay: Duration) -> Self {
        self.delay_get.insert(key.into(), delay);
        self
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    fn list_error(&self, bucket: &str, prefix: &str, reason: String) -> StoreError {
        StoreError::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            reason,
        }
    }

    fn fetch_error(&self, bucket: &str, key: &str, reason: &str) -> StoreError {
        StoreError::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

// Tokens are "<page number>|<last key of previous page>"
fn encode_token(page: usize, last_key: &str) -> String {
    format!("{}|{}", page, last_key)
}

fn decode_token(token: &str) -> Option<(usize, &str)> {
    let (page, last_key) = token.split_once('|')?;
    Some((page.parse().ok()?, last_key))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.stats.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if bucket != self.bucket {
            return Err(self.list_error(bucket, prefix, "NoSuchBucket".to_string()));
        }

        let (page, start) = match continuation_token {
            None => (1, Bound::Unbounded),
            Some(token) => match decode_token(token) {
                Some((page, last_key)) => (page, Bound::Excluded(last_key)),
                None => {
                    return Err(self.list_error(
                        bucket,
                        prefix,
                        format!("invalid continuation token '{}'", token),
                    ))
                }
            },
        };

        if self.fail_list_page == Some(page) {
            return Err(self.list_error(bucket, prefix, format!("injected failure on page {}", page)));
        }

        let mut matching = self
            .objects
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(encode_token(page + 1, last)),
            _ => None,
        };

        Ok(ListPage { keys, next_token })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        self.stats.get_calls.fetch_add(1, Ordering::SeqCst);
        let guard = OpenBodyGuard::new(self.stats.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(delay) = self.delay_get.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if bucket != self.bucket {
            return Err(self.fetch_error(bucket, key, "NoSuchBucket"));
        }
        if self.fail_get.contains(key) {
            return Err(self.fetch_error(bucket, key, "injected fetch failure"));
        }
        let data = self
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| self.fetch_error(bucket, key, "NoSuchKey"))?;

        Ok(Box::new(MemoryBody {
            data,
            pos: 0,
            read_chunk: self.read_chunk,
            broken: self.fail_read.contains(key),
            stalled: self.stall_read.contains(key),
            _guard: guard,
        }))
    }
}

struct OpenBodyGuard(Arc<MemoryStats>);

impl OpenBodyGuard {
    fn new(stats: Arc<MemoryStats>) -> Self {
        let open = stats.open_bodies.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_open_bodies.fetch_max(open, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for OpenBodyGuard {
    fn drop(&mut self) {
        self.0.open_bodies.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryBody {
    data: Arc<[u8]>,
    pos: usize,
    read_chunk: usize,
    broken: bool,
    stalled: bool,
    _guard: OpenBodyGuard,
}

impl AsyncRead for MemoryBody {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.broken && this.pos > 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected body failure",
            )));
        }
        if this.stalled && this.pos > 0 {
            return Poll::Pending;
        }

        let remaining = &this.data[this.pos..];
        let n = remaining.len().min(this.read_chunk).min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn store() -> MemoryStore {
        MemoryStore::new("bucket")
            .with_object("a/1", "one")
            .with_object("a/2", "two")
            .with_object("a/3", "three")
            .with_object("b/1", "other")
            .with_page_size(2)
    }

    #[tokio::test]
    async fn pages_follow_tokens_and_respect_prefix() {
        let store = store();

        let first = store.list_page("bucket", "a/", None).await.unwrap();
        assert_eq!(first.keys, vec!["a/1", "a/2"]);
        let token = first.next_token.expect("second page");

        let second = store.list_page("bucket", "a/", Some(&token)).await.unwrap();
        assert_eq!(second.keys, vec!["a/3"]);
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn exact_page_boundary_has_no_trailing_token() {
        let store = MemoryStore::new("bucket")
            .with_object("x", "1")
            .with_object("y", "2")
            .with_page_size(2);
        let page = store.list_page("bucket", "", None).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert_eq!(page.next_token, None);
    }

    #[tokio::test]
    async fn injected_list_failure_hits_requested_page() {
        let store = store().fail_list_page(2);
        let first = store.list_page("bucket", "", None).await.unwrap();
        let err = store
            .list_page("bucket", "", first.next_token.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::List { .. }));
    }

    #[tokio::test]
    async fn body_is_served_in_chunks_and_tracks_open_count() {
        let store = store().with_read_chunk(2);
        let mut body = store.get_object("bucket", "a/3").await.unwrap();
        assert_eq!(store.stats().open_bodies(), 1);

        let mut buf = [0u8; 16];
        let n = body.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"th");

        let mut rest = Vec::new();
        body.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"ree");

        drop(body);
        assert_eq!(store.stats().open_bodies(), 0);
        assert_eq!(store.stats().peak_open_bodies(), 1);
    }

    #[tokio::test]
    async fn stalled_body_hangs_after_first_chunk() {
        let store = store().with_read_chunk(2).stall_read("a/3");
        let mut body = store.get_object("bucket", "a/3").await.unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(body.read(&mut buf).await.unwrap(), 2);
        let next = tokio::time::timeout(Duration::from_millis(20), body.read(&mut buf)).await;
        assert!(next.is_err());

        drop(body);
        assert_eq!(store.stats().open_bodies(), 0);
    }

    #[tokio::test]
    async fn missing_key_is_a_fetch_error() {
        let err = store().get_object("bucket", "nope").await.err().unwrap();
        assert!(err.to_string().contains("NoSuchKey"));
    }
}
