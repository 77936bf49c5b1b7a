//! Paginated key listing
//!
//! `Lister` turns the page-at-a-time store API into one lazy stream of keys
//! in listing order. It follows continuation tokens until the store reports
//! no further pages. The first failed page ends the stream with that error;
//! a fresh listing has to start again from page one.

use crate::error::StoreError;
use crate::providers::ObjectStore;
use futures_util::stream::{self, Stream, TryStreamExt};
use log::{debug, warn};
use std::sync::Arc;

pub struct Lister<S> {
    store: Arc<S>,
    bucket: String,
    prefix: String,
}

enum Cursor {
    Start,
    After(String),
    Done,
}

struct ListState<S> {
    lister: Lister<S>,
    cursor: Cursor,
    page: usize,
}

impl<S: ObjectStore> Lister<S> {
    pub fn new(store: Arc<S>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Stream of keys under the prefix, in listing order.
    pub fn keys(self) -> impl Stream<Item = Result<String, StoreError>> + Send {
        self.pages()
            .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, StoreError>)))
            .try_flatten()
    }

    /// Stream of pages. Directory markers (`dir/`) and empty keys are dropped.
    pub fn pages(self) -> impl Stream<Item = Result<Vec<String>, StoreError>> + Send {
        let state = ListState {
            lister: self,
            cursor: Cursor::Start,
            page: 0,
        };
        stream::try_unfold(state, next_page)
    }
}

async fn next_page<S: ObjectStore>(
    mut state: ListState<S>,
) -> Result<Option<(Vec<String>, ListState<S>)>, StoreError> {
    let token = match std::mem::replace(&mut state.cursor, Cursor::Done) {
        Cursor::Done => return Ok(None),
        Cursor::Start => None,
        Cursor::After(token) => Some(token),
    };
    state.page += 1;

    let lister = &state.lister;
    let page = lister
        .store
        .list_page(&lister.bucket, &lister.prefix, token.as_deref())
        .await?;
    debug!(
        "list_page: {} s3://{}/{} keys={} more={}",
        state.page,
        lister.bucket,
        lister.prefix,
        page.keys.len(),
        page.next_token.is_some()
    );

    state.cursor = match page.next_token {
        Some(next) if token.as_deref() == Some(next.as_str()) => {
            warn!(
                "list_stop: s3://{}/{} returned continuation token {} twice",
                lister.bucket, lister.prefix, next
            );
            Cursor::Done
        }
        Some(next) => Cursor::After(next),
        None => Cursor::Done,
    };

    let keys = page
        .keys
        .into_iter()
        .filter(|key| {
            let marker = key.is_empty() || key.ends_with('/');
            if marker {
                debug!("list_skip_marker: {:?}", key);
            }
            !marker
        })
        .collect();

    Ok(Some((keys, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ListPage, MemoryStore, ObjectBody};
    use async_trait::async_trait;
    use futures_util::TryStreamExt;

    fn store(page_size: usize) -> MemoryStore {
        let mut store = MemoryStore::new("bucket").with_page_size(page_size);
        for i in 0..7 {
            store = store.with_object(format!("logs/{:02}", i), "x");
        }
        store.with_object("other/1", "y")
    }

    #[tokio::test]
    async fn follows_every_page_in_order() {
        let store = Arc::new(store(3));
        let keys: Vec<String> = Lister::new(store.clone(), "bucket", "logs/")
            .keys()
            .try_collect()
            .await
            .unwrap();

        let expected: Vec<String> = (0..7).map(|i| format!("logs/{:02}", i)).collect();
        assert_eq!(keys, expected);
        assert_eq!(store.stats().list_calls(), 3);
    }

    #[tokio::test]
    async fn empty_prefix_lists_everything() {
        let keys: Vec<String> = Lister::new(Arc::new(store(1000)), "bucket", "")
            .keys()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys.len(), 8);
    }

    #[tokio::test]
    async fn failed_page_ends_the_stream_with_an_error() {
        let store = Arc::new(store(3).fail_list_page(2));
        let result: Result<Vec<String>, StoreError> = Lister::new(store, "bucket", "logs/")
            .keys()
            .try_collect()
            .await;
        assert!(matches!(result, Err(StoreError::List { .. })));
    }

    #[tokio::test]
    async fn directory_markers_are_skipped() {
        let store = Arc::new(
            MemoryStore::new("bucket")
                .with_object("dir/", "")
                .with_object("dir/file.txt", "x"),
        );
        let keys: Vec<String> = Lister::new(store, "bucket", "")
            .keys()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["dir/file.txt"]);
    }

    /// Always answers with the same page and the same token
    struct StuckStore;

    #[async_trait]
    impl ObjectStore for StuckStore {
        async fn list_page(
            &self,
            _bucket: &str,
            _prefix: &str,
            _continuation_token: Option<&str>,
        ) -> Result<ListPage, StoreError> {
            Ok(ListPage {
                keys: vec!["k".to_string()],
                next_token: Some("same".to_string()),
            })
        }

        async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
            Err(StoreError::Fetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "unused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn repeated_token_stops_listing() {
        let keys: Vec<String> = Lister::new(Arc::new(StuckStore), "bucket", "")
            .keys()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["k", "k"]);
    }
}
