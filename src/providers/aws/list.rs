use crate::error::StoreError;
use crate::providers::ListPage;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

pub(super) async fn list_page(
    client: &Client,
    bucket: &str,
    prefix: &str,
    continuation_token: Option<&str>,
    max_keys: i32,
) -> Result<ListPage, StoreError> {
    let mut request = client.list_objects_v2().bucket(bucket).max_keys(max_keys);

    if !prefix.is_empty() {
        request = request.prefix(prefix);
    }
    if let Some(token) = continuation_token {
        request = request.continuation_token(token);
    }

    let response = request.send().await.map_err(|e| StoreError::List {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        reason: DisplayErrorContext(&e).to_string(),
    })?;

    let keys = response
        .contents()
        .iter()
        .filter_map(|obj| obj.key().map(|key| key.to_string()))
        .collect();

    let next_token = if response.is_truncated().unwrap_or(false) {
        response.next_continuation_token().map(|s| s.to_string())
    } else {
        None
    };

    Ok(ListPage { keys, next_token })
}
