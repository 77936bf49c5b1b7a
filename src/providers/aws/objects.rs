use crate::error::StoreError;
use crate::providers::ObjectBody;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

pub(super) async fn get_object_body(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<ObjectBody, StoreError> {
    let response = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| StoreError::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: DisplayErrorContext(&e).to_string(),
        })?;

    Ok(Box::new(response.body.into_async_read()))
}
