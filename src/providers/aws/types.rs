use crate::config::S3Settings;
use crate::error::StoreError;
use crate::providers::s3_client::{create_s3_client, S3ClientConfig};
use crate::providers::{ListPage, ObjectBody, ObjectStore};
use async_trait::async_trait;
use aws_sdk_s3::Client;

/// `ObjectStore` backed by the S3 `ListObjectsV2` and `GetObject` APIs
#[derive(Debug, Clone)]
pub struct AwsStore {
    client: Client,
    page_size: i32,
}

impl AwsStore {
    pub fn new(client: Client, page_size: i32) -> Self {
        Self { client, page_size }
    }

    /// Build a client from the AWS provider chain plus any overrides in `settings`.
    pub async fn connect(settings: &S3Settings) -> Self {
        let client = create_s3_client(&S3ClientConfig {
            region: settings.region.as_deref(),
            endpoint_url: settings.endpoint_url.as_deref(),
            force_path_style: settings.force_path_style,
            static_credentials: settings
                .credentials
                .as_ref()
                .map(|(id, secret)| (id.as_str(), secret.as_str())),
        })
        .await;

        Self::new(client, settings.page_size)
    }
}

#[async_trait]
impl ObjectStore for AwsStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        super::list::list_page(&self.client, bucket, prefix, continuation_token, self.page_size)
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        super::objects::get_object_body(&self.client, bucket, key).await
    }
}
