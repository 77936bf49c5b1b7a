use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::Client;
use log::debug;

/// Region used when neither the flags nor the provider chain name one
pub const FALLBACK_REGION: &str = "us-east-1";

#[derive(Default)]
pub struct S3ClientConfig<'a> {
    pub region: Option<&'a str>,
    pub endpoint_url: Option<&'a str>,
    pub force_path_style: bool,
    /// Static access key id / secret pair; the default provider chain is used otherwise
    pub static_credentials: Option<(&'a str, &'a str)>,
}

pub async fn create_s3_client(config: &S3ClientConfig<'_>) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = config.region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some((access_key_id, secret_access_key)) = config.static_credentials {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "s3-mirror-static",
        );
        loader = loader.credentials_provider(credentials);
    }

    let shared_config = loader.load().await;
    let mut builder = S3ConfigBuilder::from(&shared_config);

    if shared_config.region().is_none() {
        debug!("s3_client: no region configured, using {}", FALLBACK_REGION);
        builder = builder.region(Region::new(FALLBACK_REGION));
    }

    if let Some(endpoint_url) = config.endpoint_url {
        builder = builder.endpoint_url(endpoint_url);
    }

    if config.force_path_style {
        builder = builder.force_path_style(true);
    }

    Client::from_conf(builder.build())
}
