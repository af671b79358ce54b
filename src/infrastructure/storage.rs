use crate::config::S3Config;
use crate::services::endpoint_pool::Endpoint;
use crate::services::storage::S3ObjectStore;
use anyhow::bail;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

/// Prefixes scheme-less addresses according to `secure`.
pub fn endpoint_url(address: &str, secure: bool) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        return address.trim_end_matches('/').to_string();
    }
    let scheme = if secure { "https" } else { "http" };
    format!("{}://{}", scheme, address.trim_end_matches('/'))
}

/// Builds one S3 client per configured endpoint. Does not contact any of them.
pub async fn setup_endpoints(config: &S3Config) -> anyhow::Result<Vec<Endpoint>> {
    if config.endpoints.is_empty() {
        bail!("PRODUCER_S3_ENDPOINT must list at least one endpoint");
    }
    if config.key_id.is_empty() || config.secret.is_empty() {
        bail!("PRODUCER_S3_KEYID and PRODUCER_S3_SECRET must be set");
    }

    let sdk_config = aws_config::from_env()
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            config.key_id.clone(),
            config.secret.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let endpoints = config
        .endpoints
        .iter()
        .map(|address| {
            let url = endpoint_url(address, config.secure);
            info!("☁️  S3 endpoint: {} (Bucket: {})", url, config.bucket_name);

            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .endpoint_url(&url)
                .force_path_style(true)
                .build();
            let client = aws_sdk_s3::Client::from_conf(s3_config);

            Endpoint::new(
                url,
                Arc::new(S3ObjectStore::new(client, config.bucket_name.clone())),
            )
        })
        .collect();

    Ok(endpoints)
}
