use aws_config::{BehaviorVersion, Region, SdkConfig};
use ticketdesk_core::config::AwsConfig;

pub type DynamoClient = aws_sdk_dynamodb::Client;

/// Shared SDK configuration; region, profile and endpoint fall back to the
/// standard provider chain when unset.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &aws.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

pub async fn connect(aws: &AwsConfig) -> DynamoClient {
    DynamoClient::new(&load_sdk_config(aws).await)
}
