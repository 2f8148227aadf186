//! Integration testing helpers for the LocalStack fixture.
//!
//! Builds AWS SDK clients that talk to a fixture's emulated endpoint.

use aws_config::BehaviorVersion;
use aws_sdk_sns::config::{Credentials, Region};
use localstack_fixture::LocalStackEndpoint;

/// Region the emulated services are addressed in.
pub const DEFAULT_REGION: &str = "us-east-1";

/// SNS client for the emulator behind `endpoint`.
///
/// Uses the fixture's placeholder credentials so nothing from the ambient
/// AWS profile or environment leaks into the tests.
pub async fn sns_client(endpoint: &LocalStackEndpoint) -> aws_sdk_sns::Client {
    let credentials = Credentials::new(
        endpoint.credentials.access_key_id,
        endpoint.credentials.secret_access_key,
        None,
        None,
        "localstack-fixture",
    );

    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(DEFAULT_REGION))
        .endpoint_url(&endpoint.service_url)
        .credentials_provider(credentials)
        .load()
        .await;

    aws_sdk_sns::Client::new(&config)
}

/// Name for a topic that no other test uses.
pub fn unique_topic_name(test_name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", test_name, &suffix[..8])
}
