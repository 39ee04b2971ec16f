//! Broker connection setup shared by producer, consumer and health checks.

use crate::config::RedpandaConfig;
use automation_core::{error::QueueErrorCode, Error, Result};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the configured brokers, with TLS + SASL when credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if let Some((username, password)) = config.sasl_credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    builder.build().await.map_err(|e| {
        Error::queue(
            QueueErrorCode::ConnectionFailed,
            format!("Failed to connect to Redpanda: {}", e),
        )
    })
}
