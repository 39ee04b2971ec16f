//! Marketing Automation Pipeline
//!
//! Event-driven background workers:
//! - Enrichment: user agent annotation, hand-off to the rule engine
//! - Rule engine: trigger/filter matching, execution records, action fan-out
//! - Notifications: email dispatch and execution status updates
//!
//! Stages talk through Redpanda queues with retry/backoff and dead-letter
//! topics; Postgres holds events, automations, executions, offsets and jobs
//! parked until their visibility time.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use postgres_store::{PgStore, PostgresConfig};
use redpanda::{
    default_topic_configs, Consumer, DelayStore, JobPublisher, Producer, RedpandaConfig,
};
use telemetry::{health, init_tracing_from_env};
use worker::{
    DelayedJobReleaser, EnrichmentWorker, HttpMailer, JobHandler, JobRunner, MailConfig,
    NotificationSettings, NotificationWorker, QueueWorker, QueueWorkerConfig, RuleEngineWorker,
    WorkerConfig, WorkerRole, WorkerScheduler,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Stages this process runs
    #[serde(default = "default_roles")]
    roles: Vec<WorkerRole>,

    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    worker: WorkerConfig,

    #[serde(default)]
    notification: NotificationSettings,

    #[serde(default)]
    mail: MailConfig,
}

fn default_roles() -> Vec<WorkerRole> {
    WorkerRole::ALL.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            postgres: PostgresConfig::default(),
            redpanda: RedpandaConfig::default(),
            worker: WorkerConfig::default(),
            notification: NotificationSettings::default(),
            mail: MailConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Automation Pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    if config.roles.is_empty() {
        return Err(anyhow!("No worker roles configured"));
    }

    info!(
        roles = ?config.roles,
        brokers = ?config.redpanda.brokers,
        partitions = ?config.redpanda.consumer.partitions,
        postgres = %config.postgres.redacted_url(),
        "Loaded configuration"
    );

    let store = Arc::new(
        PgStore::connect(&config.postgres)
            .await
            .context("Failed to connect to Postgres")?,
    );

    if config.postgres.init_schema {
        postgres_store::schema::init_schema(&store)
            .await
            .context("Failed to initialize Postgres schema")?;
    }

    check_health(&config, &store).await;

    match redpanda::health::ensure_topics(
        &config.redpanda,
        &default_topic_configs(config.redpanda.partitions, config.redpanda.replication_factor),
    )
    .await
    {
        Ok(created) if !created.is_empty() => info!(topics = ?created, "Created missing topics"),
        Ok(_) => {}
        Err(e) => error!("Failed to ensure topics: {}", e),
    }

    let producer: Arc<dyn JobPublisher> = Arc::new(Producer::new(config.redpanda.clone()));
    let delays: Arc<dyn DelayStore> = store.clone();

    let mut scheduler = WorkerScheduler::new(config.worker.clone());
    if config.worker.release_delayed {
        scheduler = scheduler.with_releaser(
            DelayedJobReleaser::new(delays.clone(), producer.clone())
                .with_config(config.worker.releaser.clone()),
        );
    }
    for role in &config.roles {
        let handler = build_handler(*role, &config, &store, &producer)?;

        for &partition in &config.redpanda.consumer.partitions {
            let consumer = Arc::new(Consumer::new(
                role.topic(),
                partition,
                config.redpanda.clone(),
                store.clone(),
            ));
            let runner = JobRunner::new(
                handler.clone(),
                producer.clone(),
                delays.clone(),
                config.worker.job_timeout(),
            );
            scheduler = scheduler.with_worker(
                QueueWorker::new(consumer, runner).with_config(QueueWorkerConfig {
                    error_pause: config.worker.error_pause(),
                }),
            );
        }
    }

    let scheduler = Arc::new(scheduler);
    let handles = scheduler.start();

    shutdown_signal().await;

    info!("Shutting down...");
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        // Aborted tasks resolve to a cancellation error.
        let _ = handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Builds the stage handler for one role.
fn build_handler(
    role: WorkerRole,
    config: &Config,
    store: &Arc<PgStore>,
    producer: &Arc<dyn JobPublisher>,
) -> Result<Arc<dyn JobHandler>> {
    let handler: Arc<dyn JobHandler> = match role {
        WorkerRole::Enrichment => Arc::new(EnrichmentWorker::new(store.clone(), producer.clone())),
        WorkerRole::RuleEngine => Arc::new(RuleEngineWorker::new(
            store.clone(),
            store.clone(),
            store.clone(),
            producer.clone(),
        )),
        WorkerRole::Notification => {
            let mailer = HttpMailer::new(config.mail.clone()).context("Failed to create mailer")?;
            Arc::new(
                NotificationWorker::new(store.clone(), store.clone(), Arc::new(mailer))
                    .with_settings(config.notification.clone()),
            )
        }
    };
    Ok(handler)
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("AUTOMATION")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(url) = std::env::var("AUTOMATION_DATABASE_URL") {
        config.postgres.url = url;
    }
    if let Ok(roles) = std::env::var("AUTOMATION_ROLES") {
        config.roles = parse_roles(&roles)?;
    }
    if let Ok(brokers) = std::env::var("AUTOMATION_REDPANDA_BROKERS") {
        config.redpanda.brokers = split_list(&brokers);
    }
    if let Ok(username) = std::env::var("AUTOMATION_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("AUTOMATION_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(partitions) = std::env::var("AUTOMATION_CONSUMER_PARTITIONS") {
        config.redpanda.consumer.partitions = split_list(&partitions)
            .iter()
            .map(|p| p.parse::<i32>())
            .collect::<std::result::Result<_, _>>()
            .context("Invalid AUTOMATION_CONSUMER_PARTITIONS")?;
    }
    if let Ok(key) = std::env::var("AUTOMATION_MAIL_API_KEY") {
        config.mail.api_key = Some(key);
    }
    if let Ok(from) = std::env::var("AUTOMATION_MAIL_FROM_ADDRESS") {
        config.mail.from_address = Some(from);
    }
    if let Ok(name) = std::env::var("AUTOMATION_MAIL_FROM_NAME") {
        config.mail.from_name = Some(name);
    }

    Ok(config)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_roles(value: &str) -> Result<Vec<WorkerRole>> {
    split_list(value)
        .into_iter()
        .map(|role| {
            serde_json::from_value(serde_json::Value::String(role.clone()))
                .with_context(|| format!("Unknown worker role '{}'", role))
        })
        .collect()
}

/// Check component health on startup.
async fn check_health(config: &Config, store: &PgStore) {
    if redpanda::health::check_connection(&config.redpanda).await {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    if postgres_store::health::check_connection(store).await {
        health().postgres.set_healthy();
        info!("Postgres connection: healthy");
    } else {
        health().postgres.set_unhealthy("Connection failed");
        error!("Postgres connection: unhealthy");
    }

    if config.mail.is_configured() {
        health().mail.set_healthy();
        info!("Mail channel: configured");
    } else {
        health().mail.set_unhealthy("API key or sender address missing");
        warn!("Mail channel: not configured, email actions will fail");
    }
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
