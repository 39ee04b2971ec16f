//! Tracing setup for structured logging.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Noisy dependency targets kept at warn unless RUST_LOG says otherwise.
const QUIET_TARGETS: &str = "sqlx=warn,rskafka=warn,hyper=warn,reqwest=warn";

/// Tracing configuration.
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "worker=debug")
    pub filter: String,
    /// Whether to output JSON format
    pub json: bool,
    /// Whether to include span open/close events
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    /// The filter directive with dependency noise suppressed.
    fn directive(&self) -> String {
        if self.filter.contains('=') {
            self.filter.clone()
        } else {
            format!("{},{}", self.filter, QUIET_TARGETS)
        }
    }
}

/// Initialize tracing with the given configuration.
pub fn init_tracing(config: TracingConfig) {
    let directive = config.directive();
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    tracing::info!(filter = %directive, "Tracing initialized");
}

/// Initialize tracing from environment variables (`RUST_LOG`, `LOG_JSON`,
/// `LOG_SPANS`).
pub fn init_tracing_from_env() {
    let flag = |name: &str| {
        std::env::var(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    init_tracing(
        TracingConfig::new()
            .with_filter(filter)
            .with_json(flag("LOG_JSON"))
            .with_span_events(flag("LOG_SPANS")),
    );
}
