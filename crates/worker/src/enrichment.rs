//! Event enrichment via user agent parsing.
//!
//! Parses `metadata.user_agent` to extract device/browser/OS information,
//! marks the event enriched and forwards it to the rule engine.

use crate::consumer::JobHandler;
use async_trait::async_trait;
use automation_core::{EnrichEventJob, EvaluateEventJob, Result, TrackedEvent};
use postgres_store::EventStore;
use redpanda::{enqueue, topic, JobEnvelope, JobOptions, JobPublisher};
use serde_json::{Map, Value};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info};
use woothee::parser::Parser;

/// Derives device annotations from a user agent.
///
/// Uses the woothee library for fast UA parsing (~6.8us/parse).
/// Extracts: browser name/version, OS, device category.
pub struct EventAnnotator {
    parser: Parser,
}

impl EventAnnotator {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Annotations for a user agent string; empty when nothing is recognized.
    pub fn annotate(&self, user_agent: &str) -> Map<String, Value> {
        let mut annotations = Map::new();
        if user_agent.trim().is_empty() {
            return annotations;
        }

        let Some(result) = self.parser.parse(user_agent) else {
            return annotations;
        };

        let known = |s: &str| !s.is_empty() && s != "UNKNOWN";
        if known(result.name) {
            annotations.insert("browser".into(), result.name.into());
        }
        let version = result.version.to_string();
        if known(&version) {
            annotations.insert("browser_version".into(), version.into());
        }
        if known(result.os) {
            annotations.insert("os".into(), result.os.into());
        }

        // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
        let device_type = match result.category {
            "pc" => "desktop",
            "smartphone" | "mobilephone" => "mobile",
            "crawler" => "bot",
            "appliance" => "other",
            _ => "unknown",
        };
        if device_type != "unknown" {
            annotations.insert("device_type".into(), device_type.into());
        }

        annotations
    }

    /// Annotations for an event, without keys its metadata already has.
    pub fn annotate_event(&self, event: &TrackedEvent) -> Map<String, Value> {
        let Some(user_agent) = event.user_agent() else {
            return Map::new();
        };

        let mut annotations = self.annotate(user_agent);
        annotations.retain(|key, _| !event.metadata.contains_key(key));
        annotations
    }
}

impl Default for EventAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

/// What an enrichment job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// The job carried no usable event id.
    Skipped,
    /// The event was marked enriched (if present) and forwarded.
    Forwarded { event_found: bool, annotations: usize },
}

/// Consumes `events.enrich` and feeds `automations.evaluate`.
pub struct EnrichmentWorker {
    events: Arc<dyn EventStore>,
    publisher: Arc<dyn JobPublisher>,
    annotator: EventAnnotator,
}

impl EnrichmentWorker {
    pub fn new(events: Arc<dyn EventStore>, publisher: Arc<dyn JobPublisher>) -> Self {
        Self {
            events,
            publisher,
            annotator: EventAnnotator::new(),
        }
    }

    /// Enriches one event and hands it to the rule engine.
    ///
    /// Storage and publish errors propagate so the job is retried; the job
    /// only completes once the evaluation job is published.
    pub async fn process(&self, job: &EnrichEventJob) -> Result<EnrichOutcome> {
        let Some(event_id) = job.event_id() else {
            debug!("Enrichment job without event id, nothing to do");
            return Ok(EnrichOutcome::Skipped);
        };

        let event = self.events.get_event(event_id).await?;
        let annotations = event
            .as_ref()
            .map(|e| self.annotator.annotate_event(e))
            .unwrap_or_default();

        self.events.mark_enriched(event_id, &annotations).await?;

        enqueue(
            self.publisher.as_ref(),
            topic::RULE_ENGINE,
            &EvaluateEventJob::new(event_id),
            JobOptions::default().with_key(event_id),
        )
        .await?;

        metrics().events_enriched.inc();
        info!(
            event_id = event_id,
            found = event.is_some(),
            annotations = annotations.len(),
            "Event enriched"
        );

        Ok(EnrichOutcome::Forwarded {
            event_found: event.is_some(),
            annotations: annotations.len(),
        })
    }
}

#[async_trait]
impl JobHandler for EnrichmentWorker {
    fn name(&self) -> &'static str {
        "enrichment"
    }

    fn queue(&self) -> &'static str {
        topic::ENRICHMENT
    }

    async fn handle(&self, envelope: &JobEnvelope) -> Result<()> {
        let job: EnrichEventJob = envelope.decode()?;
        self.process(&job).await.map(|_| ())
    }
}
