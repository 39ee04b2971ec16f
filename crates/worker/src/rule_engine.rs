//! Rule evaluation: matches active automations against an enriched event,
//! records one execution per match and fans out one notification job per
//! action.

use crate::consumer::JobHandler;
use async_trait::async_trait;
use automation_core::{
    Automation, EvaluateEventJob, ExecutionKey, InsertOutcome, NotificationJob, Result,
};
use postgres_store::{AutomationStore, EventStore, ExecutionStore};
use redpanda::{enqueue, topic, JobEnvelope, JobOptions, JobPublisher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// Counters for one evaluated event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub automations_considered: usize,
    pub matched: usize,
    pub executions_created: usize,
    pub duplicates: usize,
    /// Existing executions whose action jobs were published on this run.
    pub fan_outs_resumed: usize,
    pub jobs_published: usize,
    pub failed_automations: usize,
}

/// Consumes `automations.evaluate` and feeds `automations.notify`.
pub struct RuleEngineWorker {
    events: Arc<dyn EventStore>,
    automations: Arc<dyn AutomationStore>,
    executions: Arc<dyn ExecutionStore>,
    publisher: Arc<dyn JobPublisher>,
}

impl RuleEngineWorker {
    pub fn new(
        events: Arc<dyn EventStore>,
        automations: Arc<dyn AutomationStore>,
        executions: Arc<dyn ExecutionStore>,
        publisher: Arc<dyn JobPublisher>,
    ) -> Self {
        Self {
            events,
            automations,
            executions,
            publisher,
        }
    }

    /// Evaluates every active automation against one event.
    pub async fn evaluate(&self, job: &EvaluateEventJob) -> Result<EvaluationSummary> {
        let mut summary = EvaluationSummary::default();

        let Some(event) = self.events.get_event(&job.event_id).await? else {
            debug!(event_id = %job.event_id, "Event not found, nothing to evaluate");
            return Ok(summary);
        };

        let automations = self.automations.list_active_automations().await?;
        summary.automations_considered = automations.len();
        metrics().automations_evaluated.inc_by(automations.len() as u64);

        for automation in &automations {
            if !automation.matches(&event) {
                continue;
            }
            summary.matched += 1;
            metrics().automations_matched.inc();

            let key = ExecutionKey::new(&automation.id, &event.id, event.user_id.clone());
            match self.executions.insert_if_absent(&key).await {
                Ok(InsertOutcome::Created) => {
                    summary.executions_created += 1;
                    metrics().executions_created.inc();
                }
                Ok(InsertOutcome::AlreadyExists) => {
                    summary.duplicates += 1;
                    metrics().executions_duplicate.inc();

                    // A queued row without published actions means an earlier
                    // delivery stopped between insert and publish.
                    if !self.executions.awaits_fan_out(&key).await? {
                        debug!(
                            automation_id = %automation.id,
                            event_id = %event.id,
                            "Execution already recorded, skipping fan-out"
                        );
                        continue;
                    }
                    summary.fan_outs_resumed += 1;
                    warn!(
                        automation_id = %automation.id,
                        event_id = %event.id,
                        "Execution queued without published actions, resuming fan-out"
                    );
                }
                Err(e) => {
                    summary.failed_automations += 1;
                    metrics().execution_insert_errors.inc();
                    error!(
                        automation_id = %automation.id,
                        event_id = %event.id,
                        error = %e,
                        "Failed to record execution"
                    );
                    continue;
                }
            }

            match self.fan_out(automation, &key).await {
                Ok(published) => {
                    summary.jobs_published += published;
                    // The jobs are out; a lost flag only risks a duplicate fan-out.
                    if let Err(e) = self.executions.mark_actions_published(&key).await {
                        warn!(
                            key = %key.partition_key(),
                            error = %e,
                            "Failed to mark execution actions published"
                        );
                    }
                    info!(
                        automation_id = %automation.id,
                        automation = %automation.name,
                        event_id = %event.id,
                        actions = published,
                        "Automation matched"
                    );
                }
                Err(e) => {
                    self.compensate(&key).await;
                    return Err(e);
                }
            }
        }

        debug!(event_id = %event.id, summary = ?summary, "Evaluation finished");
        Ok(summary)
    }

    /// Publishes one job per action, in order.
    async fn fan_out(&self, automation: &Automation, key: &ExecutionKey) -> Result<usize> {
        let partition_key = key.partition_key();
        for action in &automation.actions {
            let options = JobOptions::default()
                .with_key(partition_key.clone())
                .with_delay(Duration::from_millis(action.delay_ms));

            enqueue(
                self.publisher.as_ref(),
                topic::NOTIFICATION,
                &NotificationJob::new(key, action.clone()),
                options,
            )
            .await?;
        }
        Ok(automation.actions.len())
    }

    /// Drops the queued execution so the redelivered job fans out again.
    ///
    /// If the delete fails the row stays unpublished, and the redelivery
    /// resumes the fan-out from it instead.
    async fn compensate(&self, key: &ExecutionKey) {
        match self.executions.discard_queued(key).await {
            Ok(removed) => warn!(
                key = %key.partition_key(),
                removed = removed,
                "Action publish failed, execution discarded for redelivery"
            ),
            Err(e) => error!(
                key = %key.partition_key(),
                error = %e,
                "Action publish failed and execution could not be discarded"
            ),
        }
    }
}

#[async_trait]
impl JobHandler for RuleEngineWorker {
    fn name(&self) -> &'static str {
        "rule-engine"
    }

    fn queue(&self) -> &'static str {
        topic::RULE_ENGINE
    }

    async fn handle(&self, envelope: &JobEnvelope) -> Result<()> {
        let job: EvaluateEventJob = envelope.decode()?;
        self.evaluate(&job).await.map(|_| ())
    }
}
