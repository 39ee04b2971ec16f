//! Notification dispatch for matched automations.

use crate::consumer::JobHandler;
use crate::mailer::{MailMessage, Mailer};
use async_trait::async_trait;
use automation_core::{
    ActionKind, EmailParams, ExecutionKey, ExecutionStatus, NotificationJob, Result,
    UpdateOutcome,
};
use postgres_store::{ExecutionStore, UserDirectory};
use redpanda::{topic, JobEnvelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};
use validator::ValidateEmail;

pub const UNCONFIGURED_ERROR: &str = "email channel not configured";

/// Notification defaults and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_subject")]
    pub default_subject: String,
    #[serde(default = "default_body")]
    pub default_body: String,
    /// Mark executions failed when the mail channel is not configured
    #[serde(default = "default_fail_unconfigured")]
    pub fail_unconfigured: bool,
}

fn default_subject() -> String {
    "You have a new notification".to_string()
}

fn default_body() -> String {
    "<p>You have a new notification.</p>".to_string()
}

fn default_fail_unconfigured() -> bool {
    true
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            default_subject: default_subject(),
            default_body: default_body(),
            fail_unconfigured: default_fail_unconfigured(),
        }
    }
}

/// What a notification job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Action kind without a dispatch channel here.
    Skipped { action: &'static str },
    Sent { to: String },
    /// Recorded as failed on the execution.
    Failed { reason: String },
    /// Mail channel missing and executions are left untouched.
    Unconfigured,
}

/// Consumes `automations.notify`.
pub struct NotificationWorker {
    executions: Arc<dyn ExecutionStore>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    settings: NotificationSettings,
}

impl NotificationWorker {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            executions,
            users,
            mailer,
            settings: NotificationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: NotificationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Dispatches one action and records the result on its execution.
    ///
    /// Per-recipient problems end up in the execution row; only storage
    /// errors are returned.
    pub async fn process(&self, job: &NotificationJob) -> Result<NotificationOutcome> {
        let key = job.execution_key();

        let params = match &job.action.kind {
            ActionKind::Email(params) => params,
            ActionKind::Sms(_)
            | ActionKind::Push(_)
            | ActionKind::MetaAudienceAdd(_)
            | ActionKind::GoogleRemarketing(_)
            | ActionKind::CreateAdCampaign(_)
            | ActionKind::Webhook(_) => {
                metrics().notifications_skipped.inc();
                debug!(
                    action = job.action.type_name(),
                    automation_id = %job.automation_id,
                    "No dispatcher for action, skipping"
                );
                return Ok(NotificationOutcome::Skipped {
                    action: job.action.type_name(),
                });
            }
        };

        let to = match self.resolve_recipient(params, job.user_id.as_deref()).await? {
            Ok(to) => to,
            Err(reason) => {
                let reason = format!("recipient resolution failed: {}", reason);
                return self.fail(&key, reason).await;
            }
        };

        if !self.mailer.is_configured() {
            warn!(automation_id = %job.automation_id, "Email channel not configured");
            if self.settings.fail_unconfigured {
                return self.fail(&key, UNCONFIGURED_ERROR.to_string()).await;
            }
            metrics().notifications_skipped.inc();
            return Ok(NotificationOutcome::Unconfigured);
        }

        let message = MailMessage {
            to: to.clone(),
            subject: non_empty(params.subject.as_deref())
                .unwrap_or(&self.settings.default_subject)
                .to_string(),
            html: non_empty(params.body.as_deref())
                .unwrap_or(&self.settings.default_body)
                .to_string(),
        };

        let start = Instant::now();
        let sent = self.mailer.send(&message).await;
        metrics()
            .dispatch_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        match sent {
            Ok(()) => {
                self.record(&key, ExecutionStatus::Success, None).await?;
                metrics().notifications_sent.inc();
                info!(
                    automation_id = %job.automation_id,
                    event_id = %job.event_id,
                    to = %to,
                    "Email sent"
                );
                Ok(NotificationOutcome::Sent { to })
            }
            Err(e) => self.fail(&key, e.to_string()).await,
        }
    }

    /// Explicit `to`, else the user's address. The inner error is the
    /// reason no address could be used.
    async fn resolve_recipient(
        &self,
        params: &EmailParams,
        user_id: Option<&str>,
    ) -> Result<std::result::Result<String, String>> {
        let address = match non_empty(params.to.as_deref()) {
            Some(to) => to.to_string(),
            None => {
                let Some(user_id) = user_id else {
                    return Ok(Err("no recipient and no user".to_string()));
                };
                match self.users.get_email_address(user_id).await? {
                    Some(email) => email,
                    None => return Ok(Err(format!("no email address for user {}", user_id))),
                }
            }
        };

        if !address.validate_email() {
            return Ok(Err(format!("invalid email address '{}'", address)));
        }
        Ok(Ok(address))
    }

    async fn fail(&self, key: &ExecutionKey, reason: String) -> Result<NotificationOutcome> {
        self.record(key, ExecutionStatus::Failed, Some(&reason)).await?;
        metrics().notifications_failed.inc();
        warn!(key = %key.partition_key(), reason = %reason, "Notification failed");
        Ok(NotificationOutcome::Failed { reason })
    }

    async fn record(
        &self,
        key: &ExecutionKey,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if self.executions.update_status(key, status, error).await? == UpdateOutcome::NotFound {
            debug!(key = %key.partition_key(), status = %status, "No execution row to update");
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl JobHandler for NotificationWorker {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn queue(&self) -> &'static str {
        topic::NOTIFICATION
    }

    async fn handle(&self, envelope: &JobEnvelope) -> Result<()> {
        let job: NotificationJob = envelope.decode()?;
        self.process(&job).await.map(|_| ())
    }
}
