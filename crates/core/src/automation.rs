//! Automation rules: trigger, filters, and the closed set of actions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::Error;
use crate::event::TrackedEvent;
use crate::filter::path_equals;

/// What kind of signal starts an automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on a tracked event with this exact (case-sensitive) name.
    Event {
        #[serde(alias = "event")]
        event_name: String,
    },
    /// Fires on segment membership; evaluated elsewhere, never by event.
    Segment {
        #[serde(default, alias = "segment")]
        segment_id: Option<String>,
    },
}

impl Trigger {
    pub fn event(name: impl Into<String>) -> Self {
        Self::Event {
            event_name: name.into(),
        }
    }

    /// Whether this trigger fires for an event with the given name.
    pub fn fires_on(&self, event_name: &str) -> bool {
        match self {
            Self::Event { event_name: name } => name == event_name,
            Self::Segment { .. } => false,
        }
    }
}

/// Email action parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailParams {
    /// Explicit recipient; otherwise resolved from the event's user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// HTML body.
    #[serde(skip_serializing_if = "Option::is_none", alias = "html")]
    pub body: Option<String>,
}

/// SMS action parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Push notification parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Ad-network audience parameters (Meta custom audiences, Google remarketing lists).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudienceParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience_id: Option<String>,
}

/// Ad campaign creation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CampaignParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub daily_budget: Option<f64>,
}

/// Outbound webhook parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WebhookParams {
    #[validate(url)]
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// Closed set of action kinds, each with its own parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Email(EmailParams),
    Sms(SmsParams),
    Push(PushParams),
    MetaAudienceAdd(AudienceParams),
    GoogleRemarketing(AudienceParams),
    CreateAdCampaign(CampaignParams),
    Webhook(WebhookParams),
}

impl ActionKind {
    /// The wire tag for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Sms(_) => "sms",
            Self::Push(_) => "push",
            Self::MetaAudienceAdd(_) => "meta_audience_add",
            Self::GoogleRemarketing(_) => "google_remarketing",
            Self::CreateAdCampaign(_) => "create_ad_campaign",
            Self::Webhook(_) => "webhook",
        }
    }

    fn params_value(&self) -> Value {
        let value = match self {
            Self::Email(p) => serde_json::to_value(p),
            Self::Sms(p) => serde_json::to_value(p),
            Self::Push(p) => serde_json::to_value(p),
            Self::MetaAudienceAdd(p) | Self::GoogleRemarketing(p) => serde_json::to_value(p),
            Self::CreateAdCampaign(p) => serde_json::to_value(p),
            Self::Webhook(p) => serde_json::to_value(p),
        };
        // Plain structs of strings/maps/numbers always serialize.
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// One step of an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub kind: ActionKind,
    /// Initial visibility delay of the job, in milliseconds.
    pub delay_ms: u64,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, delay_ms: 0 }
    }

    pub fn email(params: EmailParams) -> Self {
        Self::new(ActionKind::Email(params))
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Stored shape of an action: `{ "type": ..., "params": {...}, "delay_ms": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, alias = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

fn decode_params<T: serde::de::DeserializeOwned>(action_type: &str, params: Value) -> Result<T, Error> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| Error::invalid_action(format!("{action_type} params: {e}")))
}

fn check<T: Validate>(action_type: &str, params: T) -> Result<T, Error> {
    params
        .validate()
        .map_err(|e| Error::invalid_action(format!("{action_type} params: {e}")))?;
    Ok(params)
}

impl TryFrom<RawAction> for Action {
    type Error = Error;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let t = raw.action_type.as_str();
        let kind = match t {
            "email" => ActionKind::Email(decode_params(t, raw.params)?),
            "sms" => ActionKind::Sms(decode_params(t, raw.params)?),
            "push" => ActionKind::Push(decode_params(t, raw.params)?),
            "meta_audience_add" => ActionKind::MetaAudienceAdd(decode_params(t, raw.params)?),
            "google_remarketing" => ActionKind::GoogleRemarketing(decode_params(t, raw.params)?),
            "create_ad_campaign" => {
                ActionKind::CreateAdCampaign(check(t, decode_params(t, raw.params)?)?)
            }
            "webhook" => ActionKind::Webhook(check(t, decode_params(t, raw.params)?)?),
            other => return Err(Error::invalid_action(format!("unknown action type '{other}'"))),
        };

        Ok(Self {
            kind,
            delay_ms: raw.delay_ms.unwrap_or(0),
        })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        Self {
            action_type: action.kind.type_name().to_string(),
            params: action.kind.params_value(),
            delay_ms: (action.delay_ms > 0).then_some(action.delay_ms),
        }
    }
}

/// A persisted rule mapping an event trigger and filters to actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    /// Field path → expected literal, AND-combined. `None` always matches.
    #[serde(default)]
    pub filters: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Automation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            filters: None,
            actions: Vec::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_filter(mut self, path: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), expected.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Whether every filter holds against the event tree.
    pub fn filters_match(&self, tree: &Value) -> bool {
        self.filters.as_ref().map_or(true, |filters| {
            filters
                .iter()
                .all(|(path, expected)| path_equals(tree, path, expected))
        })
    }

    /// Trigger and filter check against one event.
    pub fn matches(&self, event: &TrackedEvent) -> bool {
        self.trigger.fires_on(&event.event_name) && self.filters_match(&event.to_tree())
    }
}
