//! Subscription Manager.
//!
//! One request walks `received -> validated -> subscribed -> filtered`. The
//! broker cannot create a subscription and its filter policy in one call, so
//! a subscription can exist without a filter. When attaching the filter fails
//! the subscription is kept (the address may already have a confirmation
//! email) and the partial result is reported as its own outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::broker::{Broker, SubscribeRequest, FILTER_POLICY_ATTRIBUTE, PROTOCOL_EMAIL};
use crate::config::BrokerSettings;
use crate::error::Result;
use crate::response::{HandlerResponse, STATUS_BAD_REQUEST, STATUS_OK, STATUS_SERVER_ERROR};

pub const MSG_INVALID_JSON: &str = "Request body must be valid JSON.";
pub const MSG_INVALID_REQUEST: &str =
    "Body must include 'email' (string) and non-empty array 'tags'.";
pub const MSG_FILTER_FAILED: &str =
    "Subscription created; please confirm via email, but failed to set filter policy.";
pub const MSG_SUBSCRIBED: &str =
    "Subscription created. Please check your inbox and confirm the subscription.";

/// Inbound HTTP-style event. Only the raw body is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRequest {
    #[serde(default)]
    pub body: Option<String>,
}

/// A validated subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub email: String,
    pub tags: Vec<String>,
}

impl SubscriptionRequest {
    /// Parse and validate a request body. An absent or empty body is `{}`.
    pub fn parse(body: Option<&str>) -> std::result::Result<Self, SubscriptionOutcome> {
        let body = body.filter(|b| !b.is_empty()).unwrap_or("{}");
        let value: Value =
            serde_json::from_str(body).map_err(|_| SubscriptionOutcome::InvalidJson)?;
        Self::from_value(&value).ok_or(SubscriptionOutcome::InvalidRequest)
    }

    fn from_value(value: &Value) -> Option<Self> {
        let email = value.get("email")?.as_str().filter(|e| !e.is_empty())?;
        let tags = value
            .get("tags")?
            .as_array()?
            .iter()
            .map(|t| t.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        if tags.is_empty() {
            return None;
        }
        Some(Self {
            email: email.to_string(),
            tags,
        })
    }
}

/// Delivers a message when its `tags` attribute contains any listed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPolicy {
    pub tags: Vec<String>,
}

impl FilterPolicy {
    pub fn new(tags: &[String]) -> Self {
        Self {
            tags: tags.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Terminal state of one subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    InvalidJson,
    InvalidRequest,
    SubscribeFailed {
        error: String,
    },
    /// Subscription exists but has no filter policy.
    FilterFailed {
        subscription_arn: String,
        error: String,
    },
    Subscribed {
        subscription_arn: String,
    },
}

impl SubscriptionOutcome {
    pub fn subscription_arn(&self) -> Option<&str> {
        match self {
            SubscriptionOutcome::FilterFailed {
                subscription_arn, ..
            }
            | SubscriptionOutcome::Subscribed { subscription_arn } => Some(subscription_arn),
            _ => None,
        }
    }

    pub fn to_response(&self) -> HandlerResponse {
        match self {
            SubscriptionOutcome::InvalidJson => {
                HandlerResponse::json(STATUS_BAD_REQUEST, &json!({"error": MSG_INVALID_JSON}))
            }
            SubscriptionOutcome::InvalidRequest => {
                HandlerResponse::json(STATUS_BAD_REQUEST, &json!({"error": MSG_INVALID_REQUEST}))
            }
            SubscriptionOutcome::SubscribeFailed { error } => HandlerResponse::json(
                STATUS_SERVER_ERROR,
                &json!({"error": format!("Unable to subscribe: {error}")}),
            ),
            SubscriptionOutcome::FilterFailed {
                subscription_arn,
                error,
            } => HandlerResponse::json(
                STATUS_SERVER_ERROR,
                &json!({
                    "message": MSG_FILTER_FAILED,
                    "subscriptionArn": subscription_arn,
                    "filter_error": error,
                }),
            ),
            SubscriptionOutcome::Subscribed { subscription_arn } => HandlerResponse::json(
                STATUS_OK,
                &json!({
                    "message": MSG_SUBSCRIBED,
                    "subscriptionArn": subscription_arn,
                }),
            ),
        }
    }
}

pub struct SubscriptionManager {
    broker: Arc<dyn Broker>,
    topic_arn: String,
}

impl SubscriptionManager {
    pub fn new(broker: Arc<dyn Broker>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            topic_arn: settings.topic_arn.clone(),
        }
    }

    pub async fn handle(&self, request: &ApiRequest) -> HandlerResponse {
        self.process(request.body.as_deref()).await.to_response()
    }

    pub async fn process(&self, body: Option<&str>) -> SubscriptionOutcome {
        let request = match SubscriptionRequest::parse(body) {
            Ok(r) => r,
            Err(rejected) => {
                warn!(outcome = ?rejected, "subscription request rejected");
                return rejected;
            }
        };

        let subscription_arn = match self.subscribe(&request).await {
            Ok(arn) => arn,
            Err(e) => {
                error!(error = %e, "unable to subscribe");
                return SubscriptionOutcome::SubscribeFailed {
                    error: e.to_string(),
                };
            }
        };
        info!(%subscription_arn, tags = ?request.tags, "subscription created");

        match self.attach_filter(&subscription_arn, &request.tags).await {
            Ok(()) => {
                info!(%subscription_arn, "filter policy attached");
                SubscriptionOutcome::Subscribed { subscription_arn }
            }
            Err(e) => {
                error!(%subscription_arn, error = %e, "failed to set filter policy");
                SubscriptionOutcome::FilterFailed {
                    subscription_arn,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn subscribe(&self, request: &SubscriptionRequest) -> Result<String> {
        self.broker
            .subscribe(&SubscribeRequest {
                topic_arn: self.topic_arn.clone(),
                protocol: PROTOCOL_EMAIL.to_string(),
                endpoint: request.email.clone(),
                return_subscription_arn: true,
            })
            .await
    }

    async fn attach_filter(&self, subscription_arn: &str, tags: &[String]) -> Result<()> {
        let policy = FilterPolicy::new(tags).to_json()?;
        self.broker
            .set_subscription_attribute(subscription_arn, FILTER_POLICY_ATTRIBUTE, &policy)
            .await
    }
}
