//! Pub/sub broker seam.
//!
//! Handlers only talk to the broker through [`Broker`]. Production uses
//! [`sns::SnsBroker`]; tests and dry runs use [`mock::RecordingBroker`].

pub mod mock;
pub mod sns;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Subscription attribute holding the filter policy.
pub const FILTER_POLICY_ATTRIBUTE: &str = "FilterPolicy";

/// Message attribute data type for a JSON-encoded list of strings.
pub const DATA_TYPE_STRING_ARRAY: &str = "String.Array";

/// Delivery protocol for email subscriptions.
pub const PROTOCOL_EMAIL: &str = "email";

/// Typed, named value attached to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    pub data_type: String,
    pub string_value: String,
}

impl MessageAttribute {
    pub fn string_array(values: &[String]) -> Result<Self> {
        Ok(Self {
            data_type: DATA_TYPE_STRING_ARRAY.to_string(),
            string_value: serde_json::to_string(values)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishRequest {
    pub topic_arn: String,
    pub subject: String,
    pub message: String,
    pub message_attributes: BTreeMap<String, MessageAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscribeRequest {
    pub topic_arn: String,
    pub protocol: String,
    pub endpoint: String,
    pub return_subscription_arn: bool,
}

/// Operations the handlers need from the broker.
#[async_trait]
pub trait Broker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Publish one message, returning the broker-assigned message id.
    async fn publish(&self, request: &PublishRequest) -> Result<String>;

    /// Create a subscription, returning its identifier (ARN).
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<String>;

    async fn set_subscription_attribute(
        &self,
        subscription_arn: &str,
        name: &str,
        value: &str,
    ) -> Result<()>;
}
