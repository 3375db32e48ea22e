//! In-memory broker that records every call.
//!
//! Used by tests and by the CLI's `--mock` dry-run mode. Failures can be
//! injected per operation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use super::{Broker, PublishRequest, SubscribeRequest};
use crate::error::{Error, Result};

type PublishPredicate = Box<dyn Fn(&PublishRequest) -> bool + Send + Sync>;

/// A subscription attribute write seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeWrite {
    pub subscription_arn: String,
    pub name: String,
    pub value: String,
}

#[derive(Default)]
struct Calls {
    published: Vec<PublishRequest>,
    subscriptions: Vec<SubscribeRequest>,
    attributes: Vec<AttributeWrite>,
    attempts: usize,
}

#[derive(Default)]
pub struct RecordingBroker {
    calls: Mutex<Calls>,
    seq: AtomicU64,
    fail_publish: Option<PublishPredicate>,
    fail_subscribe: Option<String>,
    fail_set_attribute: Option<String>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish for which `pred` returns true.
    pub fn with_publish_failure<F>(mut self, pred: F) -> Self
    where
        F: Fn(&PublishRequest) -> bool + Send + Sync + 'static,
    {
        self.fail_publish = Some(Box::new(pred));
        self
    }

    pub fn with_subscribe_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_subscribe = Some(message.into());
        self
    }

    pub fn with_set_attribute_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_set_attribute = Some(message.into());
        self
    }

    /// Successfully published messages.
    pub fn published(&self) -> Vec<PublishRequest> {
        self.calls.lock().published.clone()
    }

    /// Successfully created subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscribeRequest> {
        self.calls.lock().subscriptions.clone()
    }

    pub fn attribute_writes(&self) -> Vec<AttributeWrite> {
        self.calls.lock().attributes.clone()
    }

    /// Number of calls made, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.lock().attempts
    }

    /// Everything recorded so far, for dry-run output.
    pub fn snapshot(&self) -> serde_json::Value {
        let calls = self.calls.lock();
        json!({
            "published": calls.published,
            "subscriptions": calls.subscriptions,
            "attributes": calls.attributes,
        })
    }

    fn next_id(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<String> {
        let mut calls = self.calls.lock();
        calls.attempts += 1;
        if let Some(pred) = &self.fail_publish {
            if pred(request) {
                return Err(Error::Broker(format!(
                    "mock publish rejected: {}",
                    request.subject
                )));
            }
        }
        calls.published.push(request.clone());
        Ok(format!("mock-message-{}", self.next_id()))
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<String> {
        let mut calls = self.calls.lock();
        calls.attempts += 1;
        if let Some(message) = &self.fail_subscribe {
            return Err(Error::Broker(message.clone()));
        }
        calls.subscriptions.push(request.clone());
        Ok(format!("{}:mock-subscription-{}", request.topic_arn, self.next_id()))
    }

    async fn set_subscription_attribute(
        &self,
        subscription_arn: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let mut calls = self.calls.lock();
        calls.attempts += 1;
        if let Some(message) = &self.fail_set_attribute {
            return Err(Error::Broker(message.clone()));
        }
        calls.attributes.push(AttributeWrite {
            subscription_arn: subscription_arn.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}
