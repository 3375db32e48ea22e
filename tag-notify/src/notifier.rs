//! Change Notifier.
//!
//! Turns a batch of stream records into tag-filterable broker messages. Each
//! record is handled on its own: a skip or a failed publish never affects the
//! rest of the batch, and the batch itself always reports success so the
//! stream does not redeliver records that were already handled.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::broker::{Broker, MessageAttribute, PublishRequest};
use crate::config::{BrokerSettings, MediaSettings};
use crate::error::Result;
use crate::response::{HandlerResponse, STATUS_OK};
use crate::stream::{ChangeRecord, MediaItem, MediaTagSet, SkipReason, StreamEvent};

pub const SUBJECT_PREFIX: &str = "New BirdMedia Item: ";

/// Message attribute that subscription filter policies match against.
pub const TAGS_ATTRIBUTE: &str = "tags";

/// Body of a published notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub thumbnail_url: String,
    pub full_url: Option<String>,
    pub tags: MediaTagSet,
    pub event_type: String,
}

impl NotificationMessage {
    pub fn new(item: &MediaItem, media: &MediaSettings) -> Self {
        Self {
            thumbnail_url: media.thumbnail_url(&item.thumbnail_key),
            full_url: item.full_key.as_deref().map(|key| media.full_url(key)),
            tags: item.tags.clone(),
            event_type: item.event_name.clone(),
        }
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn subject(&self) -> String {
        format!("{SUBJECT_PREFIX}{}", self.tag_names().join(", "))
    }

    pub fn to_publish_request(&self, topic_arn: &str) -> Result<PublishRequest> {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            TAGS_ATTRIBUTE.to_string(),
            MessageAttribute::string_array(&self.tag_names())?,
        );
        Ok(PublishRequest {
            topic_arn: topic_arn.to_string(),
            subject: self.subject(),
            message: serde_json::to_string(self)?,
            message_attributes: attributes,
        })
    }
}

/// What happened to one record of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Published { message_id: String },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

/// Per-record outcomes of one batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Published { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }

    /// Batch-level response. Always a success.
    pub fn to_response(&self) -> HandlerResponse {
        HandlerResponse::new(STATUS_OK, &json!({"message": "Processed"}))
    }
}

pub struct ChangeNotifier {
    broker: Arc<dyn Broker>,
    topic_arn: String,
    media: MediaSettings,
}

impl ChangeNotifier {
    pub fn new(broker: Arc<dyn Broker>, settings: &BrokerSettings, media: MediaSettings) -> Self {
        Self {
            broker,
            topic_arn: settings.topic_arn.clone(),
            media,
        }
    }

    /// Process a batch and build the handler response.
    pub async fn handle(&self, event: StreamEvent) -> HandlerResponse {
        self.process_batch(event).await.to_response()
    }

    pub async fn process_batch(&self, event: StreamEvent) -> BatchReport {
        let total = event.records.len();
        let outcomes = join_all(
            event
                .records
                .into_iter()
                .enumerate()
                .map(|(index, raw)| self.process_record(index, raw)),
        )
        .await;

        let report = BatchReport { outcomes };
        info!(
            broker = self.broker.name(),
            records = total,
            published = report.published(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch processed"
        );
        report
    }

    async fn process_record(&self, index: usize, raw: serde_json::Value) -> RecordOutcome {
        let item = match ChangeRecord::from_value(raw).and_then(|r| r.media_item()) {
            Ok(item) => item,
            Err(reason) => {
                debug!(index, %reason, "record skipped");
                return RecordOutcome::Skipped { reason };
            }
        };

        let message = NotificationMessage::new(&item, &self.media);
        let published = match message.to_publish_request(&self.topic_arn) {
            Ok(request) => self.broker.publish(&request).await,
            Err(e) => Err(e),
        };

        match published {
            Ok(message_id) => {
                info!(index, %message_id, tags = ?message.tag_names(), "notification published");
                RecordOutcome::Published { message_id }
            }
            Err(e) => {
                warn!(index, error = %e, thumbnail = %item.thumbnail_key, "error publishing notification");
                RecordOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::RecordingBroker;
    use crate::broker::DATA_TYPE_STRING_ARRAY;
    use serde_json::{json, Value};

    const TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:bird-media";

    fn settings() -> (BrokerSettings, MediaSettings) {
        (
            BrokerSettings {
                topic_arn: TOPIC.into(),
                region: "us-east-1".into(),
            },
            MediaSettings {
                thumb_bucket: "bird-thumbs".into(),
                raw_bucket: "bird-raw".into(),
                region: "us-east-1".into(),
            },
        )
    }

    fn notifier(broker: Arc<RecordingBroker>) -> ChangeNotifier {
        let (b, m) = settings();
        ChangeNotifier::new(broker, &b, m)
    }

    fn media_record(event: &str, thumb: &str, tags: Value) -> Value {
        json!({
            "eventID": "1",
            "eventName": event,
            "dynamodb": {"NewImage": {
                "thumbnailKey": {"S": thumb},
                "fullKey": {"S": "f.jpg"},
                "tags": {"M": tags}
            }}
        })
    }

    fn batch(records: Vec<Value>) -> StreamEvent {
        StreamEvent { records }
    }

    #[tokio::test]
    async fn test_insert_end_to_end() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let event: StreamEvent = serde_json::from_value(json!({"Records": [{
            "eventName": "INSERT",
            "dynamodb": {"NewImage": {
                "thumbnailKey": {"S": "t.jpg"},
                "fullKey": {"S": "f.jpg"},
                "tags": {"M": {"robin": {"N": "1"}}}
            }}
        }]}))
        .unwrap();
        let response = n.handle(event).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body_json().unwrap(), json!({"message": "Processed"}));

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let p = &published[0];
        assert_eq!(p.topic_arn, TOPIC);
        assert!(p.subject.contains("robin"));
        assert_eq!(p.subject, "New BirdMedia Item: robin");

        let attr = &p.message_attributes[TAGS_ATTRIBUTE];
        assert_eq!(attr.data_type, DATA_TYPE_STRING_ARRAY);
        assert_eq!(attr.string_value, r#"["robin"]"#);

        let body: Value = serde_json::from_str(&p.message).unwrap();
        assert_eq!(body["tags"], json!({"robin": 1}));
        assert_eq!(body["eventType"], "INSERT");
        assert_eq!(
            body["thumbnailUrl"],
            "https://bird-thumbs.s3.us-east-1.amazonaws.com/t.jpg"
        );
        assert_eq!(body["fullUrl"], "https://bird-raw.s3.us-east-1.amazonaws.com/f.jpg");
    }

    #[tokio::test]
    async fn test_ignored_event_types_publish_nothing() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let tags = json!({"robin": {"N": "1"}});
        let report = n
            .process_batch(batch(vec![
                media_record("REMOVE", "t.jpg", tags.clone()),
                media_record("UPSERT", "t.jpg", tags.clone()),
                json!({"dynamodb": {"NewImage": {"thumbnailKey": {"S": "t.jpg"}}}}),
            ]))
            .await;

        assert_eq!(report.skipped(), 3);
        assert_eq!(broker.call_count(), 0);
        assert!(report
            .outcomes
            .iter()
            .all(|o| *o == RecordOutcome::Skipped { reason: SkipReason::IgnoredEvent }));
    }

    #[tokio::test]
    async fn test_incomplete_records_are_skipped_silently() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let response = n
            .handle(batch(vec![
                json!({"eventName": "INSERT", "dynamodb": {"NewImage": {
                    "tags": {"M": {"robin": {"N": "1"}}}
                }}}),
                media_record("MODIFY", "t.jpg", json!({})),
                json!({"eventName": "INSERT", "dynamodb": {"NewImage": {
                    "thumbnailKey": {"S": "t.jpg"}
                }}}),
                json!({"eventName": "INSERT"}),
                json!("not a record"),
            ]))
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(broker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_count_is_still_published() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let report = n
            .process_batch(batch(vec![media_record(
                "MODIFY",
                "t.jpg",
                json!({"robin": {"N": "lots"}}),
            )]))
            .await;

        assert_eq!(report.published(), 1);
        let body: Value = serde_json::from_str(&broker.published()[0].message).unwrap();
        assert_eq!(body["tags"], json!({"robin": 0}));
        assert_eq!(body["eventType"], "MODIFY");
    }

    #[tokio::test]
    async fn test_loose_attribute_shapes_are_published() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let mut with_stray_field = media_record("INSERT", "b.jpg", json!({"jay": {"N": "1"}}));
        with_stray_field["dynamodb"]["NewImage"]["size"] = json!({"N": 123});

        let report = n
            .process_batch(batch(vec![
                media_record("INSERT", "a.jpg", json!({"robin": {"N": 2}})),
                media_record("INSERT", "c.jpg", json!({"robin": {"N": null}})),
                media_record("INSERT", "d.jpg", json!({"robin": {}})),
                media_record("INSERT", "e.jpg", json!({"robin": {"X": "1"}})),
                with_stray_field,
            ]))
            .await;

        assert_eq!(report.published(), 5);
        let counts: Vec<Value> = broker
            .published()
            .iter()
            .map(|p| serde_json::from_str::<Value>(&p.message).unwrap()["tags"].clone())
            .collect();
        assert!(counts.contains(&json!({"robin": 2})));
        assert_eq!(counts.iter().filter(|c| **c == json!({"robin": 0})).count(), 3);
        assert!(counts.contains(&json!({"jay": 1})));
    }

    #[tokio::test]
    async fn test_publish_failure_is_isolated() {
        let broker = Arc::new(
            RecordingBroker::new().with_publish_failure(|req| req.subject.contains("jay")),
        );
        let n = notifier(broker.clone());

        let report = n
            .process_batch(batch(vec![
                media_record("INSERT", "a.jpg", json!({"jay": {"N": "2"}})),
                media_record("INSERT", "b.jpg", json!({"robin": {"N": "1"}})),
            ]))
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.published(), 1);
        assert!(matches!(report.outcomes[0], RecordOutcome::Failed { .. }));
        assert!(matches!(report.outcomes[1], RecordOutcome::Published { .. }));
        assert_eq!(report.to_response().status_code, 200);

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].subject.contains("robin"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let broker = Arc::new(RecordingBroker::new());
        let n = notifier(broker.clone());

        let response = n.handle(StreamEvent::default()).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(broker.call_count(), 0);
    }

    #[test]
    fn test_multi_tag_subject_and_attribute() {
        let (_, media) = settings();
        let item = MediaItem {
            event_name: "INSERT".into(),
            thumbnail_key: "t.jpg".into(),
            full_key: None,
            tags: MediaTagSet::from([("robin".into(), 1), ("jay".into(), 2)]),
        };
        let message = NotificationMessage::new(&item, &media);
        assert_eq!(message.full_url, None);
        assert_eq!(message.subject(), "New BirdMedia Item: jay, robin");

        let request = message.to_publish_request(TOPIC).unwrap();
        assert_eq!(
            request.message_attributes[TAGS_ATTRIBUTE].string_value,
            r#"["jay","robin"]"#
        );
        let body: Value = serde_json::from_str(&request.message).unwrap();
        assert_eq!(body["fullUrl"], Value::Null);
    }
}
