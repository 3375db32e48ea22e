//! # Tag Notify
//!
//! Tag-filtered notifications for media items.
//!
//! - [`notifier::ChangeNotifier`] turns DynamoDB stream records for tagged
//!   media into SNS messages carrying a filterable `tags` attribute.
//! - [`subscription::SubscriptionManager`] creates an email subscription and
//!   attaches a filter policy for the requested tags.
//!
//! Both handlers are stateless and reach the broker through
//! [`broker::Broker`].

pub mod broker;
pub mod config;
pub mod error;
pub mod notifier;
pub mod response;
pub mod stream;
pub mod subscription;

pub use broker::Broker;
pub use config::{BrokerSettings, MediaSettings};
pub use error::{Error, Result};
pub use notifier::{BatchReport, ChangeNotifier, NotificationMessage, RecordOutcome};
pub use response::HandlerResponse;
pub use stream::{ChangeRecord, MediaTagSet, SkipReason, StreamEvent};
pub use subscription::{ApiRequest, FilterPolicy, SubscriptionManager, SubscriptionOutcome};
