use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns as sns;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::types::MessageAttributeValue;
use tracing::debug;

use super::{Broker, PublishRequest, SubscribeRequest};
use crate::error::{Error, Result};

/// [`Broker`] backed by Amazon SNS.
pub struct SnsBroker {
    client: sns::Client,
}

impl SnsBroker {
    /// Build a client for `region` from the default credential chain.
    pub async fn connect(region: &str) -> Self {
        let conf = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_client(sns::Client::new(&conf))
    }

    pub fn from_client(client: sns::Client) -> Self {
        Self { client }
    }
}

fn broker_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Broker(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl Broker for SnsBroker {
    fn name(&self) -> &'static str {
        "sns"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<String> {
        let mut req = self
            .client
            .publish()
            .topic_arn(&request.topic_arn)
            .subject(&request.subject)
            .message(&request.message);

        for (name, attr) in &request.message_attributes {
            let value = MessageAttributeValue::builder()
                .data_type(&attr.data_type)
                .string_value(&attr.string_value)
                .build()
                .map_err(|e| Error::Broker(format!("invalid message attribute '{name}': {e}")))?;
            req = req.message_attributes(name, value);
        }

        let out = req.send().await.map_err(broker_error)?;
        let message_id = out.message_id().unwrap_or_default().to_string();
        debug!(%message_id, subject = %request.subject, "sns publish ok");
        Ok(message_id)
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<String> {
        let out = self
            .client
            .subscribe()
            .topic_arn(&request.topic_arn)
            .protocol(&request.protocol)
            .endpoint(&request.endpoint)
            .return_subscription_arn(request.return_subscription_arn)
            .send()
            .await
            .map_err(broker_error)?;

        out.subscription_arn()
            .map(|arn| arn.to_string())
            .ok_or_else(|| Error::Broker("subscribe response carried no SubscriptionArn".into()))
    }

    async fn set_subscription_attribute(
        &self,
        subscription_arn: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.client
            .set_subscription_attributes()
            .subscription_arn(subscription_arn)
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(broker_error)?;
        Ok(())
    }
}
