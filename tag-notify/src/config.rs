//! Deployment settings read from the environment.
//!
//! Settings are fixed per deployment and loaded once at process start. A
//! missing required variable is fatal.

use crate::error::{Error, Result};

pub const ENV_TOPIC_ARN: &str = "SNS_TOPIC_ARN";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_THUMB_BUCKET: &str = "THUMB_BUCKET";
pub const ENV_RAW_BUCKET: &str = "RAW_BUCKET";

/// Where the broker lives. Needed by both handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub topic_arn: String,
    pub region: String,
}

/// Buckets holding the media referenced by change records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSettings {
    /// Bucket with generated thumbnails.
    pub thumb_bucket: String,
    /// Bucket with the original uploads.
    pub raw_bucket: String,
    pub region: String,
}

impl MediaSettings {
    /// Public URL of an object in the thumbnail bucket.
    pub fn thumbnail_url(&self, key: &str) -> String {
        object_url(&self.thumb_bucket, &self.region, key)
    }

    /// Public URL of an object in the source bucket.
    pub fn full_url(&self, key: &str) -> String {
        object_url(&self.raw_bucket, &self.region, key)
    }
}

fn object_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
}

impl BrokerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            topic_arn: required(&lookup, ENV_TOPIC_ARN)?,
            region: required(&lookup, ENV_REGION)?,
        })
    }
}

impl MediaSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            thumb_bucket: required(&lookup, ENV_THUMB_BUCKET)?,
            raw_bucket: required(&lookup, ENV_RAW_BUCKET)?,
            region: required(&lookup, ENV_REGION)?,
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingEnv(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_broker_settings_load() {
        let s = BrokerSettings::from_lookup(vars(&[
            (ENV_TOPIC_ARN, "arn:aws:sns:us-east-1:123456789012:birds"),
            (ENV_REGION, "us-east-1"),
        ]))
        .unwrap();
        assert_eq!(s.topic_arn, "arn:aws:sns:us-east-1:123456789012:birds");
        assert_eq!(s.region, "us-east-1");
    }

    #[test]
    fn test_missing_topic_is_fatal() {
        let err = BrokerSettings::from_lookup(vars(&[(ENV_REGION, "us-east-1")])).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ENV_TOPIC_ARN)));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = MediaSettings::from_lookup(vars(&[
            (ENV_THUMB_BUCKET, "  "),
            (ENV_RAW_BUCKET, "raw"),
            (ENV_REGION, "us-east-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ENV_THUMB_BUCKET)));
    }

    #[test]
    fn test_object_urls() {
        let s = MediaSettings {
            thumb_bucket: "thumbs".into(),
            raw_bucket: "raw".into(),
            region: "ap-southeast-2".into(),
        };
        assert_eq!(
            s.thumbnail_url("t.jpg"),
            "https://thumbs.s3.ap-southeast-2.amazonaws.com/t.jpg"
        );
        assert_eq!(
            s.full_url("a/f.jpg"),
            "https://raw.s3.ap-southeast-2.amazonaws.com/a/f.jpg"
        );
    }
}
