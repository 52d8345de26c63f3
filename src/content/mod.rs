/// Content model shared by the sources, the cache, the render stage and the change detector.
pub mod cache;
#[cfg(test)]
pub mod mock;
pub mod photos;
pub mod weather;

use chrono::NaiveDateTime;
use image::GrayImage;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while retrieving content from a source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("source returned no content")]
    Empty,
    #[error("source not configured: {0}")]
    NotConfigured(String),
}

impl FetchError {
    /// Credentials are missing, invalid or expired. Retrying without outside help is pointless.
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::NotConfigured(_))
    }

    /// Map an HTTP status to an error, if it is one.
    pub fn from_status(status: reqwest::StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status.as_u16() {
            401 | 403 => FetchError::Auth(format!("server answered {status}")),
            code => FetchError::Status(code),
        })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// One displayable value of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Time(NaiveDateTime),
}

impl FieldValue {
    /// Stable serialization used for fingerprints. Times are cut to the minute.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Text(s) => format!("s:{s}"),
            FieldValue::Number(n) => format!("n:{n}"),
            FieldValue::Time(t) => format!("t:{}", t.format("%Y-%m-%dT%H:%M")),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(t: NaiveDateTime) -> Self {
        FieldValue::Time(t)
    }
}

/// An immutable unit of fetched content: named fields, an optional photo and the capture time.
#[derive(Debug, Clone)]
pub struct ContentSnapshot {
    fields: BTreeMap<String, FieldValue>,
    photo: Option<Arc<GrayImage>>,
    captured_at: NaiveDateTime,
}

impl ContentSnapshot {
    pub fn new(captured_at: NaiveDateTime) -> Self {
        Self {
            fields: BTreeMap::new(),
            photo: None,
            captured_at,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_photo(mut self, photo: GrayImage) -> Self {
        self.photo = Some(Arc::new(photo));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn photo(&self) -> Option<&GrayImage> {
        self.photo.as_deref()
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }
}

/// Adapter in front of a remote content provider
pub trait ContentSource {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Load credentials. Failing here means the source cannot be used until reconfigured.
    async fn authenticate(&mut self) -> Result<(), FetchError>;

    /// Fetch one fresh snapshot
    async fn fetch(&mut self) -> Result<ContentSnapshot, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_canonical_time_drops_seconds() {
        assert_eq!(
            FieldValue::Time(at(10, 15, 2)).canonical(),
            FieldValue::Time(at(10, 15, 59)).canonical()
        );
        assert_ne!(
            FieldValue::Time(at(10, 15, 59)).canonical(),
            FieldValue::Time(at(10, 16, 0)).canonical()
        );
    }

    #[test]
    fn test_canonical_keeps_type_apart() {
        assert_ne!(
            FieldValue::Text("21".into()).canonical(),
            FieldValue::Number(21.0).canonical()
        );
    }

    #[test]
    fn test_snapshot_fields_sorted() {
        let snap = ContentSnapshot::new(at(9, 0, 0))
            .with_field("temperature", "21.5°C")
            .with_field("humidity", "40%");
        let names: Vec<_> = snap.fields().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["humidity", "temperature"]);
        assert!(snap.photo().is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status(reqwest::StatusCode::OK).is_none());
        assert!(
            FetchError::from_status(reqwest::StatusCode::UNAUTHORIZED)
                .unwrap()
                .is_auth()
        );
        assert!(
            FetchError::from_status(reqwest::StatusCode::FORBIDDEN)
                .unwrap()
                .is_auth()
        );
        assert!(matches!(
            FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY),
            Some(FetchError::Status(502))
        ));
    }
}
