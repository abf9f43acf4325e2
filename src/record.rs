//! The persisted résumé record.
//!
//! Serialised as a camelCase JSON object and stored as the key-value
//! string value under `resume:<id>`:
//!
//! ```json
//! { "id": "…", "resumePath": "…", "imageFile": "…", "companyName": "…",
//!   "jobTitle": "…", "jobDescription": "…", "feedback": "" }
//! ```
//!
//! `feedback` is the literal empty string until analysis completes, then the
//! parsed feedback object.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One résumé submission and its feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub id: String,
    /// Storage path of the uploaded résumé.
    pub resume_path: String,
    /// Storage path of the rendered page image.
    pub image_file: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    #[serde(default)]
    pub feedback: Feedback,
}

impl ResumeRecord {
    /// A new record with a fresh id and pending feedback.
    pub fn new(
        resume_path: impl Into<String>,
        image_file: impl Into<String>,
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        job_description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_record_id(),
            resume_path: resume_path.into(),
            image_file: image_file.into(),
            company_name: company_name.into(),
            job_title: job_title.into(),
            job_description: job_description.into(),
            feedback: Feedback::Pending,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A fresh, never-reused record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Feedback attached to a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Feedback {
    /// Analysis has not completed. Serialised as `""`.
    #[default]
    Pending,
    /// The parsed feedback object.
    Ready(Map<String, Value>),
}

impl Feedback {
    pub fn is_pending(&self) -> bool {
        matches!(self, Feedback::Pending)
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Feedback::Ready(map) => Some(map),
            Feedback::Pending => None,
        }
    }

    /// `overallScore`, when the feedback carries one.
    pub fn overall_score(&self) -> Option<i64> {
        self.as_object()?.get("overallScore")?.as_i64()
    }
}

impl Serialize for Feedback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Feedback::Pending => serializer.serialize_str(""),
            Feedback::Ready(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Feedback {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Feedback::Pending),
            Value::String(s) if s.is_empty() => Ok(Feedback::Pending),
            Value::Object(map) => Ok(Feedback::Ready(map)),
            other => Err(de::Error::custom(format!(
                "feedback must be \"\" or an object, got {other}"
            ))),
        }
    }
}
