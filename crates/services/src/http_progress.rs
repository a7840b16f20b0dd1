use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use storage::legacy::{self, StoredProgress};
use storage::repository::{ProgressRepository, StorageError};
use workshop_core::model::{ProgressRecord, UserId, Workshop};

use crate::error::HttpProgressError;

#[derive(Clone, Debug)]
pub struct HttpProgressConfig {
    pub base_url: String,
    pub token: Option<String>,
}

/// `ProgressRepository` over the navigation-progress HTTP resource.
#[derive(Clone)]
pub struct HttpProgressRepository {
    client: Client,
    config: HttpProgressConfig,
}

/// Keys a payload may arrive under; older servers used the legacy names.
const DATA_FIELDS: [&str; 3] = ["data", "navigationProgress", "progress"];

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Envelope {
    fn parse(body: &str) -> Result<Self, HttpProgressError> {
        let envelope: Envelope = serde_json::from_str(body)?;
        if envelope.success {
            Ok(envelope)
        } else {
            Err(HttpProgressError::Rejected)
        }
    }

    /// The payload field, `None` when the response carries none at all.
    /// An explicit `null` is `Some(Value::Null)`.
    fn take_data(&mut self) -> Option<Value> {
        DATA_FIELDS.iter().find_map(|key| self.fields.remove(*key))
    }
}

impl HttpProgressRepository {
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(config: HttpProgressConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    fn user_url(&self, user: UserId) -> String {
        format!(
            "{}/api/users/{user}/navigation-progress",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn progress_url(&self, user: UserId, workshop: Workshop) -> String {
        format!("{}/{workshop}", self.user_url(user))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn envelope(&self, request: RequestBuilder) -> Result<Envelope, HttpProgressError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpProgressError::HttpStatus(status));
        }
        let body = response.text().await?;
        Envelope::parse(&body)
    }
}

/// Progress carried by a successful load response.
///
/// A response without any payload field is an error, so callers treat it as
/// a failed load rather than as "no progress".
fn stored_progress(
    mut envelope: Envelope,
    workshop: Workshop,
    now: DateTime<Utc>,
) -> Result<Option<ProgressRecord>, StorageError> {
    let data = envelope
        .take_data()
        .ok_or(HttpProgressError::MissingData)?;
    decode_data(data, workshop, now)
}

/// Turn a response `data` field into a record, recovering legacy strings.
pub(crate) fn decode_data(
    data: Value,
    workshop: Workshop,
    now: DateTime<Utc>,
) -> Result<Option<ProgressRecord>, StorageError> {
    let raw = match data {
        Value::Null => return Ok(None),
        Value::String(raw) => raw,
        other => serde_json::to_string(&other).map_err(|e| StorageError::Serialization(e.to_string()))?,
    };
    match legacy::decode_stored(&raw, workshop, now)
        .map_err(|e| StorageError::Serialization(e.to_string()))?
    {
        StoredProgress::Clean(record) => Ok(Some(record)),
        StoredProgress::Recovered { record, salvaged } => {
            tracing::warn!(workshop = %workshop, salvaged, "remote progress used legacy encoding");
            Ok(Some(record))
        }
        StoredProgress::Unusable => {
            tracing::warn!(workshop = %workshop, "remote progress is unreadable, ignoring it");
            Ok(None)
        }
    }
}

fn deleted_count(data: &Value) -> u64 {
    data.as_u64()
        .or_else(|| data.get("deleted").and_then(Value::as_u64))
        .unwrap_or(0)
}

impl From<HttpProgressError> for StorageError {
    fn from(err: HttpProgressError) -> Self {
        match err {
            HttpProgressError::Json(e) => StorageError::Serialization(e.to_string()),
            other => StorageError::Connection(other.to_string()),
        }
    }
}

#[async_trait]
impl ProgressRepository for HttpProgressRepository {
    async fn load_progress(
        &self,
        user: UserId,
        workshop: Workshop,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let request = self.client.get(self.progress_url(user, workshop));
        match self.envelope(request).await {
            Ok(envelope) => stored_progress(envelope, workshop, Utc::now()),
            Err(HttpProgressError::HttpStatus(StatusCode::NOT_FOUND)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_progress(
        &self,
        user: UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.progress_url(user, record.workshop()))
            .json(record);
        self.envelope(request).await?;
        Ok(())
    }

    async fn delete_progress(&self, user: UserId) -> Result<u64, StorageError> {
        let request = self.client.delete(self.user_url(user));
        let mut envelope = self.envelope(request).await?;
        Ok(envelope.take_data().map_or(0, |data| deleted_count(&data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workshop_core::engine::{EngineConfig, ProgressEngine};
    use workshop_core::model::StepId;
    use workshop_core::time::fixed_now;

    fn repo(base: &str) -> HttpProgressRepository {
        HttpProgressRepository::new(HttpProgressConfig {
            base_url: base.to_owned(),
            token: None,
        })
        .unwrap()
    }

    #[test]
    fn builds_resource_urls() {
        let repo = repo("https://workshop.example/");
        assert_eq!(
            repo.progress_url(UserId::new(12), Workshop::Ia),
            "https://workshop.example/api/users/12/navigation-progress/ia"
        );
        assert_eq!(
            repo.user_url(UserId::new(12)),
            "https://workshop.example/api/users/12/navigation-progress"
        );
    }

    #[test]
    fn decodes_clean_and_missing_data() {
        let engine = ProgressEngine::builtin(Workshop::Ast, EngineConfig::default()).unwrap();
        let record = engine.default_record(fixed_now());
        let data = serde_json::to_value(&record).unwrap();

        assert_eq!(
            decode_data(data, Workshop::Ast, fixed_now()).unwrap(),
            Some(record)
        );
        assert_eq!(decode_data(Value::Null, Workshop::Ast, fixed_now()).unwrap(), None);
    }

    #[test]
    fn decodes_legacy_string_data() {
        let inner = serde_json::to_string(&json!({"completedSteps": ["1-1", "2-1"]})).unwrap();
        let data = Value::String(serde_json::to_string(&Value::String(inner)).unwrap());

        let record = decode_data(data, Workshop::Ast, fixed_now()).unwrap().unwrap();
        assert_eq!(record.completed_steps().len(), 2);
    }

    fn load_body(body: &Value) -> Result<Option<ProgressRecord>, StorageError> {
        let envelope = Envelope::parse(&body.to_string())?;
        stored_progress(envelope, Workshop::Ast, fixed_now())
    }

    #[test]
    fn reads_progress_under_legacy_field_names() {
        let inner = serde_json::to_string(&json!({
            "completedSteps": ["1-1", "2-1"],
            "currentStepId": "2-2"
        }))
        .unwrap();

        for key in ["navigationProgress", "progress"] {
            let record = load_body(&json!({"success": true, key: inner}))
                .unwrap()
                .expect("stored progress");
            let steps: Vec<_> = record.completed_steps().iter().map(StepId::as_str).collect();
            assert_eq!(steps, vec!["1-1", "2-1"]);
        }
    }

    #[test]
    fn missing_payload_is_a_load_error() {
        let err = load_body(&json!({"success": true})).unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
        assert_eq!(load_body(&json!({"success": true, "data": null})).unwrap(), None);
    }

    #[test]
    fn malformed_and_rejected_bodies_fail() {
        assert!(matches!(
            Envelope::parse("not json"),
            Err(HttpProgressError::Json(_))
        ));
        assert!(matches!(
            Envelope::parse(r#"{"success": false, "data": null}"#),
            Err(HttpProgressError::Rejected)
        ));
        assert!(matches!(
            StorageError::from(Envelope::parse("{").unwrap_err()),
            StorageError::Serialization(_)
        ));
    }

    #[test]
    fn counts_deleted_rows() {
        assert_eq!(deleted_count(&json!({"deleted": 3})), 3);
        assert_eq!(deleted_count(&json!(2)), 2);
        assert_eq!(deleted_count(&Value::Null), 0);
    }
}
