use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    collaborators::{read_success_body, RiskPredictor},
    config::PredictionConfig,
    error::CollaboratorError,
    models::{AssessmentFeatures, PredictionStatus},
};

const SERVICE: &str = "ml endpoint";

/// Managed online endpoint scoring `{duration_sec, chunk_count}`.
pub struct AzureMlPredictor {
    client: Client,
    config: PredictionConfig,
}

impl AzureMlPredictor {
    pub fn new(client: Client, config: PredictionConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RiskPredictor for AzureMlPredictor {
    async fn predict(
        &self,
        features: &AssessmentFeatures,
    ) -> Result<PredictionStatus, CollaboratorError> {
        let response = self
            .client
            .post(&self.config.url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.config.key)
            .json(&json!({ "data": [features] }))
            .send()
            .await
            .map_err(|err| CollaboratorError::transient(SERVICE, err))?;

        let body = read_success_body(SERVICE, response).await?;
        let parsed: Value =
            serde_json::from_str(&body).map_err(|err| CollaboratorError::malformed(SERVICE, err))?;
        let status = parse_prediction(&parsed)?;
        debug!(target: "prediction", %status, "ml endpoint scored assessment");
        Ok(status)
    }
}

/// Accepts `{"prediction": [n]}` or a bare `[n]`; anything else scores healthy.
pub fn parse_prediction(value: &Value) -> Result<PredictionStatus, CollaboratorError> {
    let first = value
        .get("prediction")
        .and_then(|prediction| prediction.get(0))
        .or_else(|| value.get(0));

    let Some(first) = first else {
        return Ok(PredictionStatus::Healthy);
    };

    let label = first
        .as_u64()
        .or_else(|| first.as_f64().filter(|n| n.fract() == 0.0 && *n >= 0.0).map(|n| n as u64))
        .ok_or_else(|| CollaboratorError::malformed(SERVICE, format!("non-integer label {first}")))?;

    u8::try_from(label)
        .ok()
        .and_then(|label| PredictionStatus::try_from(label).ok())
        .ok_or_else(|| CollaboratorError::malformed(SERVICE, format!("unknown label {label}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_wrapped_and_bare_predictions() {
        assert_eq!(
            parse_prediction(&json!({ "prediction": [1] })).unwrap(),
            PredictionStatus::Positive
        );
        assert_eq!(parse_prediction(&json!([0])).unwrap(), PredictionStatus::Healthy);
        assert_eq!(parse_prediction(&json!([1.0])).unwrap(), PredictionStatus::Positive);
    }

    #[test]
    fn missing_label_defaults_to_healthy() {
        assert_eq!(parse_prediction(&json!({})).unwrap(), PredictionStatus::Healthy);
        assert_eq!(parse_prediction(&json!([])).unwrap(), PredictionStatus::Healthy);
    }

    #[test]
    fn unknown_labels_are_malformed() {
        assert!(matches!(
            parse_prediction(&json!([7])),
            Err(CollaboratorError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_prediction(&json!({ "prediction": ["yes"] })),
            Err(CollaboratorError::MalformedResponse { .. })
        ));
    }
}
