use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::Client;

use crate::{
    config::AppConfig,
    error::CollaboratorError,
    models::{AssessmentFeatures, PredictionStatus},
};

pub mod insight;
pub mod prediction;
pub mod speech;
pub mod storage;

#[cfg(test)]
pub mod testing;

/// Name prefix of the records that `RecordStorage::list` returns.
pub const CLINICAL_RECORD_PREFIX: &str = "clinical_record_";
/// Raw captures live under their own prefix, apart from clinical records.
pub const CAPTURE_PREFIX: &str = "captures/";

pub fn is_clinical_record(name: &str) -> bool {
    name.starts_with(CLINICAL_RECORD_PREFIX) && name.ends_with(".json")
}

/// Live transcript fragments. Dropping the stream ends the subscription.
pub type TranscriptStream = BoxStream<'static, Result<String, CollaboratorError>>;

#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn start(&self) -> Result<TranscriptStream, CollaboratorError>;
}

#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn insights(&self, transcript: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait RiskPredictor: Send + Sync {
    async fn predict(
        &self,
        features: &AssessmentFeatures,
    ) -> Result<PredictionStatus, CollaboratorError>;
}

#[async_trait]
pub trait RecordStorage: Send + Sync {
    async fn upload(&self, name: &str, content: String) -> Result<(), CollaboratorError>;

    /// Parsed bodies of the stored clinical records only.
    async fn list(&self) -> Result<Vec<serde_json::Value>, CollaboratorError>;
}

/// The external services available to one run. `None` means the capability
/// is switched off and the flow uses its local fallback.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub speech: Option<Arc<dyn SpeechTranscriber>>,
    pub insight: Option<Arc<dyn InsightProvider>>,
    pub predictor: Option<Arc<dyn RiskPredictor>>,
    pub storage: Option<Arc<dyn RecordStorage>>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig, audio: Option<PathBuf>) -> anyhow::Result<Self> {
        let client = build_client(config.http_timeout)?;

        Ok(Self {
            speech: config.speech.clone().map(|cfg| {
                Arc::new(speech::AzureSpeechTranscriber::new(client.clone(), cfg, audio))
                    as Arc<dyn SpeechTranscriber>
            }),
            insight: config.insight.clone().map(|cfg| {
                Arc::new(insight::AzureOpenAiInsights::new(client.clone(), cfg))
                    as Arc<dyn InsightProvider>
            }),
            predictor: config.prediction.clone().map(|cfg| {
                Arc::new(prediction::AzureMlPredictor::new(client.clone(), cfg))
                    as Arc<dyn RiskPredictor>
            }),
            storage: config.storage.clone().map(|cfg| {
                Arc::new(storage::AzureBlobStorage::new(client.clone(), cfg))
                    as Arc<dyn RecordStorage>
            }),
        })
    }
}

fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")
}

/// Reads a response body and classifies non-2xx statuses.
pub(crate) async fn read_success_body(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, CollaboratorError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| CollaboratorError::transient(service, err))?;

    if !status.is_success() {
        return Err(CollaboratorError::from_status(service, status.as_u16(), &body));
    }

    Ok(body)
}
