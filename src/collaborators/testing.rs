use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::{
    collaborators::{
        is_clinical_record, InsightProvider, RecordStorage, RiskPredictor, SpeechTranscriber,
        TranscriptStream,
    },
    error::CollaboratorError,
    models::{AssessmentFeatures, PredictionStatus},
};

/// Emits fixed fragments, optionally ending with an error.
pub struct ScriptedTranscriber {
    pub fragments: Vec<String>,
    pub fail_after: bool,
}

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn start(&self) -> Result<TranscriptStream, CollaboratorError> {
        let mut items: Vec<Result<String, CollaboratorError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if self.fail_after {
            items.push(Err(CollaboratorError::transient("speech recognition", "socket closed")));
        }
        Ok(stream::iter(items).boxed())
    }
}

pub struct UnavailableTranscriber;

#[async_trait]
impl SpeechTranscriber for UnavailableTranscriber {
    async fn start(&self) -> Result<TranscriptStream, CollaboratorError> {
        Err(CollaboratorError::missing("speech recognition", "no microphone"))
    }
}

pub struct FixedPredictor {
    pub status: Result<PredictionStatus, CollaboratorError>,
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<AssessmentFeatures>>>,
}

impl FixedPredictor {
    pub fn returning(status: Result<PredictionStatus, CollaboratorError>) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl RiskPredictor for FixedPredictor {
    async fn predict(
        &self,
        features: &AssessmentFeatures,
    ) -> Result<PredictionStatus, CollaboratorError> {
        self.calls.lock().unwrap().push(*features);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.status.clone()
    }
}

pub struct FixedInsights {
    pub reply: Result<String, CollaboratorError>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl FixedInsights {
    pub fn returning(reply: Result<String, CollaboratorError>) -> Self {
        Self {
            reply,
            seen: Arc::default(),
        }
    }
}

#[async_trait]
impl InsightProvider for FixedInsights {
    async fn insights(&self, transcript: &str) -> Result<String, CollaboratorError> {
        self.seen.lock().unwrap().push(transcript.to_string());
        self.reply.clone()
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    pub uploads: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

#[async_trait]
impl RecordStorage for RecordingStorage {
    async fn upload(&self, name: &str, content: String) -> Result<(), CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::AuthFailure {
                service: "blob storage",
                status: 403,
            });
        }
        self.uploads.lock().unwrap().push((name.to_string(), content));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        let uploads = self.uploads.lock().unwrap();
        Ok(uploads
            .iter()
            .filter(|(name, _)| is_clinical_record(name))
            .filter_map(|(_, content)| serde_json::from_str(content).ok())
            .collect())
    }
}
