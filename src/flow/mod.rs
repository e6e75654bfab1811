//! One assessment cycle: `Idle -> Recording -> Processing -> Completed`.
//!
//! Every collaborator failure degrades to a local substitute, so a cycle that
//! starts recording always reaches `Completed`. Pipeline stages advance on a
//! fixed tick and do not wait for the remote calls they start; whatever has
//! not returned by completion is replaced by its fallback.

use std::fmt;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    collaborators::{Collaborators, CLINICAL_RECORD_PREFIX},
    config::Pacing,
    cri,
    error::FlowError,
    models::{AssessmentFeatures, AssessmentOutcome, CriRecord, PredictionStatus, StatusSource},
    profile::Session,
};

mod pipeline;
mod recording;

pub use pipeline::PipelineStage;
pub use recording::CaptureMode;

use pipeline::{StageInputs, StageResults, INSIGHT_FAILED};
use recording::{Capture, SharedTranscript};

const RECORDING_UNAVAILABLE: &str =
    "Speech connection failed. Check your speech credentials and audio input.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Recording,
    Processing,
    Completed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

pub struct AssessmentFlow {
    collaborators: Collaborators,
    pacing: Pacing,
    allow_simulation: bool,
    state: FlowState,
    capture: Option<Capture>,
    transcript: SharedTranscript,
    duration_sec: u64,
    insight: Option<String>,
    error: Option<String>,
}

impl AssessmentFlow {
    pub fn new(collaborators: Collaborators, pacing: Pacing, allow_simulation: bool) -> Self {
        Self {
            collaborators,
            pacing,
            allow_simulation,
            state: FlowState::Idle,
            capture: None,
            transcript: SharedTranscript::default(),
            duration_sec: 0,
            insight: None,
            error: None,
        }
    }

    /// A recording whose live stream was lost already reads as `Idle`.
    pub fn state(&self) -> FlowState {
        if self.recording_lost() {
            FlowState::Idle
        } else {
            self.state
        }
    }

    /// Message for the last failed start, cleared by the next attempt.
    pub fn error(&self) -> Option<&str> {
        if self.recording_lost() {
            Some(RECORDING_UNAVAILABLE)
        } else {
            self.error.as_deref()
        }
    }

    /// Resolves once the live stream of the current recording is lost. Never
    /// resolves when nothing is recording.
    pub fn lost_signal(&self) -> CancellationToken {
        self.capture
            .as_ref()
            .map(|capture| capture.lost().clone())
            .unwrap_or_default()
    }

    fn recording_lost(&self) -> bool {
        self.state == FlowState::Recording && self.capture.as_ref().is_some_and(Capture::is_lost)
    }

    /// Tears down a lost recording and returns to `Idle` with the error set.
    async fn abandon_lost_recording(&mut self) -> bool {
        if !self.recording_lost() {
            return false;
        }
        if let Some(capture) = self.capture.take() {
            capture.finish().await;
        }
        self.transcript = SharedTranscript::default();
        self.duration_sec = 0;
        self.error = Some(RECORDING_UNAVAILABLE.to_string());
        self.state = FlowState::Idle;
        warn!(target: "flow", "live transcription lost without fallback; back to idle");
        true
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.capture
            .as_ref()
            .map(Capture::elapsed_secs)
            .unwrap_or(self.duration_sec)
    }

    pub fn transcript(&self) -> String {
        self.transcript.lock().text()
    }

    pub fn insight(&self) -> Option<&str> {
        self.insight.as_deref()
    }

    pub async fn start(&mut self) -> Result<CaptureMode, FlowError> {
        self.abandon_lost_recording().await;
        self.expect_state(FlowState::Idle, "start")?;
        self.error = None;
        self.transcript = SharedTranscript::default();
        self.duration_sec = 0;

        let live = match &self.collaborators.speech {
            Some(speech) => match speech.start().await {
                Ok(stream) => Some(stream),
                Err(err) => {
                    warn!(target: "flow", error = %err, "live transcription unavailable");
                    None
                }
            },
            None => None,
        };

        if live.is_none() && !self.allow_simulation {
            self.error = Some(RECORDING_UNAVAILABLE.to_string());
            return Err(FlowError::RecordingUnavailable(RECORDING_UNAVAILABLE.to_string()));
        }

        let capture = Capture::spawn(
            live,
            self.allow_simulation,
            self.pacing,
            self.transcript.clone(),
        );
        let mode = capture.mode();
        self.capture = Some(capture);
        self.state = FlowState::Recording;
        info!(target: "flow", ?mode, "recording started");
        Ok(mode)
    }

    /// Cancels the recording timers and freezes the duration.
    pub async fn stop(&mut self) -> Result<u64, FlowError> {
        if self.abandon_lost_recording().await {
            return Err(FlowError::RecordingUnavailable(RECORDING_UNAVAILABLE.to_string()));
        }
        self.expect_state(FlowState::Recording, "stop")?;

        if let Some(capture) = self.capture.take() {
            self.duration_sec = capture.finish().await;
        }
        self.state = FlowState::Processing;
        info!(target: "flow", duration_sec = self.duration_sec, "recording stopped");
        Ok(self.duration_sec)
    }

    /// Runs the stages, appends one CRI record and enters `Completed`.
    /// `on_stage` observes each stage as it becomes current.
    pub async fn process<F>(
        &mut self,
        session: &mut Session,
        mut on_stage: F,
    ) -> Result<AssessmentOutcome, FlowError>
    where
        F: FnMut(PipelineStage),
    {
        self.expect_state(FlowState::Processing, "process")?;

        let inputs = {
            let buffer = self.transcript.lock();
            StageInputs {
                features: AssessmentFeatures::from_duration(self.duration_sec),
                transcript: buffer.text(),
                live_transcript: buffer.live_text(),
                simulated: buffer.is_simulated(),
            }
        };
        let mut results = StageResults::new(&inputs);

        for stage in PipelineStage::ALL {
            tokio::time::sleep(self.pacing.stage_tick).await;
            on_stage(stage);
            pipeline::dispatch(stage, &inputs, &self.collaborators, &mut results);
        }
        tokio::time::sleep(self.pacing.completion_delay).await;

        let features = inputs.features;
        let prediction = results
            .prediction
            .settle("ml scoring", || cri::heuristic_prediction(&features))
            .await;
        let insight = results
            .insight
            .settle("insight extraction", || INSIGHT_FAILED.to_string())
            .await;

        let score = cri::score_features(prediction.value, &features);
        let record = CriRecord::new(score, Utc::now().date_naive());
        session.append_record(record.clone()).await;
        self.sync_clinical_record(session, &record, &features, prediction.value);

        let outcome = AssessmentOutcome {
            record,
            features,
            status: prediction.value,
            status_source: if prediction.remote {
                StatusSource::Remote
            } else {
                StatusSource::Heuristic
            },
            insight: insight.value.clone(),
            transcript: inputs.transcript,
            simulated: inputs.simulated,
        };

        info!(
            target: "flow",
            score = outcome.record.score,
            status = %outcome.status,
            source = ?outcome.status_source,
            "assessment completed"
        );

        self.insight = Some(insight.value);
        self.state = FlowState::Completed;
        Ok(outcome)
    }

    /// Clears the transient state of a finished cycle; history is untouched.
    pub fn reset(&mut self) -> Result<(), FlowError> {
        self.expect_state(FlowState::Completed, "reset")?;
        self.transcript = SharedTranscript::default();
        self.insight = None;
        self.duration_sec = 0;
        self.error = None;
        self.state = FlowState::Idle;
        Ok(())
    }

    fn expect_state(&self, expected: FlowState, action: &'static str) -> Result<(), FlowError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition { action, state })
        }
    }

    fn sync_clinical_record(
        &self,
        session: &Session,
        record: &CriRecord,
        features: &AssessmentFeatures,
        status: PredictionStatus,
    ) {
        let Some(storage) = &self.collaborators.storage else {
            return;
        };

        let user = session.user();
        let payload = json!({
            "id": user.map(|u| u.id.as_str()),
            "name": user.map(|u| u.name.as_str()),
            "age": user.map(|u| u.age),
            "gender": user.map(|u| u.gender.as_str()),
            "duration_sec": features.duration_sec,
            "chunk_count": features.chunk_count,
            "status": status,
            "cri": record.score,
            "assessmentId": record.assessment_id,
            "lastAssessment": record.date,
        });
        let name = format!("{CLINICAL_RECORD_PREFIX}{}.json", Utc::now().timestamp_millis());
        pipeline::spawn_upload(storage.clone(), name, payload.to_string());
    }
}
