use std::{fmt, sync::Arc};

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    collaborators::{Collaborators, RecordStorage, CAPTURE_PREFIX},
    cri,
    error::CollaboratorError,
    models::{AssessmentFeatures, PredictionStatus},
};

pub const INSIGHT_FAILED: &str = "AI extraction failed. Proceeding with heuristic metrics.";

const CANNED_SUMMARIES: [&str; 4] = [
    "Speech rate within the expected range for age. Pauses are short and evenly distributed; \
     vocabulary complexity is preserved. No acute cognitive risk markers detected.",
    "Mildly elevated pause frequency between clauses with occasional word-finding hesitations. \
     Lexical diversity is adequate. Recommend routine follow-up in six months.",
    "Reduced speech rate and increased filler usage relative to baseline. Sentence structure is \
     simplified. Findings warrant a structured cognitive screening at the next visit.",
    "Fluent narrative with coherent topic maintenance. Minor repetitions noted but within \
     normal variation. Continue periodic vocal biomarker monitoring.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    DataSync,
    TranscriptionVerification,
    BiomarkerExtraction,
    MlScoring,
    ReportFinalization,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::DataSync,
        PipelineStage::TranscriptionVerification,
        PipelineStage::BiomarkerExtraction,
        PipelineStage::MlScoring,
        PipelineStage::ReportFinalization,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::DataSync => "Cloud sync",
            Self::TranscriptionVerification => "Neural transcription",
            Self::BiomarkerExtraction => "Biomarker extraction",
            Self::MlScoring => "Risk scoring",
            Self::ReportFinalization => "Report finalization",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A stage result that is either known now or still being computed remotely.
pub(crate) enum Pending<T> {
    Local(T),
    InFlight(JoinHandle<Result<T, CollaboratorError>>),
}

pub(crate) struct Settled<T> {
    pub value: T,
    pub remote: bool,
}

impl<T> Pending<T> {
    /// Resolves without waiting: calls still running are aborted and the
    /// fallback takes their place.
    pub async fn settle(self, what: &'static str, fallback: impl FnOnce() -> T) -> Settled<T> {
        let handle = match self {
            Pending::Local(value) => return Settled { value, remote: false },
            Pending::InFlight(handle) => handle,
        };

        if !handle.is_finished() {
            handle.abort();
            warn!(target: "pipeline", call = what, "still in flight at completion; using fallback");
            return Settled {
                value: fallback(),
                remote: false,
            };
        }

        match handle.await {
            Ok(Ok(value)) => Settled { value, remote: true },
            Ok(Err(err)) => {
                warn!(target: "pipeline", call = what, error = %err, "collaborator failed; using fallback");
                Settled {
                    value: fallback(),
                    remote: false,
                }
            }
            Err(err) => {
                warn!(target: "pipeline", call = what, error = %err, "collaborator task aborted; using fallback");
                Settled {
                    value: fallback(),
                    remote: false,
                }
            }
        }
    }
}

/// Inputs frozen when recording stopped.
pub(crate) struct StageInputs {
    pub features: AssessmentFeatures,
    pub transcript: String,
    pub live_transcript: Option<String>,
    pub simulated: bool,
}

pub(crate) struct StageResults {
    pub insight: Pending<String>,
    pub prediction: Pending<PredictionStatus>,
}

impl StageResults {
    pub fn new(inputs: &StageInputs) -> Self {
        Self {
            insight: Pending::Local(canned_summary(&inputs.features).to_string()),
            prediction: Pending::Local(cri::heuristic_prediction(&inputs.features)),
        }
    }
}

/// Starts the work of one stage without waiting for it.
pub(crate) fn dispatch(
    stage: PipelineStage,
    inputs: &StageInputs,
    collaborators: &Collaborators,
    results: &mut StageResults,
) {
    info!(target: "pipeline", stage = %stage, "stage started");

    match stage {
        PipelineStage::DataSync => match &collaborators.storage {
            Some(storage) => {
                let record = json!({
                    "kind": "capture",
                    "duration_sec": inputs.features.duration_sec,
                    "chunk_count": inputs.features.chunk_count,
                    "transcript": inputs.transcript,
                    "simulated": inputs.simulated,
                    "captured_at": Utc::now().to_rfc3339(),
                });
                let name = format!(
                    "{CAPTURE_PREFIX}capture_{}.json",
                    Utc::now().timestamp_millis()
                );
                spawn_upload(storage.clone(), name, record.to_string());
            }
            None => debug!(target: "pipeline", "storage not configured; skipping sync"),
        },
        PipelineStage::TranscriptionVerification => {
            let words = inputs.transcript.split_whitespace().count();
            debug!(
                target: "pipeline",
                words,
                live = inputs.live_transcript.is_some(),
                "transcript verified"
            );
        }
        PipelineStage::BiomarkerExtraction => {
            if let (Some(provider), Some(transcript)) =
                (&collaborators.insight, &inputs.live_transcript)
            {
                let provider = provider.clone();
                let transcript = transcript.clone();
                results.insight = Pending::InFlight(tokio::spawn(async move {
                    provider.insights(&transcript).await
                }));
            } else {
                debug!(target: "pipeline", "no live transcript or insight service; using canned summary");
            }
        }
        PipelineStage::MlScoring => {
            if let Some(predictor) = &collaborators.predictor {
                let predictor = predictor.clone();
                let features = inputs.features;
                results.prediction = Pending::InFlight(tokio::spawn(async move {
                    predictor.predict(&features).await
                }));
            } else {
                debug!(target: "pipeline", "ml endpoint not configured; using heuristic");
            }
        }
        PipelineStage::ReportFinalization => {}
    }
}

/// Uploads in the background; failures are logged and never reach the flow.
pub(crate) fn spawn_upload(storage: Arc<dyn RecordStorage>, name: String, content: String) {
    tokio::spawn(async move {
        if let Err(err) = storage.upload(&name, content).await {
            warn!(target: "pipeline", blob = %name, error = %err, "upload failed");
        }
    });
}

pub fn canned_summary(features: &AssessmentFeatures) -> &'static str {
    let index = features.duration_sec.max(0.0) as usize % CANNED_SUMMARIES.len();
    CANNED_SUMMARIES[index]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn local_results_are_not_remote() {
        let settled = Pending::Local(7).settle("test", || 0).await;
        assert_eq!(settled.value, 7);
        assert!(!settled.remote);
    }

    #[tokio::test]
    async fn finished_calls_are_used() {
        let pending: Pending<u8> = Pending::InFlight(tokio::spawn(async { Ok(3) }));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let settled = pending.settle("test", || 0).await;
        assert_eq!(settled.value, 3);
        assert!(settled.remote);
    }

    #[tokio::test]
    async fn failed_calls_fall_back() {
        let pending: Pending<u8> = Pending::InFlight(tokio::spawn(async {
            Err(CollaboratorError::transient("test", "boom"))
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let settled = pending.settle("test", || 9).await;
        assert_eq!(settled.value, 9);
        assert!(!settled.remote);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_are_abandoned() {
        let pending: Pending<u8> = Pending::InFlight(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }));

        let settled = pending.settle("test", || 0).await;
        assert_eq!(settled.value, 0);
        assert!(!settled.remote);
    }

    #[test]
    fn canned_summary_is_stable_for_features() {
        let features = AssessmentFeatures::from_duration(17);
        assert_eq!(canned_summary(&features), canned_summary(&features));
        assert!(CANNED_SUMMARIES.contains(&canned_summary(&features)));
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let labels: Vec<&str> = PipelineStage::ALL.iter().map(PipelineStage::label).collect();
        assert_eq!(
            labels,
            vec![
                "Cloud sync",
                "Neural transcription",
                "Biomarker extraction",
                "Risk scoring",
                "Report finalization"
            ]
        );
    }
}
