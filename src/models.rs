use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssessmentFeatures {
    pub duration_sec: f64,
    pub chunk_count: u32,
}

impl AssessmentFeatures {
    /// One chunk per three seconds of captured speech.
    pub fn from_duration(duration_sec: u64) -> Self {
        Self {
            duration_sec: duration_sec as f64,
            chunk_count: u32::try_from(duration_sec / 3).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PredictionStatus {
    Healthy,
    Positive,
}

impl TryFrom<u8> for PredictionStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Healthy),
            1 => Ok(Self::Positive),
            other => Err(format!("prediction status must be 0 or 1, got {other}")),
        }
    }
}

impl From<PredictionStatus> for u8 {
    fn from(status: PredictionStatus) -> Self {
        match status {
            PredictionStatus::Healthy => 0,
            PredictionStatus::Positive => 1,
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Positive => write!(f, "positive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriRecord {
    pub score: u8,
    pub date: NaiveDate,
    pub assessment_id: String,
}

impl CriRecord {
    pub fn new(score: u8, date: NaiveDate) -> Self {
        Self {
            score: score.min(100),
            date,
            assessment_id: format!("ASS-{}", Uuid::new_v4().simple()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Patient,
    #[serde(alias = "admin")]
    Clinician,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub cri_history: Vec<CriRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub duration_sec: f64,
    pub chunk_count: u32,
    pub status: PredictionStatus,
    pub last_assessment: NaiveDate,
}

impl PatientRecord {
    pub fn features(&self) -> AssessmentFeatures {
        AssessmentFeatures {
            duration_sec: self.duration_sec,
            chunk_count: self.chunk_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatientScore {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub status: PredictionStatus,
    pub score: u8,
    pub last_assessment: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Remote,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    pub record: CriRecord,
    pub features: AssessmentFeatures,
    pub status: PredictionStatus,
    pub status_source: StatusSource,
    pub insight: String,
    pub transcript: String,
    pub simulated: bool,
}
