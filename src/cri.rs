use std::fmt;

use crate::models::{AssessmentFeatures, CriRecord, PatientRecord, PatientScore, PredictionStatus};

/// Cognitive Risk Index on a 0-100 scale, lower is better.
pub fn calculate_cri(status: PredictionStatus, duration_sec: f64, chunk_count: u32) -> u8 {
    let base = match status {
        PredictionStatus::Healthy => 0.0,
        PredictionStatus::Positive => 50.0,
    };
    let duration = if duration_sec.is_finite() {
        duration_sec.max(0.0)
    } else {
        0.0
    };
    let duration_factor = (duration / 60.0 * 10.0).min(20.0);
    let chunk_factor = (chunk_count as f64 * 1.5).min(30.0);

    (base + duration_factor + chunk_factor).min(100.0).round() as u8
}

pub fn score_features(status: PredictionStatus, features: &AssessmentFeatures) -> u8 {
    calculate_cri(status, features.duration_sec, features.chunk_count)
}

/// Local stand-in for the ML endpoint: long or fragmented samples read as positive.
pub fn heuristic_prediction(features: &AssessmentFeatures) -> PredictionStatus {
    if features.chunk_count > 12 || features.duration_sec > 45.0 {
        PredictionStatus::Positive
    } else {
        PredictionStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => Self::Low,
            21..=40 => Self::Moderate,
            _ => Self::High,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Moderate => write!(f, "Moderate"),
            Self::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Monitor,
    Stable,
    InsufficientData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Improving => write!(f, "Improving"),
            Self::Monitor => write!(f, "Monitor"),
            Self::Stable => write!(f, "Stable"),
            Self::InsufficientData => write!(f, "N/A"),
        }
    }
}

pub fn trend_direction(history: &[CriRecord]) -> Trend {
    match history {
        [.., previous, latest] => match latest.score.cmp(&previous.score) {
            std::cmp::Ordering::Less => Trend::Improving,
            std::cmp::Ordering::Greater => Trend::Monitor,
            std::cmp::Ordering::Equal => Trend::Stable,
        },
        _ => Trend::InsufficientData,
    }
}

pub fn current_cri(history: &[CriRecord]) -> u8 {
    history.last().map(|record| record.score).unwrap_or(0)
}

pub fn score_patients(records: &[PatientRecord]) -> Vec<PatientScore> {
    let mut scores: Vec<PatientScore> = records
        .iter()
        .map(|record| PatientScore {
            id: record.id.clone(),
            name: record.name.clone(),
            age: record.age,
            gender: record.gender.clone(),
            status: record.status,
            score: score_features(record.status, &record.features()),
            last_assessment: record.last_assessment,
        })
        .collect();

    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_patient(id: &str, status: PredictionStatus, duration_sec: f64, chunks: u32) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            name: "James Wilson".to_string(),
            age: 72,
            gender: "M".to_string(),
            duration_sec,
            chunk_count: chunks,
            status,
            last_assessment: NaiveDate::from_ymd_opt(2023, 6, 12).unwrap(),
        }
    }

    fn record(score: u8) -> CriRecord {
        CriRecord::new(score, NaiveDate::from_ymd_opt(2026, 1, 30).unwrap())
    }

    #[test]
    fn anchors_match_formula() {
        assert_eq!(calculate_cri(PredictionStatus::Positive, 0.0, 0), 50);
        assert_eq!(calculate_cri(PredictionStatus::Healthy, 0.0, 0), 0);
        assert_eq!(calculate_cri(PredictionStatus::Positive, 120.0, 30), 100);
        // 45.2s -> 7.53, 12 chunks -> 18
        assert_eq!(calculate_cri(PredictionStatus::Healthy, 45.2, 12), 26);
    }

    #[test]
    fn factors_are_capped() {
        assert_eq!(calculate_cri(PredictionStatus::Healthy, 6000.0, 0), 20);
        assert_eq!(calculate_cri(PredictionStatus::Healthy, 0.0, 500), 30);
        assert_eq!(calculate_cri(PredictionStatus::Healthy, 6000.0, 500), 50);
    }

    #[test]
    fn degenerate_durations_count_as_zero() {
        assert_eq!(calculate_cri(PredictionStatus::Healthy, -30.0, 0), 0);
        assert_eq!(calculate_cri(PredictionStatus::Positive, f64::NAN, 0), 50);
        assert_eq!(calculate_cri(PredictionStatus::Positive, f64::INFINITY, 0), 50);
    }

    #[test]
    fn score_is_bounded_and_monotonic() {
        for status in [PredictionStatus::Healthy, PredictionStatus::Positive] {
            let mut previous = 0;
            for seconds in 0..200 {
                let score = calculate_cri(status, seconds as f64, 4);
                assert!(score <= 100);
                assert!(score >= previous);
                previous = score;
            }

            let mut previous = 0;
            for chunks in 0..60 {
                let score = calculate_cri(status, 30.0, chunks);
                assert!(score <= 100);
                assert!(score >= previous);
                previous = score;
            }
        }
    }

    #[test]
    fn heuristic_flags_long_or_fragmented_samples() {
        let calm = AssessmentFeatures { duration_sec: 30.0, chunk_count: 10 };
        let fragmented = AssessmentFeatures { duration_sec: 30.0, chunk_count: 13 };
        let long = AssessmentFeatures { duration_sec: 45.5, chunk_count: 2 };
        let boundary = AssessmentFeatures { duration_sec: 45.0, chunk_count: 12 };

        assert_eq!(heuristic_prediction(&calm), PredictionStatus::Healthy);
        assert_eq!(heuristic_prediction(&fragmented), PredictionStatus::Positive);
        assert_eq!(heuristic_prediction(&long), PredictionStatus::Positive);
        assert_eq!(heuristic_prediction(&boundary), PredictionStatus::Healthy);
    }

    #[test]
    fn categories_follow_dashboard_tiers() {
        assert_eq!(RiskCategory::from_score(0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(20), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(21), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_score(40), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_score(41), RiskCategory::High);
    }

    #[test]
    fn trend_compares_last_two_records() {
        assert_eq!(trend_direction(&[]), Trend::InsufficientData);
        assert_eq!(trend_direction(&[record(30)]), Trend::InsufficientData);
        assert_eq!(trend_direction(&[record(90), record(30), record(20)]), Trend::Improving);
        assert_eq!(trend_direction(&[record(20), record(35)]), Trend::Monitor);
        assert_eq!(trend_direction(&[record(35), record(35)]), Trend::Stable);
    }

    #[test]
    fn current_cri_is_latest_score() {
        assert_eq!(current_cri(&[]), 0);
        assert_eq!(current_cri(&[record(12), record(64)]), 64);
    }

    #[test]
    fn patients_ranked_by_score() {
        let patients = vec![
            sample_patient("P-1002", PredictionStatus::Healthy, 32.8, 8),
            sample_patient("P-1003", PredictionStatus::Positive, 58.4, 18),
            sample_patient("P-1001", PredictionStatus::Positive, 45.2, 12),
        ];

        let scores = score_patients(&patients);
        let ids: Vec<&str> = scores.iter().map(|score| score.id.as_str()).collect();
        assert_eq!(ids, vec!["P-1003", "P-1001", "P-1002"]);
        assert_eq!(scores[0].score, 87);
        assert_eq!(scores[2].score, 17);
    }
}
