use std::fmt::Write;

use chrono::NaiveDate;

use crate::cri::{self, RiskCategory};
use crate::models::{CriRecord, PatientScore, PredictionStatus, UserProfile};

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: RiskCategory,
    pub count: usize,
    pub avg_score: f64,
}

pub fn summarize_by_category(history: &[CriRecord]) -> Vec<CategorySummary> {
    let categories = [RiskCategory::Low, RiskCategory::Moderate, RiskCategory::High];
    let mut summaries: Vec<CategorySummary> = categories
        .into_iter()
        .filter_map(|category| {
            let scores: Vec<u32> = history
                .iter()
                .filter(|record| RiskCategory::from_score(record.score) == category)
                .map(|record| record.score as u32)
                .collect();

            (!scores.is_empty()).then(|| CategorySummary {
                category,
                count: scores.len(),
                avg_score: scores.iter().sum::<u32>() as f64 / scores.len() as f64,
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

pub fn build_report(
    profile: &UserProfile,
    generated_on: NaiveDate,
    cohort: Option<&[PatientScore]>,
) -> String {
    let history = &profile.cri_history;
    let current = cri::current_cri(history);

    let mut output = String::new();

    let _ = writeln!(output, "# NeuroTrack X Cognitive Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {} y/o {}) on {}",
        profile.name, profile.id, profile.age, profile.gender, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if history.is_empty() {
        let _ = writeln!(output, "No assessments recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "- Current CRI: {} ({} risk)",
            current,
            RiskCategory::from_score(current)
        );
        let _ = writeln!(output, "- Trend: {}", cri::trend_direction(history));
        let _ = writeln!(output, "- Assessments done: {}", history.len());
        if let Some(last) = history.last() {
            let _ = writeln!(output, "- Last assessment: {}", last.date);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    let summaries = summarize_by_category(history);
    if summaries.is_empty() {
        let _ = writeln!(output, "No assessments recorded yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} assessments (avg CRI {:.1})",
                summary.category, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Assessments");

    if history.is_empty() {
        let _ = writeln!(output, "No assessments recorded yet.");
    } else {
        for record in history.iter().rev().take(10) {
            let _ = writeln!(
                output,
                "- {} on {}: CRI {} ({})",
                record.assessment_id,
                record.date,
                record.score,
                RiskCategory::from_score(record.score)
            );
        }
    }

    if let Some(scores) = cohort {
        let positives = scores
            .iter()
            .filter(|score| score.status == PredictionStatus::Positive)
            .count();

        let _ = writeln!(output);
        let _ = writeln!(output, "## Cohort Highest Risk");
        let _ = writeln!(
            output,
            "{} patients, {} with a positive screening",
            scores.len(),
            positives
        );

        if scores.is_empty() {
            let _ = writeln!(output, "No patients in this cohort.");
        } else {
            for score in scores.iter().take(10) {
                let _ = writeln!(
                    output,
                    "- {} ({}, {} y/o) CRI {} ({}), last assessed {}",
                    score.name,
                    score.id,
                    score.age,
                    score.score,
                    RiskCategory::from_score(score.score),
                    score.last_assessment
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn profile(scores: &[u8]) -> UserProfile {
        UserProfile {
            name: "Kiara Patel".to_string(),
            age: 69,
            gender: "Female".to_string(),
            id: "P-4821".to_string(),
            role: Role::Patient,
            cri_history: scores
                .iter()
                .enumerate()
                .map(|(i, score)| CriRecord::new(*score, date(i as u32 + 1)))
                .collect(),
        }
    }

    #[test]
    fn categories_are_counted_and_averaged() {
        let summaries = summarize_by_category(&profile(&[10, 30, 35, 80]).cri_history);
        assert_eq!(summaries[0].category, RiskCategory::Moderate);
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_score - 32.5).abs() < 0.001);
        assert_eq!(summaries.len(), 3);
    }

    #[test]
    fn report_lists_summary_and_recent_first() {
        let report = build_report(&profile(&[45, 30]), date(20), None);
        assert!(report.contains("# NeuroTrack X Cognitive Risk Report"));
        assert!(report.contains("Kiara Patel (P-4821"));
        assert!(report.contains("- Current CRI: 30 (Moderate risk)"));
        assert!(report.contains("- Trend: Improving"));
        assert!(report.contains("- Assessments done: 2"));

        let newest = report.find(": CRI 30 (").unwrap();
        let oldest = report.find(": CRI 45 (").unwrap();
        assert!(newest < oldest);
        assert!(!report.contains("## Cohort Highest Risk"));
    }

    #[test]
    fn empty_history_is_explicit() {
        let cohort: Vec<PatientScore> = Vec::new();
        let report = build_report(&profile(&[]), date(20), Some(cohort.as_slice()));
        assert!(report.contains("No assessments recorded yet."));
        assert!(report.contains("0 patients, 0 with a positive screening"));
        assert!(report.contains("No patients in this cohort."));
    }

    #[test]
    fn cohort_section_ranks_patients() {
        let cohort = vec![PatientScore {
            id: "P-1003".to_string(),
            name: "Robert Chang".to_string(),
            age: 75,
            gender: "M".to_string(),
            status: PredictionStatus::Positive,
            score: 87,
            last_assessment: date(3),
        }];
        let report = build_report(&profile(&[12]), date(20), Some(cohort.as_slice()));
        assert!(report.contains("1 patients, 1 with a positive screening"));
        assert!(report.contains("- Robert Chang (P-1003, 75 y/o) CRI 87 (High)"));
    }
}
