use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

mod cohort;
mod collaborators;
mod config;
mod cri;
mod error;
mod flow;
mod logging;
mod models;
mod profile;
mod report;

use crate::{
    collaborators::Collaborators,
    config::AppConfig,
    cri::RiskCategory,
    flow::{AssessmentFlow, CaptureMode},
    models::Role,
    profile::{FileProfileStore, PgProfileStore, ProfileStore, Registration, Session},
};

#[derive(Parser)]
#[command(name = "neurotrack")]
#[command(about = "Vocal biomarker assessments and Cognitive Risk Index tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres profile schema
    InitDb,
    /// Register the current user
    Onboard {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long, default_value = "Male")]
        gender: String,
        #[arg(long, value_enum, default_value_t = Role::Patient)]
        role: Role,
    },
    /// Show the current user, latest CRI and service status
    Status,
    /// Record and score one vocal biomarker assessment
    Assess {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
        /// WAV sample sent to the speech service
        #[arg(long)]
        audio: Option<PathBuf>,
    },
    /// List recorded CRI scores, newest first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Rank cohort patients from a CSV file by CRI
    Score {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        cohort: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List clinical records synced to blob storage
    Records,
    /// Sign out and clear the stored profile
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    logging::init_tracing(config.log_filter.as_deref(), config.log_format)?;

    match cli.command {
        Commands::InitDb => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to a Postgres instance")?;
            PgProfileStore::connect(database_url).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Onboard {
            name,
            age,
            gender,
            role,
        } => {
            let mut session = open_session(&config).await?;
            let user = session
                .onboard(Registration {
                    name,
                    age,
                    gender,
                    role,
                })
                .await?;
            println!("Welcome, {}! Your ID is {}.", user.name, user.id);
        }
        Commands::Status => {
            let session = open_session(&config).await?;
            print_status(&config, &session);
        }
        Commands::Assess { seconds, audio } => {
            let mut session = open_session(&config).await?;
            run_assessment(&config, &mut session, seconds, audio).await?;
        }
        Commands::History { limit } => {
            let session = open_session(&config).await?;
            let user = session.user().context("no user signed in; run `onboard` first")?;

            if user.cri_history.is_empty() {
                println!("No assessments recorded yet.");
                return Ok(());
            }

            println!("CRI history for {} ({}):", user.name, user.id);
            for record in user.cri_history.iter().rev().take(limit) {
                println!(
                    "- {} {} CRI {} ({})",
                    record.date,
                    record.assessment_id,
                    record.score,
                    RiskCategory::from_score(record.score)
                );
            }
        }
        Commands::Score { csv, limit } => {
            let patients = cohort::load_csv(&csv)?;
            let scores = cri::score_patients(&patients);

            if scores.is_empty() {
                println!("No patients found in {}.", csv.display());
                return Ok(());
            }

            println!("Top patients by CRI:");
            for score in scores.iter().take(limit) {
                println!(
                    "- {} ({}, {} y/o {}) CRI {} ({}, screening {})",
                    score.name,
                    score.id,
                    score.age,
                    score.gender,
                    score.score,
                    RiskCategory::from_score(score.score),
                    score.status
                );
            }
        }
        Commands::Report { cohort, out } => {
            let session = open_session(&config).await?;
            let user = session.user().context("no user signed in; run `onboard` first")?;
            let cohort_scores = match cohort {
                Some(path) => Some(cri::score_patients(&cohort::load_csv(&path)?)),
                None => None,
            };

            let report = report::build_report(
                user,
                Utc::now().date_naive(),
                cohort_scores.as_deref(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Records => {
            let collaborators = Collaborators::from_config(&config, None)?;
            let Some(storage) = collaborators.storage else {
                println!("Blob storage not configured; no synced records.");
                return Ok(());
            };

            let records = storage.list().await.unwrap_or_else(|err| {
                warn!(error = %err, "failed to list clinical records");
                Vec::new()
            });
            println!("{} clinical records in storage.", records.len());
            for record in records.iter() {
                println!(
                    "- {} {} CRI {} status {}",
                    record["lastAssessment"].as_str().unwrap_or("-"),
                    record["id"].as_str().unwrap_or("anonymous"),
                    record["cri"],
                    record["status"]
                );
            }
        }
        Commands::Logout => {
            let mut session = open_session(&config).await?;
            session.logout().await?;
            println!("Signed out.");
        }
    }

    Ok(())
}

async fn open_session(config: &AppConfig) -> anyhow::Result<Session> {
    let store: Box<dyn ProfileStore> = match config.database_url.as_deref() {
        Some(database_url) => Box::new(PgProfileStore::connect(database_url).await?),
        None => {
            let store = FileProfileStore::new(&config.profile_dir);
            debug!(path = %store.path().display(), "using file profile store");
            Box::new(store)
        }
    };
    Session::open(store).await
}

fn print_status(config: &AppConfig, session: &Session) {
    match session.user() {
        Some(user) => {
            let current = session.current_cri();
            println!("{} ({}, {:?})", user.name, user.id, user.role);
            println!(
                "Current CRI: {} ({} risk)",
                current,
                RiskCategory::from_score(current)
            );
            println!("Assessments done: {}", user.cri_history.len());
            println!(
                "Last assessment: {}",
                user.cri_history
                    .last()
                    .map(|record| record.date.to_string())
                    .unwrap_or_else(|| "N/A".to_string())
            );
            println!("Trend: {}", cri::trend_direction(&user.cri_history));
        }
        None => println!("No user signed in."),
    }

    let caps = config.capabilities();
    println!(
        "Services: speech={} insights={} ml={} storage={}",
        caps.speech, caps.insight, caps.prediction, caps.storage
    );
    if !config.is_live() {
        println!("Demo mode: internal simulation active (cloud keys missing).");
    }
}

async fn run_assessment(
    config: &AppConfig,
    session: &mut Session,
    seconds: u64,
    audio: Option<PathBuf>,
) -> anyhow::Result<()> {
    if session.user().is_none() {
        warn!("no user signed in; the result will not be added to any history");
    }
    if !config.is_live() {
        println!("Demo mode: internal simulation active (cloud keys missing).");
    }

    let collaborators = Collaborators::from_config(config, audio)?;
    let mut flow = AssessmentFlow::new(collaborators, config.pacing, config.allow_simulation);

    match flow.start().await {
        Ok(CaptureMode::Live) => println!("Recording with live transcription..."),
        Ok(CaptureMode::Simulated) => println!("Recording with simulated transcription..."),
        Err(err) => {
            if let Some(message) = flow.error() {
                eprintln!("{message}");
            }
            return Err(err.into());
        }
    }

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval(Duration::from_secs(5));
    progress.tick().await;
    let lost = flow.lost_signal();

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = lost.cancelled() => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping early.");
                break;
            }
            _ = progress.tick() => {
                println!("  {}s captured: \"{}\"", flow.elapsed_secs(), flow.transcript());
            }
        }
    }

    let duration = match flow.stop().await {
        Ok(duration) => duration,
        Err(err) => {
            if let Some(message) = flow.error() {
                eprintln!("{message}");
            }
            return Err(err.into());
        }
    };
    println!("Captured {duration}s of speech. Processing...");

    let outcome = flow
        .process(session, |stage| println!("  > {stage}"))
        .await?;

    let category = RiskCategory::from_score(outcome.record.score);
    println!();
    println!("Assessment {} complete.", outcome.record.assessment_id);
    println!("CRI: {} ({} risk)", outcome.record.score, category);
    println!(
        "Features: {:.0}s, {} chunks",
        outcome.features.duration_sec, outcome.features.chunk_count
    );
    println!(
        "Screening: {} ({:?} model){}",
        outcome.status,
        outcome.status_source,
        if outcome.simulated { ", simulated transcript" } else { "" }
    );
    if let Some(insight) = flow.insight() {
        println!("Clinical summary: {insight}");
    }
    if !outcome.transcript.is_empty() {
        println!("Transcript: \"{}\"", outcome.transcript);
    }

    flow.reset()?;
    debug!(state = %flow.state(), "assessment cycle closed");
    Ok(())
}
