use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use futures_util::StreamExt;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{collaborators::TranscriptStream, config::Pacing};

const SIMULATED_FRAGMENTS: [&str; 6] = [
    "I see a kitchen with a woman drying dishes.",
    "The sink is overflowing onto the floor.",
    "A boy is standing on a stool, reaching for the cookie jar.",
    "The stool is tipping over, um, and the girl is laughing.",
    "Outside the window there is a garden path.",
    "The mother does not seem to notice the water.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Live,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentSource {
    Live,
    Simulated,
}

#[derive(Debug, Default)]
pub(crate) struct TranscriptBuffer {
    fragments: Vec<(FragmentSource, String)>,
    simulated: bool,
}

impl TranscriptBuffer {
    pub fn text(&self) -> String {
        join(self.fragments.iter().map(|(_, text)| text.as_str()))
    }

    /// Text recognized by a live service; simulated placeholders excluded.
    pub fn live_text(&self) -> Option<String> {
        let live = join(
            self.fragments
                .iter()
                .filter(|(source, _)| *source == FragmentSource::Live)
                .map(|(_, text)| text.as_str()),
        );
        (!live.is_empty()).then_some(live)
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    fn push(&mut self, source: FragmentSource, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.fragments.push((source, text.to_string()));
        }
    }
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Default)]
pub(crate) struct SharedTranscript(Arc<Mutex<TranscriptBuffer>>);

impl SharedTranscript {
    pub fn lock(&self) -> MutexGuard<'_, TranscriptBuffer> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Timers owned by one recording. Cancelled on `finish` or drop.
pub(crate) struct Capture {
    mode: CaptureMode,
    cancel: CancellationToken,
    lost: CancellationToken,
    elapsed: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl Capture {
    pub fn spawn(
        live: Option<TranscriptStream>,
        allow_simulation: bool,
        pacing: Pacing,
        transcript: SharedTranscript,
    ) -> Self {
        let cancel = CancellationToken::new();
        let lost = CancellationToken::new();
        let elapsed = Arc::new(AtomicU64::new(0));

        let ticker = tokio::spawn(count_seconds(
            pacing.duration_tick,
            elapsed.clone(),
            cancel.clone(),
        ));

        let (mode, feeder) = match live {
            Some(stream) => (
                CaptureMode::Live,
                tokio::spawn(feed_live(
                    stream,
                    transcript,
                    allow_simulation,
                    pacing.simulation_interval,
                    cancel.clone(),
                    lost.clone(),
                )),
            ),
            None => {
                transcript.lock().simulated = true;
                (
                    CaptureMode::Simulated,
                    tokio::spawn(simulate(
                        transcript,
                        pacing.simulation_interval,
                        cancel.clone(),
                    )),
                )
            }
        };

        Self {
            mode,
            cancel,
            lost,
            elapsed,
            tasks: vec![ticker, feeder],
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Cancelled when the live stream failed before any speech arrived and
    /// there is no simulated fallback.
    pub fn lost(&self) -> &CancellationToken {
        &self.lost
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_cancelled()
    }

    /// Stops every timer and returns the frozen duration.
    pub async fn finish(mut self) -> u64 {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                warn!(target: "recording", error = %err, "capture task ended abnormally");
            }
        }
        self.elapsed_secs()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn count_seconds(tick: Duration, elapsed: Arc<AtomicU64>, cancel: CancellationToken) {
    let mut interval = interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                elapsed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn simulate(transcript: SharedTranscript, every: Duration, cancel: CancellationToken) {
    let mut interval = interval_at(Instant::now() + every, every);
    let mut next = 0usize;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let fragment = SIMULATED_FRAGMENTS[next % SIMULATED_FRAGMENTS.len()];
                transcript.lock().push(FragmentSource::Simulated, fragment);
                next += 1;
            }
        }
    }
}

async fn feed_live(
    mut stream: TranscriptStream,
    transcript: SharedTranscript,
    allow_simulation: bool,
    every: Duration,
    cancel: CancellationToken,
    lost: CancellationToken,
) {
    let mut heard = false;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };

        match item {
            Some(Ok(fragment)) => {
                debug!(target: "recording", chars = fragment.len(), "live fragment");
                transcript.lock().push(FragmentSource::Live, &fragment);
                heard = true;
            }
            Some(Err(err)) => {
                warn!(target: "recording", error = %err, "live transcription failed");
                break;
            }
            None => {
                debug!(target: "recording", "live transcription stream finished");
                return;
            }
        }
    }

    drop(stream);
    if allow_simulation {
        info!(target: "recording", "switching to simulated transcript");
        transcript.lock().simulated = true;
        simulate(transcript, every, cancel).await;
    } else if !heard {
        warn!(target: "recording", "live transcription failed before any speech; recording lost");
        lost.cancel();
    }
}
