//! Scenario files and the runners that drive the library primitives
//!
//! Each runner returns a serializable report so the CLI can print either
//! a human-readable summary or JSON.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use concord::core::duration_millis;
use concord::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

/// A happy-eyeballs scenario loaded from JSON
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Scenario {
    /// Delay before the next candidate starts, in milliseconds
    #[serde(default)]
    pub stagger_ms: Option<u64>,
    pub candidates: Vec<CandidateSpec>,
}

/// One simulated connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateSpec {
    pub name: String,
    pub latency_ms: u64,
    #[serde(default)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Success,
    Failure,
}

impl Scenario {
    /// Parse a scenario from JSON text
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse happy-eyes scenario")
    }

    /// Scheduler configuration, falling back to the default stagger
    pub fn config(&self) -> HappyEyesConfig {
        match self.stagger_ms {
            Some(millis) => HappyEyesConfig::from_millis(millis),
            None => HappyEyesConfig::default(),
        }
    }
}

/// When a candidate was started, relative to the beginning of the race
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRecord {
    pub name: String,
    pub at_ms: u64,
}

/// Outcome of a happy-eyeballs run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HappyEyesReport {
    pub stagger_ms: u64,
    pub winner: Option<String>,
    pub elapsed_ms: u64,
    pub starts: Vec<StartRecord>,
    pub failures: Vec<String>,
    pub error: Option<String>,
}

fn millis_since(start: Instant) -> u64 {
    duration_millis(start.elapsed())
}

async fn attempt(candidate: CandidateSpec, token: AbortToken) -> Result<String> {
    delay(Duration::from_millis(candidate.latency_ms), Some(&token)).await?;
    match candidate.outcome {
        Outcome::Success => Ok(candidate.name),
        Outcome::Failure => Err(anyhow!("{} refused", candidate.name)),
    }
}

/// Race the scenario's candidates and record the start timeline
pub async fn run_happy_eyes(scenario: &Scenario, token: Option<&AbortToken>) -> HappyEyesReport {
    let config = scenario.config();
    let started = Instant::now();
    let timeline: Arc<Mutex<Vec<StartRecord>>> = Arc::default();
    let recorder = timeline.clone();

    info!(
        candidates = scenario.candidates.len(),
        stagger_ms = duration_millis(config.stagger),
        "Running happy-eyes scenario"
    );

    let result = race_happy_eyes(
        scenario.candidates.iter().cloned(),
        move |candidate: CandidateSpec, token: AbortToken| {
            recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(StartRecord {
                    name: candidate.name.clone(),
                    at_ms: millis_since(started),
                });
            attempt(candidate, token)
        },
        config,
        token,
    )
    .await;

    let elapsed_ms = millis_since(started);
    let starts = std::mem::take(&mut *timeline.lock().unwrap_or_else(PoisonError::into_inner));
    let mut report = HappyEyesReport {
        stagger_ms: duration_millis(config.stagger),
        winner: None,
        elapsed_ms,
        starts,
        failures: Vec::new(),
        error: None,
    };

    match result {
        Ok(winner) => report.winner = Some(winner),
        Err(error) => {
            if let AsyncError::AllAttemptsExhausted { failures, .. } = &error {
                report.failures = failures.iter().map(|failure| failure.to_string()).collect();
            }
            report.error = Some(error.to_string());
        }
    }
    report
}

/// A lock grant observed by one contending task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub task: usize,
    pub ticket: u64,
    pub at_ms: u64,
}

/// Queue `tasks` requests behind a held lock and record the grant order
///
/// Every request is issued before any task runs, so task `n` holds ticket
/// `n + 1`.
pub async fn run_lock(tasks: usize, hold: Duration) -> Result<Vec<Grant>> {
    let lock = AsyncLock::new();
    let started = Instant::now();
    let grants: Arc<Mutex<Vec<Grant>>> = Arc::default();
    let mut gate = lock.acquire().await?;

    let mut handles = Vec::with_capacity(tasks);
    for task in 0..tasks {
        let acquire = lock.acquire();
        let grants = grants.clone();
        handles.push(tokio::spawn(async move {
            let guard = acquire.await?;
            debug!(task, ticket = guard.ticket(), "Task holds the lock");
            grants
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Grant {
                    task,
                    ticket: guard.ticket(),
                    at_ms: millis_since(started),
                });
            tokio::time::sleep(hold).await;
            Ok::<(), AsyncError>(())
        }));
    }

    gate.release();
    for handle in handles {
        handle.await.context("Lock task panicked")??;
    }

    let order = std::mem::take(&mut *grants.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(order)
}

/// A subscription change made while reconciling one key set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "key", rename_all = "lowercase")]
pub enum ObserveEvent {
    Subscribe(String),
    Unsubscribe(String),
}

/// Changes caused by one input line, or by the final teardown when `line`
/// is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserveStep {
    pub line: Option<usize>,
    pub keys: Vec<String>,
    pub events: Vec<ObserveEvent>,
}

/// Feed each line's whitespace-separated keys to a [`KeyedObserver`]
///
/// Lines starting with `#` are skipped; a blank line is an empty key set.
/// The observer stops listening after the last line.
pub fn run_observe(input: &str) -> Vec<ObserveStep> {
    let log: Arc<Mutex<Vec<ObserveEvent>>> = Arc::default();
    let recorder = log.clone();
    let mut observer = KeyedObserver::new(move |key: &String| {
        recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ObserveEvent::Subscribe(key.clone()));
        let recorder = recorder.clone();
        let key = key.clone();
        Some(Unsubscribe::new(move || {
            recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ObserveEvent::Unsubscribe(key));
        }))
    });

    let drain = || std::mem::take(&mut *log.lock().unwrap_or_else(PoisonError::into_inner));
    let mut steps = Vec::new();

    for (index, line) in input.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let keys: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        observer.observe(keys.clone());
        steps.push(ObserveStep {
            line: Some(index + 1),
            keys,
            events: drain(),
        });
    }

    observer.stop_listening();
    steps.push(ObserveStep {
        line: None,
        keys: Vec::new(),
        events: drain(),
    });
    steps
}
