//! Scripted scenarios
//!
//! A script names memos and operations by label and lists the calls to make
//! against a freshly spawned coordinator:
//!
//! ```yaml
//! max-concurrent: 2
//! steps:
//!   - register: { label: rec, kind: recording, memo: a }
//!   - register: { label: tr, kind: transcription, memo: a }
//!   - progress: { label: rec, value: 0.5 }
//!   - complete: rec
//!   - process-queue
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use colored::Colorize;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info};

use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorStats};
use crate::domain::{
    AnalysisMode, DetailedStatus, MemoId, Operation, OperationCategory, OperationId, OperationKind, OperationStatus,
    Priority,
};
use crate::events::{CoordEvent, create_event_bus, spawn_event_logger};

/// A scenario to replay
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Overrides the configured capacity
    #[serde(default, rename = "max-concurrent")]
    pub max_concurrent: Option<usize>,

    /// Each step is a single-key map (`complete: rec`) or a bare name (`process-queue`)
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(format!("Failed to read script {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to parse script {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(content)?;
        Ok(script)
    }
}

/// One scripted call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Register(RegisterStep),
    Start(String),
    Complete(String),
    Fail(FailStep),
    Cancel(String),
    Progress(ProgressStep),
    ProcessQueue,
    Capacity(usize),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterStep {
    /// Name later steps use for the operation
    pub label: String,
    pub kind: OperationCategory,
    /// Memo label; the same label means the same memo
    pub memo: String,
    /// Required for analysis
    #[serde(default)]
    pub mode: Option<AnalysisMode>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailStep {
    pub label: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressStep {
    pub label: String,
    pub value: f64,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(r) => {
                write!(f, "register {} ({}", r.label, r.kind)?;
                if let Some(mode) = r.mode {
                    write!(f, ":{}", mode)?;
                }
                write!(f, " on memo {})", r.memo)
            }
            Self::Start(label) => write!(f, "start {}", label),
            Self::Complete(label) => write!(f, "complete {}", label),
            Self::Fail(step) => write!(f, "fail {}", step.label),
            Self::Cancel(label) => write!(f, "cancel {}", label),
            Self::Progress(step) => write!(f, "progress {} {:.0}%", step.label, step.value * 100.0),
            Self::ProcessQueue => write!(f, "process-queue"),
            Self::Capacity(n) => write!(f, "capacity {}", n),
        }
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub outcome: String,
    /// False for rejections, refusals and errors
    pub ok: bool,
}

/// Final view of one operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationRow {
    pub label: String,
    pub memo: String,
    pub kind: OperationKind,
    pub priority: Priority,
    pub state: OperationStatus,
    pub status: DetailedStatus,
}

/// Everything a simulation produced
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub operations: Vec<OperationRow>,
    pub events: Vec<CoordEvent>,
    pub stats: CoordinatorStats,
}

/// Label bookkeeping for one run
#[derive(Default)]
struct Labels {
    memos: HashMap<String, MemoId>,
    operations: HashMap<String, OperationId>,
}

impl Labels {
    fn memo(&mut self, label: &str) -> MemoId {
        *self.memos.entry(label.to_string()).or_default()
    }

    fn operation(&self, label: &str) -> Result<OperationId> {
        self.operations
            .get(label)
            .copied()
            .ok_or_else(|| eyre::eyre!("Unknown operation label '{}'", label))
    }

    fn operation_label(&self, id: &OperationId) -> String {
        self.operations
            .iter()
            .find(|(_, op)| *op == id)
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| id.short())
    }

    fn memo_label(&self, id: &MemoId) -> String {
        self.memos
            .iter()
            .find(|(_, memo)| *memo == id)
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| id.short())
    }
}

fn outcome(text: impl Into<String>, ok: bool) -> (String, bool) {
    (text.into(), ok)
}

/// Run a script against a new coordinator built from `config`
pub async fn run_script(script: &Script, config: &Config, event_log: Option<&Path>) -> Result<SimulationReport> {
    debug!(steps = script.steps.len(), ?event_log, "run_script: called");

    let mut coordinator_config = config.coordinator.clone();
    if let Some(max_concurrent) = script.max_concurrent {
        coordinator_config.max_concurrent = max_concurrent;
    }

    let bus = create_event_bus(coordinator_config.event_capacity);
    let mut events_rx = bus.subscribe();
    let logger = event_log.map(|dir| spawn_event_logger(&bus, dir));

    let coordinator = Coordinator::spawn(&coordinator_config, config.conflict_policy(), bus.clone());
    let mut labels = Labels::default();
    let mut steps = Vec::with_capacity(script.steps.len());

    for step in &script.steps {
        let (text, ok) = run_step(&coordinator, &mut labels, step).await?;
        debug!(%step, outcome = %text, "run_script: step done");
        steps.push(StepOutcome {
            step: step.to_string(),
            outcome: text,
            ok,
        });
    }

    let operations = coordinator
        .list_all()
        .await?
        .iter()
        .map(|op: &Operation| OperationRow {
            label: labels.operation_label(&op.id),
            memo: labels.memo_label(&op.memo_id()),
            kind: op.kind,
            priority: op.priority,
            state: op.status,
            status: op.detailed_status(),
        })
        .collect();
    let stats = coordinator.stats().await?;
    coordinator.shutdown().await?;

    let mut events = Vec::new();
    loop {
        match events_rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    // The logger exits once the actor and this function drop the bus
    drop(bus);
    if let Some(handle) = logger {
        handle.await.context("Event logger task failed")?;
    }

    info!(steps = steps.len(), events = events.len(), "Simulation finished");
    Ok(SimulationReport {
        steps,
        operations,
        events,
        stats,
    })
}

async fn run_step(coordinator: &Coordinator, labels: &mut Labels, step: &Step) -> Result<(String, bool)> {
    let result = match step {
        Step::Register(r) => {
            let memo_id = labels.memo(&r.memo);
            let kind = match r.kind {
                OperationCategory::Recording => OperationKind::recording(memo_id),
                OperationCategory::Transcription => OperationKind::transcription(memo_id),
                OperationCategory::Analysis => {
                    let mode = r
                        .mode
                        .ok_or_else(|| eyre::eyre!("Analysis step '{}' needs a mode", r.label))?;
                    OperationKind::analysis(memo_id, mode)
                }
            };
            let registered = match r.priority {
                Some(priority) => coordinator.register_with_priority(kind, priority).await?,
                None => coordinator.register(kind).await?,
            };
            match registered {
                Some(id) => {
                    labels.operations.insert(r.label.clone(), id);
                    let status = coordinator
                        .get(id)
                        .await?
                        .map(|op| op.detailed_status().label())
                        .unwrap_or_default();
                    outcome(status, true)
                }
                None => outcome("rejected", false),
            }
        }
        Step::Start(label) => {
            let started = coordinator.start(labels.operation(label)?).await?;
            if started {
                outcome("started", true)
            } else {
                outcome("not started", false)
            }
        }
        Step::Complete(label) => match coordinator.complete(labels.operation(label)?).await {
            Ok(()) => outcome("completed", true),
            Err(e) => outcome(e.to_string(), false),
        },
        Step::Fail(f) => match coordinator.fail(labels.operation(&f.label)?, f.reason.clone()).await {
            Ok(()) => outcome("failed", true),
            Err(e) => outcome(e.to_string(), false),
        },
        Step::Cancel(label) => match coordinator.cancel(labels.operation(label)?).await {
            Ok(true) => outcome("cancelled", true),
            Ok(false) => outcome("already finished", false),
            Err(e) => outcome(e.to_string(), false),
        },
        Step::Progress(p) => match coordinator.update_progress(labels.operation(&p.label)?, p.value).await {
            Ok(true) => outcome("progress recorded", true),
            Ok(false) => outcome("ignored (not active)", false),
            Err(e) => outcome(e.to_string(), false),
        },
        Step::ProcessQueue => {
            let started = coordinator.process_queue().await?;
            outcome(format!("{} started", started), true)
        }
        Step::Capacity(n) => {
            coordinator.set_capacity(*n);
            // Settle promotions before the next step
            coordinator.process_queue().await?;
            outcome(format!("capacity {}", n), true)
        }
    };
    Ok(result)
}

fn paint_status(status: &DetailedStatus) -> String {
    let label = status.label();
    match status {
        DetailedStatus::Queued => label.yellow().to_string(),
        DetailedStatus::Processing { .. } => label.cyan().to_string(),
        DetailedStatus::Completed { .. } => label.green().to_string(),
        DetailedStatus::Failed { .. } => label.red().to_string(),
        DetailedStatus::Cancelled { .. } => label.dimmed().to_string(),
    }
}

/// Human-readable report
pub fn render_text(report: &SimulationReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "Steps".bold());
    for (i, step) in report.steps.iter().enumerate() {
        let outcome = if step.ok {
            step.outcome.green().to_string()
        } else {
            step.outcome.red().to_string()
        };
        let _ = writeln!(out, "  {:>2}. {:<40} {}", i + 1, step.step, outcome);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "Operations".bold());
    let _ = writeln!(out, "  {:<12} {:<8} {:<22} {:<8} STATUS", "LABEL", "MEMO", "KIND", "PRIORITY");
    for row in &report.operations {
        let _ = writeln!(
            out,
            "  {:<12} {:<8} {:<22} {:<8} {}",
            row.label,
            row.memo,
            row.kind.to_string(),
            row.priority.to_string(),
            paint_status(&row.status)
        );
    }

    if !report.events.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Events".bold());
        for event in &report.events {
            let _ = writeln!(out, "  {}", event.event_type());
        }
    }

    let stats = &report.stats;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "registered {}, started {}, completed {}, failed {}, cancelled {}, rejected {}, peak active {}",
        stats.registered,
        stats.started,
        stats.completed,
        stats.failed,
        stats.cancelled,
        stats.rejected_capacity + stats.rejected_conflict,
        stats.peak_active
    );
    out
}

/// Final status of a labelled operation
pub fn status_of(report: &SimulationReport, label: &str) -> Option<OperationStatus> {
    report
        .operations
        .iter()
        .find(|row| row.label == label)
        .map(|row| row.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const QUEUE_SCRIPT: &str = r#"
max-concurrent: 2
steps:
  - register: { label: rec, kind: recording, memo: a }
  - register: { label: tr, kind: transcription, memo: a }
  - progress: { label: rec, value: 0.5 }
  - complete: rec
  - process-queue
"#;

    #[test]
    fn test_parse_script() {
        let script = Script::parse(QUEUE_SCRIPT).unwrap();
        assert_eq!(script.max_concurrent, Some(2));
        assert_eq!(script.steps.len(), 5);
        assert!(matches!(script.steps[4], Step::ProcessQueue));
        assert_eq!(script.steps[0].to_string(), "register rec (recording on memo a)");
    }

    #[test]
    fn test_parse_every_step_form() {
        let script = Script::parse(
            r#"
steps:
  - register: { label: sum, kind: analysis, memo: a, mode: summary, priority: high }
  - start: sum
  - progress: { label: sum, value: 0.25 }
  - fail: { label: sum, reason: timeout }
  - fail: { label: sum }
  - cancel: sum
  - complete: sum
  - capacity: 4
  - process-queue
"#,
        )
        .unwrap();

        assert_eq!(script.max_concurrent, None);
        assert_eq!(script.steps.len(), 9);
        match &script.steps[0] {
            Step::Register(r) => {
                assert_eq!(r.kind, OperationCategory::Analysis);
                assert_eq!(r.mode, Some(AnalysisMode::Summary));
                assert_eq!(r.priority, Some(Priority::High));
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert!(matches!(&script.steps[1], Step::Start(label) if label == "sum"));
        assert!(matches!(&script.steps[2], Step::Progress(p) if p.value == 0.25));
        assert!(matches!(&script.steps[3], Step::Fail(f) if f.reason.as_deref() == Some("timeout")));
        assert!(matches!(&script.steps[4], Step::Fail(f) if f.reason.is_none()));
        assert!(matches!(&script.steps[5], Step::Cancel(_)));
        assert!(matches!(&script.steps[6], Step::Complete(_)));
        assert!(matches!(script.steps[7], Step::Capacity(4)));
        assert!(matches!(script.steps[8], Step::ProcessQueue));
    }

    #[test]
    fn test_parse_rejects_unknown_step() {
        assert!(Script::parse("steps:\n  - pause: rec\n").is_err());
    }

    #[tokio::test]
    async fn test_queue_scenario() {
        let script = Script::parse(QUEUE_SCRIPT).unwrap();
        let report = run_script(&script, &Config::default(), None).await.unwrap();

        assert_eq!(report.steps[0].outcome, "processing");
        assert_eq!(report.steps[1].outcome, "queued");
        assert_eq!(status_of(&report, "rec"), Some(OperationStatus::Completed));
        assert_eq!(status_of(&report, "tr"), Some(OperationStatus::Active));

        let types: Vec<_> = report.events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["RecordingStarted", "RecordingCompleted"]);
        assert!(render_text(&report).contains("Operations"));
    }

    #[tokio::test]
    async fn test_unknown_label_errors() {
        let script = Script::parse("steps:\n  - complete: ghost\n").unwrap();
        let err = run_script(&script, &Config::default(), None).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_analysis_needs_mode() {
        let script = Script::parse("steps:\n  - register: { label: x, kind: analysis, memo: a }\n").unwrap();
        assert!(run_script(&script, &Config::default(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_event_log_written() {
        let temp = tempdir().unwrap();
        let script = Script::parse(QUEUE_SCRIPT).unwrap();
        run_script(&script, &Config::default(), Some(temp.path())).await.unwrap();

        let memo_dirs: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(memo_dirs.len(), 1);
    }
}
