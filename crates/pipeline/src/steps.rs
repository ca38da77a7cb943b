//! Orchestration steps and the ordered event log a run produces.

use chrono::Utc;
use edgecast_core::types::Timestamp;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// States of a deployment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    FetchState,
    WriteEncoders,
    AwaitEncoders,
    VerifyEncoders,
    WriteOutputs,
    AwaitOutputs,
    VerifyOutputs,
    ConfigureDownstream,
    Done,
    Failed,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FetchState => "fetch_state",
            Self::WriteEncoders => "write_encoders",
            Self::AwaitEncoders => "await_encoders",
            Self::VerifyEncoders => "verify_encoders",
            Self::WriteOutputs => "write_outputs",
            Self::AwaitOutputs => "await_outputs",
            Self::VerifyOutputs => "verify_outputs",
            Self::ConfigureDownstream => "configure_downstream",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Skipped,
    /// The step failed but the run continues (bypass, one platform down).
    Warning,
    Failed,
}

// ---------------------------------------------------------------------------
// StepEvent
// ---------------------------------------------------------------------------

/// One entry of a deployment's progress log.
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    pub step: Step,
    pub status: StepStatus,
    pub message: Option<String>,
    pub timestamp: Timestamp,
}

impl StepEvent {
    pub fn new(step: Step, status: StepStatus) -> Self {
        Self {
            step,
            status,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Collects a run's events in order and mirrors each to tracing and to
/// an optional live subscriber.
pub(crate) struct StepLog {
    device_id: String,
    events: Vec<StepEvent>,
    live: Option<broadcast::Sender<StepEvent>>,
}

impl StepLog {
    pub fn new(device_id: &str, live: Option<broadcast::Sender<StepEvent>>) -> Self {
        Self {
            device_id: device_id.to_string(),
            events: Vec::new(),
            live,
        }
    }

    pub fn record(&mut self, event: StepEvent) {
        let detail = event.message.as_deref().unwrap_or("");
        match event.status {
            StepStatus::Failed => {
                tracing::error!(device_id = %self.device_id, step = %event.step, detail, "Step failed")
            }
            StepStatus::Warning => {
                tracing::warn!(device_id = %self.device_id, step = %event.step, detail, "Step degraded")
            }
            status => {
                tracing::info!(device_id = %self.device_id, step = %event.step, ?status, detail, "Step")
            }
        }

        if let Some(live) = &self.live {
            // No receivers is fine; the log below is authoritative.
            let _ = live.send(event.clone());
        }
        self.events.push(event);
    }

    pub fn started(&mut self, step: Step) {
        self.record(StepEvent::new(step, StepStatus::Started));
    }

    pub fn completed(&mut self, step: Step, message: impl Into<String>) {
        self.record(StepEvent::new(step, StepStatus::Completed).with_message(message));
    }

    pub fn skipped(&mut self, step: Step, message: impl Into<String>) {
        self.record(StepEvent::new(step, StepStatus::Skipped).with_message(message));
    }

    pub fn warning(&mut self, step: Step, message: impl Into<String>) {
        self.record(StepEvent::new(step, StepStatus::Warning).with_message(message));
    }

    pub fn failed(&mut self, step: Step, message: impl Into<String>) {
        self.record(StepEvent::new(step, StepStatus::Failed).with_message(message));
    }

    pub fn into_events(self) -> Vec<StepEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_keeps_order_and_forwards() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut log = StepLog::new("d-1", Some(tx));
        log.started(Step::Init);
        log.completed(Step::Init, "ok");

        let events = log.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, StepStatus::Started);
        assert_eq!(events[1].message.as_deref(), Some("ok"));
        assert_eq!(rx.try_recv().unwrap().status, StepStatus::Started);
        assert_eq!(rx.try_recv().unwrap().status, StepStatus::Completed);
    }

    #[test]
    fn event_serializes_with_timestamp() {
        let event = StepEvent::new(Step::AwaitOutputs, StepStatus::Warning).with_message("late");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["step"], "await_outputs");
        assert_eq!(value["status"], "warning");
        assert_eq!(value["message"], "late");
        let stamp = value["timestamp"].as_str().unwrap();
        assert_eq!(stamp.parse::<Timestamp>().unwrap(), event.timestamp);
    }

    #[test]
    fn step_names() {
        assert_eq!(Step::ConfigureDownstream.to_string(), "configure_downstream");
    }
}
