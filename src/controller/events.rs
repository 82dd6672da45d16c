//! # Events
//!
//! Fire-and-forget notifications about significant transitions of an Application
//! (ownership failures, apply failures, phase changes).
//!
//! Publishing never blocks a pass: the Kubernetes sink hands the event to a
//! background task and only logs if delivery fails.

use crate::crd::Application;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use std::fmt;
use tracing::warn;

/// Severity of a controller event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Structured notification about an Application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl ControllerEvent {
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Best-effort event destination
pub trait EventSink: Send + Sync {
    fn publish(&self, app: &Application, event: ControllerEvent);
}

/// Publishes events to the Kubernetes events API
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

impl KubeEventSink {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventSink for KubeEventSink {
    fn publish(&self, app: &Application, event: ControllerEvent) {
        let reference = app.object_ref(&());
        let recorder = self.recorder.clone();
        let kube_event = Event {
            type_: match event.kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: event.reason,
            note: Some(truncate_note(event.message)),
            action: "Reconcile".to_string(),
            secondary: None,
        };

        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&kube_event, &reference).await {
                warn!("Failed to publish event {}: {}", kube_event.reason, e);
            }
        });
    }
}

// The events API rejects notes longer than 1kB
fn truncate_note(mut note: String) -> String {
    const MAX_NOTE_BYTES: usize = 1024;
    if note.len() > MAX_NOTE_BYTES {
        let mut cut = MAX_NOTE_BYTES;
        while !note.is_char_boundary(cut) {
            cut -= 1;
        }
        note.truncate(cut);
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_note_keeps_short_notes() {
        assert_eq!(truncate_note("apply failed".to_string()), "apply failed");
    }

    #[test]
    fn test_truncate_note_respects_char_boundaries() {
        let note = "é".repeat(600);
        let truncated = truncate_note(note);
        assert!(truncated.len() <= 1024);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_event_constructors() {
        let event = ControllerEvent::warning("ApplyFailed", "boom");
        assert_eq!(event.kind, EventKind::Warning);
        assert_eq!(event.reason, "ApplyFailed");
        assert_eq!(ControllerEvent::normal("PhaseChanged", "x").kind, EventKind::Normal);
    }
}
