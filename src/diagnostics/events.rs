//! Simulation Events
//!
//! Records workflow and job decisions, rejected conditions and unresolved
//! templates so callers can inspect or report them after a run.

use std::fmt;

use log::{debug, warn};

/// Type of simulation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Workflow rules were evaluated
    WorkflowEvaluated,
    /// Job was selected to run
    JobSelected,
    /// Job was skipped by its rules
    JobSkipped,
    /// Rule variables were overlaid into the variable store
    VariablesApplied,
    /// A rule condition failed to lex, parse or evaluate
    ConditionRejected,
    /// A rule entry was not a mapping and was ignored
    RuleIgnored,
    /// An `extends` target does not exist
    TemplateMissing,
    /// An `extends` chain loops back on itself
    TemplateCycle,
}

impl EventKind {
    /// Returns true for events that indicate a problem in the configuration.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::ConditionRejected | Self::RuleIgnored | Self::TemplateMissing | Self::TemplateCycle
        )
    }
}

/// A single event recorded during a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationEvent {
    /// Type of event
    pub kind: EventKind,
    /// Job name, template name or condition the event is about
    pub subject: String,
    /// Human-readable detail
    pub detail: String,
}

impl SimulationEvent {
    pub fn new(kind: EventKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SimulationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} '{}': {}", self.kind, self.subject, self.detail)
    }
}

/// Destination for simulation events.
pub trait EventSink {
    /// Records one event.
    fn record(&mut self, event: SimulationEvent);
}

/// Collects events in memory in the order they were recorded.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SimulationEvent>,
}

impl EventLog {
    /// Creates an empty event log.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Returns all recorded events.
    pub fn events(&self) -> &[SimulationEvent] {
        &self.events
    }

    /// Returns the events of one kind, in recording order.
    pub fn of_kind(&self, kind: &EventKind) -> Vec<&SimulationEvent> {
        self.events.iter().filter(|e| &e.kind == kind).collect()
    }

    /// Returns only the warning events.
    pub fn warnings(&self) -> Vec<&SimulationEvent> {
        self.events.iter().filter(|e| e.kind.is_warning()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for EventLog {
    fn record(&mut self, event: SimulationEvent) {
        self.events.push(event);
    }
}

/// Forwards events to the `log` facade: warnings at `warn`, the rest at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&mut self, event: SimulationEvent) {
        if event.kind.is_warning() {
            warn!("{}", event);
        } else {
            debug!("{}", event);
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn record(&mut self, event: SimulationEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_creation() {
        let log = EventLog::new();
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_preserves_order() {
        let mut log = EventLog::new();
        log.record(SimulationEvent::new(EventKind::JobSelected, "build", "no rules"));
        log.record(SimulationEvent::new(EventKind::JobSkipped, "deploy", "when: never"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0].subject, "build");
        assert_eq!(log.events()[1].kind, EventKind::JobSkipped);
    }

    #[test]
    fn test_of_kind_filters() {
        let mut log = EventLog::default();
        log.record(SimulationEvent::new(EventKind::JobSelected, "a", ""));
        log.record(SimulationEvent::new(EventKind::JobSelected, "b", ""));
        log.record(SimulationEvent::new(EventKind::JobSkipped, "c", ""));

        assert_eq!(log.of_kind(&EventKind::JobSelected).len(), 2);
        assert_eq!(log.of_kind(&EventKind::TemplateMissing).len(), 0);
    }

    #[test]
    fn test_warnings_only_include_problems() {
        let mut log = EventLog::new();
        log.record(SimulationEvent::new(EventKind::WorkflowEvaluated, "workflow", "run"));
        log.record(SimulationEvent::new(EventKind::ConditionRejected, "$A ==", "parse error"));

        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, EventKind::ConditionRejected);
    }

    #[test]
    fn test_mutable_reference_is_a_sink() {
        fn record_into<S: EventSink>(mut sink: S) {
            sink.record(SimulationEvent::new(EventKind::JobSelected, "a", ""));
        }

        let mut log = EventLog::new();
        record_into(&mut log);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_event_display() {
        let event = SimulationEvent::new(EventKind::TemplateMissing, ".base", "referenced by 'build'");
        let text = event.to_string();
        assert!(text.contains("TemplateMissing"));
        assert!(text.contains(".base"));
    }
}
