//! Simulation Engine
//!
//! Decides, in one deterministic pass, which jobs a pipeline would run and
//! with which variables:
//! - Workflow rules are evaluated against the profile and global variables
//! - Jobs are expanded (`extends`, script normalization)
//! - Each job's rules are evaluated against the variable store *as it
//!   stands when the job is reached*; variables of a selected rule stay
//!   visible to every later job
//! - Selected jobs have their fields variable-expanded
//! - Duplicate definitions and unmet `needs` are collected as findings
//!
//! The engine does no I/O. Decisions are reported to an injected
//! [`EventSink`].

use std::collections::BTreeSet;

use log::{debug, info};
use serde::Serialize;

use crate::config::{LoaderOptions, SourceMap};
use crate::diagnostics::{EventKind, EventLog, EventSink, SimulationEvent};
use crate::pipeline::jobs::expand_all;
use crate::pipeline::model::{rules_from_value, serialize_jobs, JobDefinition, Pipeline, Rule};
use crate::pipeline::validator::{
    detect_duplicate_jobs, validate_needs_dependencies, DuplicateJobWarning, NeedsFinding,
};
use crate::pipeline::variables::{expand_mapping, overlay, Variables};
use crate::rules::{evaluate_rules, evaluate_workflow, EmptyWorkflow};

/// Settings for one `validate` or `simulate` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulationOptions {
    pub loader: LoaderOptions,
    pub empty_workflow: EmptyWorkflow,
}

/// Outcome of a simulation.
///
/// Serializes to the primary result document. Duplicate-job and `needs`
/// findings are skipped; callers report them separately.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct SimulationSummary {
    /// Whether the workflow lets the pipeline run
    pub workflow_run: bool,

    /// The workflow rule that matched, if any
    pub workflow_triggered_rule: Option<Rule>,

    /// Variables contributed by the matching workflow rule
    pub workflow_applied_variables: Variables,

    /// Final variable store after every selected job
    pub global_variables: Variables,

    /// Expanded jobs selected to run, in processing order
    #[serde(serialize_with = "serialize_jobs")]
    pub jobs: Vec<JobDefinition>,

    /// Every non-hidden job after expansion, selected or not
    #[serde(serialize_with = "serialize_jobs")]
    pub all_expanded_jobs: Vec<JobDefinition>,

    #[serde(skip)]
    pub duplicate_job_warnings: Vec<DuplicateJobWarning>,

    #[serde(skip)]
    pub needs_validation_findings: Vec<NeedsFinding>,
}

impl SimulationSummary {
    /// Names of the jobs selected to run.
    pub fn running_jobs(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    /// Gets a selected job by name.
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// Pipeline simulation engine.
///
/// # Example
///
/// ```rust,no_run
/// use cimulator::config::{load, load_profile};
/// use cimulator::pipeline::Pipeline;
/// use cimulator::simulation::Engine;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let resolved = load(".gitlab-ci.yml")?;
///     let profile = load_profile("profiles.yml", "push_to_main")?;
///
///     let mut engine = Engine::new();
///     let summary = engine.run(&Pipeline::from_config(&resolved.config), &resolved.sources, &profile);
///
///     println!("Running: {:?}", summary.running_jobs());
///     println!("{} events recorded", engine.sink().len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Engine<S: EventSink = EventLog> {
    options: SimulationOptions,
    sink: S,
}

impl Engine<EventLog> {
    /// Creates an engine that collects events in memory.
    pub fn new() -> Self {
        Self::with_sink(EventLog::new())
    }
}

impl Default for Engine<EventLog> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> Engine<S> {
    /// Creates an engine reporting to the given sink.
    pub fn with_sink(sink: S) -> Self {
        Self {
            options: SimulationOptions::default(),
            sink,
        }
    }

    /// Replaces all options.
    pub fn with_options(mut self, options: SimulationOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets how an absent or empty workflow rule list is treated.
    pub fn set_empty_workflow(&mut self, policy: EmptyWorkflow) {
        self.options.empty_workflow = policy;
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Simulates one pipeline run.
    ///
    /// Variable precedence, lowest first: `profile`, the pipeline's global
    /// `variables`, the matching workflow rule, then each selected job rule
    /// in processing order.
    pub fn run(&mut self, pipeline: &Pipeline, sources: &SourceMap, profile: &Variables) -> SimulationSummary {
        info!(
            "Simulating pipeline with {} job entries ({} visible)",
            pipeline.len(),
            pipeline.visible_jobs().count()
        );

        let mut base = profile.clone();
        overlay(&mut base, &pipeline.variables);

        let workflow = evaluate_workflow(
            pipeline.workflow_rules.as_deref(),
            &base,
            self.options.empty_workflow,
            &mut self.sink,
        );
        self.sink.record(SimulationEvent::new(
            EventKind::WorkflowEvaluated,
            "workflow",
            format!(
                "should_run={}, condition={}",
                workflow.should_run,
                workflow.triggered_condition.as_deref().unwrap_or("<none>")
            ),
        ));

        let mut store = base;
        overlay(&mut store, &workflow.applied_variables);

        let expanded = expand_all(&pipeline.jobs, &mut self.sink);

        let mut jobs = Vec::new();
        let mut all_expanded_jobs = Vec::new();
        let mut running = BTreeSet::new();

        for job in expanded.iter().filter(|job| !job.is_hidden()) {
            if job.has_rules() {
                let (rules, ignored) = rules_from_value(job.get("rules"));
                if ignored > 0 {
                    self.sink.record(SimulationEvent::new(
                        EventKind::RuleIgnored,
                        job.name.as_str(),
                        format!("{} rule entries are not mappings", ignored),
                    ));
                }

                let outcome = evaluate_rules(&rules, &store, &mut self.sink);
                if !outcome.should_run {
                    self.sink.record(SimulationEvent::new(
                        EventKind::JobSkipped,
                        job.name.as_str(),
                        match outcome.triggered_rule {
                            Some(rule) => format!("rule selected when: {}", rule.when),
                            None => "no rule matched".to_string(),
                        },
                    ));
                    all_expanded_jobs.push(JobDefinition::new(job.name.clone(), expand_mapping(&job.body, &store)));
                    continue;
                }

                if !outcome.applied_variables.is_empty() {
                    let names: Vec<&str> = outcome.applied_variables.keys().map(String::as_str).collect();
                    self.sink.record(SimulationEvent::new(
                        EventKind::VariablesApplied,
                        job.name.as_str(),
                        names.join(", "),
                    ));
                    overlay(&mut store, &outcome.applied_variables);
                }
            }

            let selected = JobDefinition::new(job.name.clone(), expand_mapping(&job.body, &store));
            debug!("Job '{}' selected", job.name);
            self.sink.record(SimulationEvent::new(EventKind::JobSelected, job.name.as_str(), "will run"));

            running.insert(job.name.clone());
            all_expanded_jobs.push(selected.clone());
            jobs.push(selected);
        }

        let duplicate_job_warnings = detect_duplicate_jobs(&pipeline.jobs, sources);
        let needs_validation_findings = validate_needs_dependencies(&all_expanded_jobs, &running);

        info!(
            "Simulation complete: workflow_run={}, {} of {} jobs selected",
            workflow.should_run,
            jobs.len(),
            all_expanded_jobs.len()
        );

        SimulationSummary {
            workflow_run: workflow.should_run,
            workflow_triggered_rule: workflow.triggered_rule,
            workflow_applied_variables: workflow.applied_variables,
            global_variables: store,
            jobs,
            all_expanded_jobs,
            duplicate_job_warnings,
            needs_validation_findings,
        }
    }
}
