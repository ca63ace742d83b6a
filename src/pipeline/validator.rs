//! Pipeline Validation
//!
//! Consistency checks that produce warnings, never errors:
//! - Job names defined in more than one source file
//! - `needs` entries pointing at jobs that will not run

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::SourceMap;

use super::model::JobDefinition;

/// A job name defined in more than one file.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DuplicateJobWarning {
    pub job: String,
    /// Defining files in encounter order
    pub sources: Vec<PathBuf>,
}

impl fmt::Display for DuplicateJobWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files: Vec<String> = self.sources.iter().map(|p| p.display().to_string()).collect();
        write!(
            f,
            "Job '{}' is defined in multiple files: {}",
            self.job,
            files.join(", ")
        )
    }
}

/// A running job that needs a job which will not run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NeedsFinding {
    pub job: String,
    pub needed: String,
    #[serde(rename = "is_optional")]
    pub optional: bool,
    pub message: String,
}

impl NeedsFinding {
    pub fn new(job: impl Into<String>, needed: impl Into<String>, optional: bool) -> Self {
        let job = job.into();
        let needed = needed.into();
        let message = format!("Job '{}' needs job '{}' which will not run", job, needed);
        Self {
            job,
            needed,
            optional,
            message,
        }
    }
}

impl fmt::Display for NeedsFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "[Optional] {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Reports every job entry whose name was defined in more than one file.
///
/// Hidden template jobs are included. Results are sorted by job name.
pub fn detect_duplicate_jobs(jobs: &[JobDefinition], sources: &SourceMap) -> Vec<DuplicateJobWarning> {
    let names: BTreeSet<&str> = jobs.iter().map(|job| job.name.as_str()).collect();

    let warnings: Vec<DuplicateJobWarning> = names
        .into_iter()
        .filter_map(|name| {
            let files = sources.sources(name);
            (files.len() > 1).then(|| DuplicateJobWarning {
                job: name.to_string(),
                sources: files.to_vec(),
            })
        })
        .collect();

    for warning in &warnings {
        warn!("{}", warning);
    }
    warnings
}

/// Checks the `needs` of every running job against the set of running jobs.
///
/// Findings keep the job order of `jobs` and the declaration order of needs.
pub fn validate_needs_dependencies(jobs: &[JobDefinition], running: &BTreeSet<String>) -> Vec<NeedsFinding> {
    let mut findings = Vec::new();

    for job in jobs.iter().filter(|job| running.contains(&job.name)) {
        for need in job.needs() {
            if running.contains(&need.job) {
                debug!("Job '{}' need '{}' is satisfied", job.name, need.job);
                continue;
            }
            findings.push(NeedsFinding::new(&job.name, &need.job, need.optional));
        }
    }

    if !findings.is_empty() {
        info!("{} unmet needs across {} running jobs", findings.len(), running.len());
    }
    findings
}
