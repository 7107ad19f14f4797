//! Host-side job and task contexts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;

/// Identifier of one host job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One attempt at running one task of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskAttemptId {
    pub job: JobId,
    pub task: u32,
    pub attempt: u32,
}

impl TaskAttemptId {
    pub fn new(job: JobId, task: u32, attempt: u32) -> Self {
        Self { job, task, attempt }
    }
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt_{}_{:06}_{}", self.job, self.task, self.attempt)
    }
}

/// Job-wide view handed to split enumeration and output checks.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    conf: Configuration,
}

impl JobContext {
    /// A context for a new job with a generated id.
    pub fn new(conf: Configuration) -> Self {
        Self::with_id(JobId::generate(), conf)
    }

    pub fn with_id(job_id: JobId, conf: Configuration) -> Self {
        Self { job_id, conf }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.conf
    }

    /// The same job seen through another configuration.
    pub fn with_configuration(&self, conf: Configuration) -> Self {
        Self::with_id(self.job_id.clone(), conf)
    }
}

impl From<JobContext> for Configuration {
    fn from(job: JobContext) -> Self {
        job.conf
    }
}

/// Per-attempt view handed to readers, writers and committers.
#[derive(Debug, Clone)]
pub struct TaskAttemptContext {
    attempt_id: TaskAttemptId,
    conf: Configuration,
}

impl TaskAttemptContext {
    pub fn new(attempt_id: TaskAttemptId, conf: Configuration) -> Self {
        Self { attempt_id, conf }
    }

    pub fn attempt_id(&self) -> &TaskAttemptId {
        &self.attempt_id
    }

    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.conf
    }

    pub fn with_configuration(&self, conf: Configuration) -> Self {
        Self::new(self.attempt_id.clone(), conf)
    }
}

impl From<TaskAttemptContext> for Configuration {
    fn from(task: TaskAttemptContext) -> Self {
        task.conf
    }
}
