//! Sequential workflows with suspend/resume.
//!
//! A [`Workflow`] feeds each step's output to the next step. A step may
//! suspend instead, in which case the run is parked under its run id until
//! [`Workflow::resume_run`] hands the step the user's answer. Every run ends
//! in a recorded terminal state; resuming a finished run replays that record
//! and executes nothing.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchboard_core::types::{ConfirmationKind, PendingRunHandle, ResourceType};

use crate::resource::{
    Confirmation, Invocable, InvocationContext, RegisteredResource, ResourceDescriptor,
    ResourceOutput,
};

pub use builtin::{meeting_invite_workflow, order_status_workflow};

/// What a step produced.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Output handed to the next step (or the workflow result after the last).
    Continue(Value),
    /// Pause until the user answers.
    Suspend {
        payload: Value,
        expects: ConfirmationKind,
    },
}

#[async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> &str;

    /// `resume` carries the user's answer when the step previously suspended.
    async fn run(&self, input: Value, resume: Option<&Value>) -> anyhow::Result<StepOutcome>;
}

/// State of one workflow run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunRecord {
    Suspended {
        step: usize,
        input: Value,
        payload: Value,
        expects: ConfirmationKind,
    },
    Succeeded(Value),
    Failed(String),
}

pub struct Workflow {
    id: String,
    description: String,
    input_schema: Value,
    steps: Vec<Arc<dyn Step>>,
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_schema,
            steps: Vec::new(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Append a step.
    pub fn then(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new(
            &self.id,
            &self.description,
            ResourceType::Workflow,
            self.input_schema.clone(),
        )
    }

    pub fn into_resource(self) -> RegisteredResource {
        RegisteredResource::new(self.descriptor(), Arc::new(self))
    }

    /// Start a new run. Returns its id and where it ended up.
    pub async fn start(&self, input: Value) -> anyhow::Result<(String, RunRecord)> {
        let run_id = Uuid::new_v4().to_string();
        info!(workflow = %self.id, run_id = %run_id, "workflow started");
        let record = self.execute_from(&run_id, 0, input, None).await?;
        Ok((run_id, record))
    }

    /// Continue a suspended run with the user's answer.
    ///
    /// A run that already finished returns its recorded result unchanged.
    pub async fn resume_run(&self, run_id: &str, answer: &Value) -> anyhow::Result<RunRecord> {
        // The suspended record stays until `execute_from` replaces it, so an
        // abandoned resume can be retried.
        let record = self.runs.lock().await.get(run_id).cloned();
        let (step, input) = match record {
            None => anyhow::bail!("workflow '{}' has no run '{run_id}'", self.id),
            Some(RunRecord::Suspended { step, input, .. }) => (step, input),
            Some(finished) => {
                debug!(workflow = %self.id, run_id, "replaying finished run");
                return Ok(finished);
            }
        };

        info!(workflow = %self.id, run_id, step, "workflow resumed");
        self.execute_from(run_id, step, input, Some(answer)).await
    }

    pub async fn run_record(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.lock().await.get(run_id).cloned()
    }

    async fn execute_from(
        &self,
        run_id: &str,
        start: usize,
        input: Value,
        mut resume: Option<&Value>,
    ) -> anyhow::Result<RunRecord> {
        let mut data = input;
        let mut outcome: anyhow::Result<RunRecord> = Ok(RunRecord::Succeeded(Value::Null));

        for (index, step) in self.steps.iter().enumerate().skip(start) {
            debug!(workflow = %self.id, step = step.id(), "running step");
            match step.run(data.clone(), resume.take()).await {
                Ok(StepOutcome::Continue(output)) => data = output,
                Ok(StepOutcome::Suspend { payload, expects }) => {
                    outcome = Ok(RunRecord::Suspended {
                        step: index,
                        input: data.clone(),
                        payload,
                        expects,
                    });
                    break;
                }
                Err(e) => {
                    warn!(workflow = %self.id, step = step.id(), error = %e, "step failed");
                    outcome = Err(e.context(format!("step '{}' failed", step.id())));
                    break;
                }
            }
        }

        let record = match &outcome {
            Ok(RunRecord::Succeeded(_)) => RunRecord::Succeeded(data),
            Ok(other) => other.clone(),
            Err(e) => RunRecord::Failed(format!("{e:#}")),
        };
        self.runs
            .lock()
            .await
            .insert(run_id.to_string(), record.clone());
        outcome.map(|_| record)
    }

    fn output_for(&self, run_id: String, record: RunRecord) -> anyhow::Result<ResourceOutput> {
        match record {
            RunRecord::Succeeded(value) => Ok(ResourceOutput::Completed(render(&value))),
            RunRecord::Suspended {
                payload, expects, ..
            } => Ok(ResourceOutput::Suspended {
                run_id,
                payload,
                expects,
            }),
            RunRecord::Failed(error) => anyhow::bail!(error),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Invocable for Workflow {
    async fn invoke(&self, prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
        let input: Value = serde_json::from_str(prompt).map_err(|e| {
            anyhow::anyhow!("workflow '{}' expects JSON input matching its schema: {e}", self.id)
        })?;
        let (run_id, record) = self.start(input).await?;
        self.output_for(run_id, record)
    }

    async fn resume(
        &self,
        handle: &PendingRunHandle,
        confirmation: &Confirmation,
        _ctx: &InvocationContext,
    ) -> anyhow::Result<ResourceOutput> {
        let record = self
            .resume_run(&handle.run_id, &confirmation.to_value())
            .await?;
        self.output_for(handle.run_id.clone(), record)
    }
}
