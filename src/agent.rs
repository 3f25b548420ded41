use std::time::Instant;

use async_trait::async_trait;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::action::ActionResult;
use crate::registry::Registry;
use crate::session::{BrowserSession, SessionError, Snapshot};

// ========================= Core Types =========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Act { action: String, params: Value },
    Done { text: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub plan: String,
    pub decision: Decision,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Memory {
    pub run_id: String,
    pub notes: Vec<String>,
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum AgentError {
    #[error("session error: {0}")]
    Session(String),
    #[error("planner error: {0}")]
    Planner(String),
}

impl From<SessionError> for AgentError {
    fn from(e: SessionError) -> Self {
        AgentError::Session(e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
    StepBudgetExceeded,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StepLog {
    pub step: usize,
    pub plan: String,
    pub action: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub steps: Vec<StepLog>,
    pub message: Option<String>,
    pub time_ms: u128,
}

// ========================= Pluggable Subsystems =========================

#[async_trait]
pub trait Planner: Send + Sync {
    async fn think(
        &self,
        task: &str,
        memory: &Memory,
        snapshot: &Snapshot,
        last_error: Option<&str>,
    ) -> Result<Thought, AgentError>;
}

// ========================= Agent Core =========================

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_steps: usize,
    /// Consecutive failed steps tolerated before the run is abandoned.
    pub max_failures: usize,
    pub use_vision: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 50, max_failures: 3, use_vision: true }
    }
}

pub struct Agent<P: Planner> {
    planner: P,
    registry: Registry,
    cfg: AgentConfig,
}

impl<P: Planner> Agent<P> {
    pub fn new(planner: P, registry: Registry, cfg: AgentConfig) -> Self {
        Self { planner, registry, cfg }
    }

    /// Opens `start_url` (when given) and then steps until the planner reports
    /// done, the step budget runs out, or too many steps fail in a row.
    pub async fn run(
        &self,
        task: &str,
        start_url: Option<&str>,
        session: &dyn BrowserSession,
    ) -> Result<RunReport, AgentError> {
        let run_id = nanoid!();
        let start = Instant::now();
        let mut steps: Vec<StepLog> = Vec::new();
        let mut memory = Memory { run_id: run_id.clone(), notes: Vec::new() };
        let mut last_error: Option<String> = None;
        let mut failures = 0usize;

        info!(run_id = %run_id, max_steps = self.cfg.max_steps, "run started");

        if let Some(url) = start_url {
            session.current_page().await?.goto(url).await?;
        }

        for i in 0..self.cfg.max_steps {
            let mut step_log = StepLog {
                step: i,
                elapsed_ms: start.elapsed().as_millis(),
                ..Default::default()
            };

            // A page mid-navigation can fail to snapshot; that costs a step, not the run.
            let thought = match self.observe(session).await {
                Ok(snapshot) => self
                    .planner
                    .think(task, &memory, &snapshot, last_error.as_deref())
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(format!("could not observe the page: {e}")),
            };

            let outcome = match thought {
                Ok(thought) => {
                    info!(step = i, plan = %thought.plan, "agent step");
                    step_log.plan = thought.plan;
                    match thought.decision {
                        Decision::Done { text } => {
                            info!(step = i, "agent reported done: {}", text);
                            step_log.result = Some(text.clone());
                            steps.push(step_log);
                            return Ok(self.finish(run_id, start, steps, RunStatus::Success, Some(text)));
                        }
                        Decision::Act { action, params } => {
                            step_log.action = Some(action.clone());
                            self.registry
                                .execute(&action, params, session)
                                .await
                                .map_err(|e| e.to_string())
                        }
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    failures = 0;
                    last_error = None;
                    remember(&mut memory, &result);
                    info!(step = i, result = ?result.extracted_content, "action result");
                    step_log.result = result.extracted_content;
                }
                Err(err) => {
                    failures += 1;
                    warn!(step = i, failures, "step failed: {}", err);
                    step_log.error = Some(err.clone());
                    last_error = Some(err);
                }
            }
            steps.push(step_log);

            if failures > 0 && failures >= self.cfg.max_failures {
                let msg = format!("stopped after {failures} consecutive failures");
                return Ok(self.finish(run_id, start, steps, RunStatus::Failed, Some(msg)));
            }
        }

        Ok(self.finish(
            run_id,
            start,
            steps,
            RunStatus::StepBudgetExceeded,
            last_error.or_else(|| Some("Step budget exceeded".to_string())),
        ))
    }

    async fn observe(&self, session: &dyn BrowserSession) -> Result<Snapshot, SessionError> {
        session
            .current_page()
            .await?
            .snapshot(self.cfg.use_vision)
            .await
    }

    fn finish(
        &self,
        run_id: String,
        start: Instant,
        steps: Vec<StepLog>,
        status: RunStatus,
        message: Option<String>,
    ) -> RunReport {
        info!(run_id = %run_id, status = ?status, steps = steps.len(), "run finished");
        RunReport {
            run_id,
            status,
            steps,
            message,
            time_ms: start.elapsed().as_millis(),
        }
    }
}

fn remember(memory: &mut Memory, result: &ActionResult) {
    if !result.include_in_memory {
        return;
    }
    if let Some(content) = &result.extracted_content {
        memory.notes.push(content.clone());
    }
}
