//! The persistence boundary of the engine.
//!
//! A step record and all messages produced in that tick must be written
//! atomically; the engine retries a failed write once and then fails the
//! run. The trait is implemented by the `PostgreSQL` store in
//! `emotionsim-db` and by [`MemorySink`] for tests and ephemeral runs.

use std::collections::BTreeMap;

use emotionsim_types::{AgentSnapshot, MessageRecord, Run, RunId, StepRecord};

/// Errors surfaced by a persistence sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The store rejected or could not complete the write.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

/// Where the engine durably records run progress.
pub trait StepSink: Send {
    /// Atomically persist one step record and the tick's messages.
    fn persist_step(
        &mut self,
        run_id: RunId,
        record: &StepRecord,
        messages: &[MessageRecord],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Persist the run's current status, metrics, and evaluation.
    fn update_run(&mut self, run: &Run) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Persist the live agent snapshots (served by the control API).
    fn save_agents(
        &mut self,
        run_id: RunId,
        snapshots: &[AgentSnapshot],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// In-memory sink for tests and ephemeral runs.
///
/// Optionally injects a number of leading failures to exercise the
/// engine's retry-once policy.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Persisted step records per run, in order.
    pub steps: BTreeMap<RunId, Vec<StepRecord>>,
    /// Persisted messages per run, in order.
    pub messages: BTreeMap<RunId, Vec<MessageRecord>>,
    /// Latest persisted run rows.
    pub runs: BTreeMap<RunId, Run>,
    /// Latest persisted agent snapshots.
    pub agents: BTreeMap<RunId, Vec<AgentSnapshot>>,
    /// Number of upcoming `persist_step` calls that will fail.
    pub failures_remaining: u32,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink whose next `n` step writes fail.
    pub fn failing(n: u32) -> Self {
        Self {
            failures_remaining: n,
            ..Self::default()
        }
    }

    /// Number of steps persisted for a run.
    pub fn step_count(&self, run_id: RunId) -> usize {
        self.steps.get(&run_id).map_or(0, Vec::len)
    }
}

impl StepSink for MemorySink {
    async fn persist_step(
        &mut self,
        run_id: RunId,
        record: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), SinkError> {
        if self.failures_remaining > 0 {
            self.failures_remaining = self.failures_remaining.saturating_sub(1);
            return Err(SinkError::Unavailable("injected failure".to_owned()));
        }
        self.steps.entry(run_id).or_default().push(record.clone());
        self.messages
            .entry(run_id)
            .or_default()
            .extend(messages.iter().cloned());
        Ok(())
    }

    async fn update_run(&mut self, run: &Run) -> Result<(), SinkError> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn save_agents(
        &mut self,
        run_id: RunId,
        snapshots: &[AgentSnapshot],
    ) -> Result<(), SinkError> {
        self.agents.insert(run_id, snapshots.to_vec());
        Ok(())
    }
}
