//! The relational store: runs, agents, steps, and messages.
//!
//! A step record and all messages from the same tick are written in one
//! transaction; partial persistence is forbidden. On startup,
//! [`SimStore::recover_interrupted_runs`] resets any run left in
//! `running` to `paused` with `current_step` set to its last persisted
//! step, so a crashed process resumes cleanly.
//!
//! Queries use plain `sqlx::query` with bind parameters so the crate
//! compiles without a live database.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use emotionsim_core::{SinkError, StepSink};
use emotionsim_types::{
    AgentId, AgentSnapshot, MessageRecord, MessageType, Run, RunId, RunMetrics, RunStatus,
    Scenario, ScenarioId, StepMetrics, StepRecord,
};

use crate::error::DbError;

/// Connection settings for the store.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PostgresConfig {
    /// Connection URL.
    pub url: String,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Default pool size.
const fn default_max_connections() -> u32 {
    5
}

/// Schema bootstrap statements, applied idempotently.
const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS scenarios (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        definition JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    r"CREATE TABLE IF NOT EXISTS runs (
        id UUID PRIMARY KEY,
        scenario_id UUID NOT NULL,
        status TEXT NOT NULL,
        current_step BIGINT NOT NULL,
        max_steps BIGINT NOT NULL,
        seed BIGINT,
        world_state JSONB NOT NULL,
        metrics JSONB NOT NULL,
        evaluation JSONB,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS run_agents (
        run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
        agent_id UUID NOT NULL,
        snapshot JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (run_id, agent_id)
    )",
    r"CREATE TABLE IF NOT EXISTS steps (
        run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
        step_index BIGINT NOT NULL,
        world_state JSONB NOT NULL,
        actions JSONB NOT NULL,
        metrics JSONB NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (run_id, step_index)
    )",
    r"CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
        from_agent UUID NOT NULL,
        to_target TEXT NOT NULL,
        message_type TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata JSONB NOT NULL,
        step_index BIGINT NOT NULL,
        seq BIGINT NOT NULL,
        sent_at TIMESTAMPTZ NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS messages_run_order
        ON messages (run_id, step_index, seq)",
];

/// Reinterpret a seed for a signed `BIGINT` column (lossless round-trip).
const fn seed_to_db(seed: u64) -> i64 {
    i64::from_le_bytes(seed.to_le_bytes())
}

/// Reverse of [`seed_to_db`].
const fn seed_from_db(raw: i64) -> u64 {
    u64::from_le_bytes(raw.to_le_bytes())
}

/// Clamp a step counter for a `BIGINT` column.
fn step_to_db(step: u64) -> i64 {
    i64::try_from(step).unwrap_or(i64::MAX)
}

/// Parse a stored status string.
fn status_from_db(raw: &str) -> Result<RunStatus, DbError> {
    match raw {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "paused" => Ok(RunStatus::Paused),
        "completed" => Ok(RunStatus::Completed),
        "stopped" => Ok(RunStatus::Stopped),
        "cancelled" => Ok(RunStatus::Cancelled),
        "error" => Ok(RunStatus::Error),
        other => Err(DbError::CorruptRow(format!("unknown run status {other:?}"))),
    }
}

/// Parse a stored message type string.
fn message_type_from_db(raw: &str) -> Result<MessageType, DbError> {
    match raw {
        "direct" => Ok(MessageType::Direct),
        "room" => Ok(MessageType::Room),
        "broadcast" => Ok(MessageType::Broadcast),
        other => Err(DbError::CorruptRow(format!(
            "unknown message type {other:?}"
        ))),
    }
}

/// Encode a message type for storage.
const fn message_type_to_db(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Direct => "direct",
        MessageType::Room => "room",
        MessageType::Broadcast => "broadcast",
    }
}

/// The `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct SimStore {
    pool: PgPool,
}

impl SimStore {
    /// Connect eagerly, failing fast when the database is unreachable.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect lazily; the first query establishes the connection.
    pub fn connect_lazy(config: &PostgresConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    /// Apply the idempotent schema bootstrap.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("schema ensured");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    /// Insert or replace a scenario definition.
    pub async fn upsert_scenario(&self, scenario: &Scenario) -> Result<(), DbError> {
        let definition = serde_json::to_value(scenario)?;
        sqlx::query(
            r"INSERT INTO scenarios (id, name, definition)
              VALUES ($1, $2, $3)
              ON CONFLICT (id) DO UPDATE SET name = $2, definition = $3",
        )
        .bind(scenario.id.into_inner())
        .bind(&scenario.name)
        .bind(definition)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a scenario definition.
    pub async fn get_scenario(&self, id: ScenarioId) -> Result<Option<Scenario>, DbError> {
        let row = sqlx::query(r"SELECT definition FROM scenarios WHERE id = $1")
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let definition: serde_json::Value = row.try_get("definition")?;
            Ok(serde_json::from_value(definition)?)
        })
        .transpose()
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a freshly created run row.
    pub async fn insert_run(&self, run: &Run) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO runs (id, scenario_id, status, current_step, max_steps, seed,
                                world_state, metrics, evaluation, created_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(run.id.into_inner())
        .bind(run.scenario_id.into_inner())
        .bind(run.status.to_string())
        .bind(step_to_db(run.current_step))
        .bind(step_to_db(run.max_steps))
        .bind(run.seed.map(seed_to_db))
        .bind(&run.world_state)
        .bind(serde_json::to_value(&run.metrics)?)
        .bind(&run.evaluation)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update a run's mutable columns.
    pub async fn update_run_row(&self, run: &Run) -> Result<(), DbError> {
        sqlx::query(
            r"UPDATE runs SET status = $2, current_step = $3, world_state = $4,
                              metrics = $5, evaluation = $6, updated_at = $7
              WHERE id = $1",
        )
        .bind(run.id.into_inner())
        .bind(run.status.to_string())
        .bind(step_to_db(run.current_step))
        .bind(&run.world_state)
        .bind(serde_json::to_value(&run.metrics)?)
        .bind(&run.evaluation)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load one run.
    pub async fn get_run(&self, id: RunId) -> Result<Option<Run>, DbError> {
        let row = sqlx::query(
            r"SELECT id, scenario_id, status, current_step, max_steps, seed,
                     world_state, metrics, evaluation, created_at, updated_at
              FROM runs WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| run_from_row(&row)).transpose()
    }

    /// List runs, newest first, optionally filtered by scenario.
    pub async fn list_runs(
        &self,
        scenario: Option<ScenarioId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>, DbError> {
        let rows = match scenario {
            Some(scenario_id) => {
                sqlx::query(
                    r"SELECT id, scenario_id, status, current_step, max_steps, seed,
                             world_state, metrics, evaluation, created_at, updated_at
                      FROM runs WHERE scenario_id = $1
                      ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(scenario_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"SELECT id, scenario_id, status, current_step, max_steps, seed,
                             world_state, metrics, evaluation, created_at, updated_at
                      FROM runs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(run_from_row).collect()
    }

    /// Reset `running` runs to `paused` after a restart; `current_step`
    /// becomes the last persisted step.
    ///
    /// Returns how many runs were recovered.
    pub async fn recover_interrupted_runs(&self) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"UPDATE runs SET
                  status = 'paused',
                  current_step = COALESCE(
                      (SELECT MAX(step_index) FROM steps WHERE steps.run_id = runs.id), 0),
                  updated_at = now()
              WHERE status = 'running'",
        )
        .execute(&self.pool)
        .await?;
        let recovered = result.rows_affected();
        if recovered > 0 {
            tracing::info!(recovered, "reset interrupted runs to paused");
        }
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Upsert the live snapshots of a run's agents.
    pub async fn save_agent_snapshots(
        &self,
        run_id: RunId,
        snapshots: &[AgentSnapshot],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            sqlx::query(
                r"INSERT INTO run_agents (run_id, agent_id, snapshot, updated_at)
                  VALUES ($1, $2, $3, now())
                  ON CONFLICT (run_id, agent_id) DO UPDATE
                  SET snapshot = $3, updated_at = now()",
            )
            .bind(run_id.into_inner())
            .bind(snapshot.id.into_inner())
            .bind(serde_json::to_value(snapshot)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load the persisted agent snapshots of a run.
    pub async fn list_agent_snapshots(&self, run_id: RunId) -> Result<Vec<AgentSnapshot>, DbError> {
        let rows = sqlx::query(
            r"SELECT snapshot FROM run_agents WHERE run_id = $1 ORDER BY agent_id",
        )
        .bind(run_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let snapshot: serde_json::Value = row.try_get("snapshot")?;
                Ok(serde_json::from_value(snapshot)?)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Steps & messages
    // -----------------------------------------------------------------------

    /// Atomically persist one step record and its messages.
    pub async fn persist_step_tx(
        &self,
        run_id: RunId,
        record: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO steps (run_id, step_index, world_state, actions, metrics, recorded_at)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (run_id, step_index) DO NOTHING",
        )
        .bind(run_id.into_inner())
        .bind(step_to_db(record.step_index))
        .bind(&record.world_state)
        .bind(serde_json::to_value(&record.actions)?)
        .bind(serde_json::to_value(record.metrics)?)
        .bind(record.recorded_at)
        .execute(&mut *tx)
        .await?;

        for message in messages {
            sqlx::query(
                r"INSERT INTO messages (id, run_id, from_agent, to_target, message_type,
                                        content, metadata, step_index, seq, sent_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                  ON CONFLICT (id) DO NOTHING",
            )
            .bind(message.id.into_inner())
            .bind(run_id.into_inner())
            .bind(message.from_agent.into_inner())
            .bind(&message.to_target)
            .bind(message_type_to_db(message.message_type))
            .bind(&message.content)
            .bind(&message.metadata)
            .bind(step_to_db(message.step_index))
            .bind(step_to_db(message.seq))
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(run = %run_id, step = record.step_index, messages = messages.len(), "step persisted");
        Ok(())
    }

    /// List step records chronologically.
    pub async fn list_steps(
        &self,
        run_id: RunId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StepRecord>, DbError> {
        let rows = sqlx::query(
            r"SELECT step_index, world_state, actions, metrics, recorded_at
              FROM steps WHERE run_id = $1
              ORDER BY step_index ASC LIMIT $2 OFFSET $3",
        )
        .bind(run_id.into_inner())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let step_index: i64 = row.try_get("step_index")?;
                let actions: serde_json::Value = row.try_get("actions")?;
                let metrics: serde_json::Value = row.try_get("metrics")?;
                Ok(StepRecord {
                    step_index: u64::try_from(step_index).unwrap_or(0),
                    world_state: row.try_get("world_state")?,
                    actions: serde_json::from_value(actions)?,
                    metrics: serde_json::from_value::<StepMetrics>(metrics)?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    /// List messages chronologically, optionally filtered by sender.
    pub async fn list_messages(
        &self,
        run_id: RunId,
        agent: Option<AgentId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let rows = match agent {
            Some(agent_id) => {
                sqlx::query(
                    r"SELECT id, from_agent, to_target, message_type, content, metadata,
                             step_index, seq, sent_at
                      FROM messages WHERE run_id = $1 AND from_agent = $2
                      ORDER BY step_index ASC, seq ASC LIMIT $3 OFFSET $4",
                )
                .bind(run_id.into_inner())
                .bind(agent_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"SELECT id, from_agent, to_target, message_type, content, metadata,
                             step_index, seq, sent_at
                      FROM messages WHERE run_id = $1
                      ORDER BY step_index ASC, seq ASC LIMIT $2 OFFSET $3",
                )
                .bind(run_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let from_agent: Uuid = row.try_get("from_agent")?;
                let message_type: String = row.try_get("message_type")?;
                let step_index: i64 = row.try_get("step_index")?;
                let seq: i64 = row.try_get("seq")?;
                Ok(MessageRecord {
                    id: id.into(),
                    from_agent: from_agent.into(),
                    to_target: row.try_get("to_target")?,
                    message_type: message_type_from_db(&message_type)?,
                    content: row.try_get("content")?,
                    metadata: row.try_get("metadata")?,
                    step_index: u64::try_from(step_index).unwrap_or(0),
                    seq: u64::try_from(seq).unwrap_or(0),
                    timestamp: row.try_get("sent_at")?,
                })
            })
            .collect()
    }
}

/// Decode one `runs` row.
fn run_from_row(row: &sqlx::postgres::PgRow) -> Result<Run, DbError> {
    let id: Uuid = row.try_get("id")?;
    let scenario_id: Uuid = row.try_get("scenario_id")?;
    let status: String = row.try_get("status")?;
    let current_step: i64 = row.try_get("current_step")?;
    let max_steps: i64 = row.try_get("max_steps")?;
    let seed: Option<i64> = row.try_get("seed")?;
    let metrics: serde_json::Value = row.try_get("metrics")?;
    Ok(Run {
        id: id.into(),
        scenario_id: scenario_id.into(),
        status: status_from_db(&status)?,
        current_step: u64::try_from(current_step).unwrap_or(0),
        max_steps: u64::try_from(max_steps).unwrap_or(0),
        seed: seed.map(seed_from_db),
        world_state: row.try_get("world_state")?,
        metrics: serde_json::from_value::<RunMetrics>(metrics)?,
        evaluation: row.try_get("evaluation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl StepSink for SimStore {
    async fn persist_step(
        &mut self,
        run_id: RunId,
        record: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), SinkError> {
        self.persist_step_tx(run_id, record, messages)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }

    async fn update_run(&mut self, run: &Run) -> Result<(), SinkError> {
        self.update_run_row(run)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }

    async fn save_agents(
        &mut self,
        run_id: RunId,
        snapshots: &[AgentSnapshot],
    ) -> Result<(), SinkError> {
        self.save_agent_snapshots(run_id, snapshots)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}
