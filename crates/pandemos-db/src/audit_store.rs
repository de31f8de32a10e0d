//! Insert-only `PostgreSQL` mirror of the audit trail.
//!
//! Rows are never updated or deleted. Mirror writes are at-least-once
//! (a crashed engine may replay its last commit on restart), so both
//! inserts use `ON CONFLICT DO NOTHING` against their unique keys --
//! `tick_id` for ticks, `ref_id` for actions -- keeping replays harmless.

use sqlx::PgPool;

use pandemos_types::{ActionOutcome, ActionRecord, TickRecord};

use crate::error::DbError;

/// Operations on the `ticks` and `actions` tables.
pub struct AuditStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditStore<'a> {
    /// Create an audit store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert one committed tick record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    /// Returns [`DbError::Serialization`] if the diff or stats cannot be
    /// serialized.
    pub async fn insert_tick(&self, record: &TickRecord) -> Result<(), DbError> {
        let diff = serde_json::to_value(&record.diff)?;
        let stats = serde_json::to_value(record.stats)?;

        sqlx::query(
            r"INSERT INTO ticks (tick_id, seed, started_at, ended_at, diff, stats)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (tick_id) DO NOTHING",
        )
        .bind(i64::try_from(record.tick_id).unwrap_or(i64::MAX))
        // Seeds use the full u64 range; reinterpret the bits losslessly.
        .bind(i64::from_le_bytes(record.seed.to_le_bytes()))
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(&diff)
        .bind(&stats)
        .execute(self.pool)
        .await?;

        tracing::debug!(tick_id = record.tick_id, "Inserted tick record");
        Ok(())
    }

    /// Insert one evaluated action record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    /// Returns [`DbError::Serialization`] if the mix cannot be serialized.
    pub async fn insert_action(&self, record: &ActionRecord) -> Result<(), DbError> {
        let mix = serde_json::to_value(&record.mix)?;
        let outcome = match record.outcome {
            ActionOutcome::Success => "success",
            ActionOutcome::Fail => "fail",
        };

        sqlx::query(
            r"INSERT INTO actions (ref_id, player_id, region_id, mix, submitted_at,
                                   tick_applied, outcome, delta_applied,
                                   new_infection_level, proof)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
              ON CONFLICT (ref_id) DO NOTHING",
        )
        .bind(&record.ref_id)
        .bind(record.player_id.into_inner())
        .bind(record.region_id.as_str())
        .bind(&mix)
        .bind(record.submitted_at)
        .bind(i64::try_from(record.tick_applied).unwrap_or(i64::MAX))
        .bind(outcome)
        .bind(record.delta_applied)
        .bind(i32::from(record.new_infection_level))
        .bind(&record.proof)
        .execute(self.pool)
        .await?;

        tracing::debug!(ref_id = %record.ref_id, "Inserted action record");
        Ok(())
    }

    /// The highest mirrored tick id, or `None` on an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn last_tick_id(&self) -> Result<Option<u64>, DbError> {
        // MAX over an empty table yields one row holding NULL.
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(tick_id) FROM ticks")
            .fetch_one(self.pool)
            .await?;
        Ok(max.and_then(|id| u64::try_from(id).ok()))
    }
}
