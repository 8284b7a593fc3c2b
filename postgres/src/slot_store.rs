//! `PostgreSQL` slot store.

use crate::sql::{RETURNED_COLUMNS, push_patch, push_precondition};
use chrono::{DateTime, Utc};
use dojo_scheduler_core::cohort::SessionType;
use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::slot::{Participant, Slot, SlotId, SlotStatus};
use dojo_scheduler_core::store::{
    Page, PageToken, Precondition, ScanRequest, SlotPatch, SlotStore, StoreFuture,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::BTreeMap;

pub(crate) fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// One row of `slots` as read back from the database.
#[derive(FromRow)]
pub(crate) struct SlotRow {
    id: String,
    body: Json<Slot>,
    status: String,
    participants: Json<BTreeMap<String, Participant>>,
    booked_start_time: Option<DateTime<Utc>>,
    booked_type: Option<String>,
    expiration_time: Option<DateTime<Utc>>,
}

impl SlotRow {
    /// Overlay the mutable columns on the stored body.
    fn into_slot(self) -> Result<Slot, StoreError> {
        let mut slot = self.body.0;
        slot.id = SlotId::new(self.id);
        slot.status = SlotStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status `{}`", self.status)))?;
        slot.participants = self.participants.0;
        slot.booked_start_time = self.booked_start_time;
        slot.booked_type = self
            .booked_type
            .map(|raw| {
                SessionType::parse(&raw).ok_or_else(|| {
                    StoreError::Serialization(format!("unknown session type `{raw}`"))
                })
            })
            .transpose()?;
        slot.expiration_time = self.expiration_time;
        Ok(slot)
    }
}

fn into_slot(row: Option<SlotRow>) -> Result<Option<Slot>, StoreError> {
    row.map(SlotRow::into_slot).transpose()
}

/// [`SlotStore`] backed by a `slots` table.
///
/// Each conditional write is a single `UPDATE`, `DELETE` or
/// `INSERT ... ON CONFLICT` whose `WHERE` clause is the rendered
/// precondition. When no row comes back the store checks whether the record
/// exists so callers can tell a vanished slot from a changed one.
///
/// # Example
///
/// ```no_run
/// use dojo_scheduler_postgres::PostgresSlotStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresSlotStore::connect("postgres://localhost/dojo", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresSlotStore {
    pool: PgPool,
}

impl PostgresSlotStore {
    /// Create a store from an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations (slots and the legacy mirror tables).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, id: &SlotId) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM slots WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)
    }

    /// Build the error for a write whose guard matched no row.
    async fn rejected(&self, id: SlotId, op: &'static str) -> StoreError {
        let exists = match self.exists(&id).await {
            Ok(exists) => exists,
            Err(e) => return e,
        };
        metrics::counter!("slot_store.precondition_failed", "op" => op).increment(1);
        tracing::debug!(slot_id = %id, exists, op, "Precondition did not hold");
        StoreError::PreconditionFailed { id, exists }
    }

    async fn fetch(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        let row: Option<SlotRow> = sqlx::query_as(&format!(
            "SELECT {RETURNED_COLUMNS} FROM slots WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;
        into_slot(row)
    }

    async fn write(
        &self,
        slot: Slot,
        precondition: Option<Precondition>,
    ) -> Result<Slot, StoreError> {
        let id = slot.id.clone();
        let max_participants = i32::try_from(slot.max_participants)
            .map_err(|_| StoreError::Serialization("maxParticipants out of range".to_string()))?;
        let may_insert = precondition.as_ref().is_none_or(|p| p.evaluate(None));

        let mut qb = QueryBuilder::<Postgres>::new("");
        if may_insert {
            qb.push(
                "INSERT INTO slots (id, kind, owner, status, start_time, end_time, expiration_time, \
                 max_participants, participants, booked_start_time, booked_type, body) VALUES (",
            );
            let mut values = qb.separated(", ");
            values.push_bind(slot.id.as_str().to_string());
            values.push_bind(slot.kind.as_str());
            values.push_bind(slot.owner.clone());
            values.push_bind(slot.status.as_str());
            values.push_bind(slot.start_time);
            values.push_bind(slot.end_time);
            values.push_bind(slot.expiration_time);
            values.push_bind(max_participants);
            values.push_bind(Json(slot.participants.clone()));
            values.push_bind(slot.booked_start_time);
            values.push_bind(slot.booked_type.map(|t| t.as_str()));
            values.push_bind(Json(slot.clone()));
            qb.push(
                ") ON CONFLICT (id) DO UPDATE SET kind = EXCLUDED.kind, owner = EXCLUDED.owner, \
                 status = EXCLUDED.status, start_time = EXCLUDED.start_time, \
                 end_time = EXCLUDED.end_time, expiration_time = EXCLUDED.expiration_time, \
                 max_participants = EXCLUDED.max_participants, participants = EXCLUDED.participants, \
                 booked_start_time = EXCLUDED.booked_start_time, booked_type = EXCLUDED.booked_type, \
                 body = EXCLUDED.body, updated_at = now()",
            );
            if let Some(precondition) = &precondition {
                qb.push(" WHERE ");
                push_precondition(&mut qb, "slots", precondition);
            }
        } else {
            qb.push("UPDATE slots SET kind = ");
            qb.push_bind(slot.kind.as_str());
            qb.push(", owner = ");
            qb.push_bind(slot.owner.clone());
            qb.push(", status = ");
            qb.push_bind(slot.status.as_str());
            qb.push(", start_time = ");
            qb.push_bind(slot.start_time);
            qb.push(", end_time = ");
            qb.push_bind(slot.end_time);
            qb.push(", expiration_time = ");
            qb.push_bind(slot.expiration_time);
            qb.push(", max_participants = ");
            qb.push_bind(max_participants);
            qb.push(", participants = ");
            qb.push_bind(Json(slot.participants.clone()));
            qb.push(", booked_start_time = ");
            qb.push_bind(slot.booked_start_time);
            qb.push(", booked_type = ");
            qb.push_bind(slot.booked_type.map(|t| t.as_str()));
            qb.push(", body = ");
            qb.push_bind(Json(slot.clone()));
            qb.push(", updated_at = now() WHERE id = ");
            qb.push_bind(slot.id.as_str().to_string());
            if let Some(precondition) = &precondition {
                qb.push(" AND ");
                push_precondition(&mut qb, "slots", precondition);
            }
        }
        qb.push(format!(" RETURNING {RETURNED_COLUMNS}"));

        let row: Option<SlotRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        match into_slot(row)? {
            Some(written) => Ok(written),
            None => Err(self.rejected(id, "put").await),
        }
    }

    async fn remove(
        &self,
        id: SlotId,
        precondition: Option<Precondition>,
    ) -> Result<Option<Slot>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM slots WHERE id = ");
        qb.push_bind(id.as_str().to_string());
        if let Some(precondition) = &precondition {
            qb.push(" AND ");
            push_precondition(&mut qb, "slots", precondition);
        }
        qb.push(format!(" RETURNING {RETURNED_COLUMNS}"));

        let row: Option<SlotRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        if let Some(deleted) = into_slot(row)? {
            return Ok(Some(deleted));
        }
        let Some(precondition) = precondition else {
            return Ok(None);
        };
        if precondition.evaluate(None) && !self.exists(&id).await? {
            return Ok(None);
        }
        Err(self.rejected(id, "delete").await)
    }

    async fn update(
        &self,
        id: SlotId,
        patch: SlotPatch,
        precondition: Precondition,
    ) -> Result<Slot, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE slots SET ");
        push_patch(&mut qb, &patch);
        qb.push(" WHERE id = ");
        qb.push_bind(id.as_str().to_string());
        qb.push(" AND ");
        push_precondition(&mut qb, "slots", &precondition);
        qb.push(format!(" RETURNING {RETURNED_COLUMNS}"));

        let row: Option<SlotRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        match into_slot(row)? {
            Some(updated) => Ok(updated),
            None => Err(self.rejected(id, "conditional_update").await),
        }
    }

    async fn scan_page(&self, request: ScanRequest) -> Result<Page, StoreError> {
        let after = request.start_after.as_ref().map(PageToken::last_id).transpose()?;
        let limit = request.limit.max(1);

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {RETURNED_COLUMNS} FROM slots WHERE TRUE"
        ));
        if let Some(ends_after) = request.ends_after {
            qb.push(" AND end_time >= ");
            qb.push_bind(ends_after);
        }
        if let Some(after) = &after {
            qb.push(" AND id > ");
            qb.push_bind(after.as_str().to_string());
        }
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(i64::try_from(limit + 1).unwrap_or(i64::MAX));

        let rows: Vec<SlotRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        let more = rows.len() > limit;
        let slots = rows
            .into_iter()
            .take(limit)
            .map(SlotRow::into_slot)
            .collect::<Result<Vec<_>, _>>()?;
        let next = if more {
            slots.last().map(|slot| PageToken::after(&slot.id))
        } else {
            None
        };
        Ok(Page { slots, next })
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM slots WHERE expiration_time IS NOT NULL AND expiration_time <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(result.rows_affected())
    }
}

impl SlotStore for PostgresSlotStore {
    fn get(&self, id: SlotId) -> StoreFuture<'_, Option<Slot>> {
        Box::pin(self.fetch(id))
    }

    fn put(&self, slot: Slot, precondition: Option<Precondition>) -> StoreFuture<'_, Slot> {
        Box::pin(self.write(slot, precondition))
    }

    fn delete(
        &self,
        id: SlotId,
        precondition: Option<Precondition>,
    ) -> StoreFuture<'_, Option<Slot>> {
        Box::pin(self.remove(id, precondition))
    }

    fn conditional_update(
        &self,
        id: SlotId,
        patch: SlotPatch,
        precondition: Precondition,
    ) -> StoreFuture<'_, Slot> {
        Box::pin(self.update(id, patch, precondition))
    }

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page> {
        Box::pin(self.scan_page(request))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(self.purge(now))
    }
}
