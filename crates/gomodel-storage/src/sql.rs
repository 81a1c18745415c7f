use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, DatabaseConnection, EntityTrait, QueryFilter};
use time::OffsetDateTime;

use gomodel_common::AuditEntry;
use gomodel_usage::UsageEntry;

use crate::entities;
use crate::store::{LogStore, StoreError};

/// SQL-backed store shared by the usage and audit loggers. One connection
/// pool serves both record types.
#[derive(Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn backend_err(err: DbErr) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn usage_active(entry: &UsageEntry, now: OffsetDateTime) -> entities::usage_entries::ActiveModel {
    entities::usage_entries::ActiveModel {
        id: ActiveValue::NotSet,
        entry_id: ActiveValue::Set(entry.id),
        request_id: ActiveValue::Set(entry.request_id.clone()),
        provider_id: ActiveValue::Set(if entry.provider_id.is_empty() {
            None
        } else {
            Some(entry.provider_id.clone())
        }),
        at: ActiveValue::Set(entry.timestamp),
        model: ActiveValue::Set(entry.model.clone()),
        provider: ActiveValue::Set(entry.provider.clone()),
        endpoint: ActiveValue::Set(entry.endpoint.clone()),
        input_tokens: ActiveValue::Set(entry.input_tokens),
        output_tokens: ActiveValue::Set(entry.output_tokens),
        total_tokens: ActiveValue::Set(entry.total_tokens),
        input_cost: ActiveValue::Set(entry.input_cost),
        output_cost: ActiveValue::Set(entry.output_cost),
        total_cost: ActiveValue::Set(entry.total_cost),
        caveat: ActiveValue::Set(entry.caveat.clone()),
        raw_data: ActiveValue::Set(serde_json::to_value(&entry.raw_data).unwrap_or_default()),
        created_at: ActiveValue::Set(now),
    }
}

fn audit_active(entry: &AuditEntry, now: OffsetDateTime) -> entities::audit_entries::ActiveModel {
    entities::audit_entries::ActiveModel {
        id: ActiveValue::NotSet,
        entry_id: ActiveValue::Set(entry.id),
        at: ActiveValue::Set(entry.timestamp),
        duration_ns: ActiveValue::Set(entry.duration_ns),
        status_code: ActiveValue::Set(entry.status_code as i32),
        method: ActiveValue::Set(entry.method.clone()),
        path: ActiveValue::Set(entry.path.clone()),
        request_id: ActiveValue::Set(entry.request_id.clone()),
        api_key_hash: ActiveValue::Set(entry.data.api_key_hash.clone()),
        request_headers: ActiveValue::Set(
            entry
                .data
                .request_headers
                .as_ref()
                .and_then(|headers| serde_json::to_value(headers).ok()),
        ),
        request_body: ActiveValue::Set(entry.data.request_body.clone()),
        response_headers: ActiveValue::Set(
            entry
                .data
                .response_headers
                .as_ref()
                .and_then(|headers| serde_json::to_value(headers).ok()),
        ),
        response_body: ActiveValue::Set(entry.data.response_body.clone()),
        created_at: ActiveValue::Set(now),
    }
}

fn batch_outcome(total: usize, failed: usize) -> Result<(), StoreError> {
    if failed == 0 {
        Ok(())
    } else if failed < total {
        Err(StoreError::Partial { total, failed })
    } else {
        Err(StoreError::Backend(format!(
            "all {total} rows in batch failed"
        )))
    }
}

/// Batch insert with per-row fallback: a failed multi-insert degrades to
/// row-at-a-time so one bad row cannot sink the whole batch.
async fn insert_usage_rows(
    db: &DatabaseConnection,
    batch: &[UsageEntry],
    now: OffsetDateTime,
) -> Result<(), StoreError> {
    let total = batch.len();
    if total == 0 {
        return Ok(());
    }
    let rows = batch.iter().map(|entry| usage_active(entry, now));
    if entities::UsageEntries::insert_many(rows).exec(db).await.is_ok() {
        return Ok(());
    }
    let mut failed = 0usize;
    for entry in batch {
        if entities::UsageEntries::insert(usage_active(entry, now))
            .exec(db)
            .await
            .is_err()
        {
            failed += 1;
        }
    }
    batch_outcome(total, failed)
}

async fn insert_audit_rows(
    db: &DatabaseConnection,
    batch: &[AuditEntry],
    now: OffsetDateTime,
) -> Result<(), StoreError> {
    let total = batch.len();
    if total == 0 {
        return Ok(());
    }
    let rows = batch.iter().map(|entry| audit_active(entry, now));
    if entities::AuditEntries::insert_many(rows).exec(db).await.is_ok() {
        return Ok(());
    }
    let mut failed = 0usize;
    for entry in batch {
        if entities::AuditEntries::insert(audit_active(entry, now))
            .exec(db)
            .await
            .is_err()
        {
            failed += 1;
        }
    }
    batch_outcome(total, failed)
}

#[async_trait]
impl LogStore<UsageEntry> for SqlStore {
    async fn write_batch(&self, batch: Vec<UsageEntry>) -> Result<(), StoreError> {
        insert_usage_rows(&self.db, &batch, OffsetDateTime::now_utc()).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = entities::UsageEntries::delete_many()
            .filter(entities::usage_entries::Column::At.lt(cutoff))
            .exec(&self.db)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl LogStore<AuditEntry> for SqlStore {
    async fn write_batch(&self, batch: Vec<AuditEntry>) -> Result<(), StoreError> {
        insert_audit_rows(&self.db, &batch, OffsetDateTime::now_utc()).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = entities::AuditEntries::delete_many()
            .filter(entities::audit_entries::Column::At.lt(cutoff))
            .exec(&self.db)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected)
    }
}
