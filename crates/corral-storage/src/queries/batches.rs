// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRUD operations for batch records.

use std::str::FromStr;

use corral_core::types::{BatchRecord, BatchStatus, ConversationKey, MessageRef, PendingMessage};
use corral_core::CoordinatorError;
use rusqlite::params;

use crate::database::Database;

/// Load the record for a conversation key. Returns `None` for unseen keys.
pub async fn load(
    db: &Database,
    key: &ConversationKey,
) -> Result<Option<BatchRecord>, CoordinatorError> {
    let key = key.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, pending, in_flight, batch_id, retry_count,
                        last_message_at, collecting_started_at, last_heartbeat,
                        last_error, reply_handle
                 FROM batches
                 WHERE conversation_key = ?1",
            )?;
            let result = stmt.query_row(params![key], row_to_record);
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist the full record for a key, inserting or replacing the row.
pub async fn save(
    db: &Database,
    key: &ConversationKey,
    record: &BatchRecord,
) -> Result<(), CoordinatorError> {
    let key = key.0.clone();
    let status = record.status.to_string();
    let pending = serde_json::to_string(&record.pending).map_err(CoordinatorError::storage)?;
    let in_flight = serde_json::to_string(&record.in_flight).map_err(CoordinatorError::storage)?;
    let batch_id = record.batch_id.clone();
    let retry_count = record.retry_count;
    let last_message_at = record.last_message_at;
    let collecting_started_at = record.collecting_started_at;
    let last_heartbeat = record.last_heartbeat;
    let last_error = record.last_error.clone();
    let reply_handle = record.reply_handle.as_ref().map(|r| r.0.clone());

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO batches (conversation_key, status, pending, in_flight,
                        batch_id, retry_count, last_message_at, collecting_started_at,
                        last_heartbeat, last_error, reply_handle, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(conversation_key) DO UPDATE SET
                        status = excluded.status,
                        pending = excluded.pending,
                        in_flight = excluded.in_flight,
                        batch_id = excluded.batch_id,
                        retry_count = excluded.retry_count,
                        last_message_at = excluded.last_message_at,
                        collecting_started_at = excluded.collecting_started_at,
                        last_heartbeat = excluded.last_heartbeat,
                        last_error = excluded.last_error,
                        reply_handle = excluded.reply_handle,
                        updated_at = excluded.updated_at",
                params![
                    key,
                    status,
                    pending,
                    in_flight,
                    batch_id,
                    retry_count,
                    last_message_at,
                    collecting_started_at,
                    last_heartbeat,
                    last_error,
                    reply_handle,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update only `last_heartbeat`, and only while the row still carries this
/// batch id.
///
/// The guard makes a beat from superseded work a no-op, so a slow
/// processor's liveness signal never overwrites state belonging to a newer
/// batch.
pub async fn touch_heartbeat(
    db: &Database,
    key: &ConversationKey,
    batch_id: &str,
    at_ms: i64,
) -> Result<(), CoordinatorError> {
    let key = key.0.clone();
    let batch_id = batch_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE batches SET last_heartbeat = ?1,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE conversation_key = ?2 AND batch_id = ?3",
                params![at_ms, key, batch_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List keys whose records are not idle, for startup recovery.
pub async fn list_active(db: &Database) -> Result<Vec<ConversationKey>, CoordinatorError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_key FROM batches
                 WHERE status != 'idle'
                 ORDER BY conversation_key ASC",
            )?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys.into_iter().map(ConversationKey).collect())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<BatchRecord, rusqlite::Error> {
    let status_text: String = row.get(0)?;
    let status = BatchStatus::from_str(&status_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let pending = json_column::<Vec<PendingMessage>>(row, 1)?;
    let in_flight = json_column::<Vec<PendingMessage>>(row, 2)?;

    Ok(BatchRecord {
        status,
        pending,
        in_flight,
        batch_id: row.get(3)?,
        retry_count: row.get(4)?,
        last_message_at: row.get(5)?,
        collecting_started_at: row.get(6)?,
        last_heartbeat: row.get(7)?,
        last_error: row.get(8)?,
        reply_handle: row.get::<_, Option<String>>(9)?.map(MessageRef),
    })
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
