//! Best-effort reading telemetry and aggregate statistics.
//!
//! Nothing here ever returns an error: failures are logged and degrade to
//! a no-op or an empty answer so telemetry cannot disrupt reading.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::TableNames;
use crate::gateway::Gateway;
use crate::model::ReadingBehaviorRecord;

/// Reading duration recorded when the caller does not measure one.
pub const DEFAULT_READ_SECONDS: u32 = 60;

#[derive(Clone)]
pub struct BehaviorService {
    gateway: Arc<dyn Gateway>,
    tables: Arc<TableNames>,
}

impl BehaviorService {
    pub fn new(gateway: Arc<dyn Gateway>, tables: Arc<TableNames>) -> Self {
        Self { gateway, tables }
    }

    /// Record that a poem was read for `duration` seconds.
    pub async fn track_reading(&self, poem_id: i64, user_id: Option<String>, duration: u32) {
        let record = ReadingBehaviorRecord {
            user_id,
            poem_id,
            read_duration: duration,
            read_at: Utc::now(),
        };
        let row = match serde_json::to_value(&record) {
            Ok(row) => row,
            Err(e) => {
                warn!(poem_id, "failed to encode reading record: {e}");
                return;
            }
        };

        match self.gateway.insert(&self.tables.user_behavior, row).await {
            Ok(()) => debug!(poem_id, duration, "reading tracked"),
            Err(e) => warn!(poem_id, kind = ?e.kind, "failed to track reading: {}", e.detail),
        }
    }

    /// Per-dynasty aggregates, or an empty list when unavailable.
    pub async fn dynasty_statistics(&self) -> Vec<Value> {
        match self.gateway.rpc("get_dynasty_statistics", json!({})).await {
            Ok(Value::Array(rows)) => rows,
            Ok(Value::Null) => Vec::new(),
            Ok(other) => vec![other],
            Err(e) => {
                warn!(kind = ?e.kind, "failed to load dynasty statistics: {}", e.detail);
                Vec::new()
            }
        }
    }

    /// Aggregates for one poet, or `None` when unavailable.
    pub async fn poet_statistics(&self, poet_id: i64) -> Option<Value> {
        match self
            .gateway
            .rpc("get_poet_statistics", json!({ "poet_id": poet_id }))
            .await
        {
            Ok(Value::Null) => None,
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(poet_id, kind = ?e.kind, "failed to load poet statistics: {}", e.detail);
                None
            }
        }
    }
}
