/// Decision log rows
///
/// Append-only record of denied authorization decisions and quota rejections.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE decision_log (
///     id BIGSERIAL PRIMARY KEY,
///     actor_id UUID,
///     action VARCHAR(64) NOT NULL,
///     resource_type VARCHAR(32) NOT NULL,
///     resource_id VARCHAR(64) NOT NULL,   -- 'unknown' when existence is hidden
///     reason VARCHAR(64) NOT NULL,
///     detail JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Page;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DecisionRecord {
    pub id: i64,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub reason: String,
    pub detail: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecisionRecord {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub reason: String,
    pub detail: JsonValue,
}

const DECISION_COLUMNS: &str =
    "id, actor_id, action, resource_type, resource_id, reason, detail, created_at";

impl DecisionRecord {
    pub async fn insert(
        db: impl PgExecutor<'_>,
        data: &NewDecisionRecord,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, DecisionRecord>(&format!(
            r#"
            INSERT INTO decision_log (actor_id, action, resource_type, resource_id, reason, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DECISION_COLUMNS}
            "#
        ))
        .bind(data.actor_id)
        .bind(&data.action)
        .bind(&data.resource_type)
        .bind(&data.resource_id)
        .bind(&data.reason)
        .bind(&data.detail)
        .fetch_one(db)
        .await
    }

    /// Newest first
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DecisionRecord>(&format!(
            "SELECT {DECISION_COLUMNS} FROM decision_log ORDER BY id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }

    /// Records written for one actor, newest first
    pub async fn list_by_actor(
        db: impl PgExecutor<'_>,
        actor_id: Uuid,
        page: Page,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DecisionRecord>(&format!(
            "SELECT {DECISION_COLUMNS} FROM decision_log WHERE actor_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(actor_id)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }
}
