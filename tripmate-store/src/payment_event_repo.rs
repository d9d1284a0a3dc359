use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tripmate_core::payment::{PaymentEvent, PaymentEventStatus};
use tripmate_core::repository::PaymentEventRepository;
use tripmate_core::{CoreError, CoreResult};
use uuid::Uuid;

use crate::storage_error;

pub struct StorePaymentEventRepository {
    pool: PgPool,
}

impl StorePaymentEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentEventRow {
    id: Uuid,
    event_id: Option<String>,
    event_type: String,
    payload: Value,
    status: String,
    reason: Option<String>,
    request_id: Option<Uuid>,
    received_at: DateTime<Utc>,
}

impl TryFrom<PaymentEventRow> for PaymentEvent {
    type Error = CoreError;

    fn try_from(row: PaymentEventRow) -> Result<Self, Self::Error> {
        let status = PaymentEventStatus::parse(&row.status)
            .ok_or_else(|| CoreError::StorageError(format!("unknown payment event status {}", row.status)))?;
        Ok(PaymentEvent {
            id: row.id,
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            status,
            reason: row.reason,
            request_id: row.request_id,
            received_at: row.received_at,
        })
    }
}

const COLUMNS: &str = "id, event_id, event_type, payload, status, reason, request_id, received_at";

#[async_trait]
impl PaymentEventRepository for StorePaymentEventRepository {
    async fn record_event(&self, event: &PaymentEvent) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (id, event_id, event_type, payload, status, reason, request_id, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.event_id.as_deref())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.reason.as_deref())
        .bind(event.request_id)
        .bind(event.received_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn find_by_event_id(&self, event_id: &str) -> CoreResult<Option<PaymentEvent>> {
        let sql = format!(
            "SELECT {} FROM payment_events WHERE event_id = $1 ORDER BY received_at LIMIT 1",
            COLUMNS
        );
        let row: Option<PaymentEventRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(PaymentEvent::try_from).transpose()
    }

    async fn update_event_status(
        &self,
        id: Uuid,
        status: PaymentEventStatus,
        reason: Option<&str>,
        request_id: Option<Uuid>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_events
            SET status = $1, reason = $2, request_id = COALESCE($3, request_id)
            WHERE id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(request_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("payment event {}", id)));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: PaymentEventStatus) -> CoreResult<Vec<PaymentEvent>> {
        let sql = format!(
            "SELECT {} FROM payment_events WHERE status = $1 ORDER BY received_at DESC",
            COLUMNS
        );
        let rows: Vec<PaymentEventRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.into_iter().map(PaymentEvent::try_from).collect()
    }
}
