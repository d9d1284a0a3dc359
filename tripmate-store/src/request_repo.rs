use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tripmate_core::repository::RequestRepository;
use tripmate_core::{CoreError, CoreResult, TravelRequest};
use uuid::Uuid;

use crate::storage_error;

pub struct StoreRequestRepository {
    pool: PgPool,
}

impl StoreRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_where(&self, column: &str, value: &str) -> CoreResult<Vec<TravelRequest>> {
        let sql = format!(
            "SELECT document FROM travel_requests WHERE {} = $1 ORDER BY created_at DESC",
            column
        );
        let rows: Vec<Json<TravelRequest>> = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(|Json(request)| request).collect())
    }
}

#[async_trait]
impl RequestRepository for StoreRequestRepository {
    async fn insert_request(&self, request: &TravelRequest) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO travel_requests (id, traveler_id, guide_id, status, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(request.id)
        .bind(&request.traveler_id)
        .bind(request.guide_id.as_deref())
        .bind(request.status.as_str())
        .bind(request.version as i64)
        .bind(Json(request))
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!("request {} already exists", request.id)));
        }
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> CoreResult<Option<TravelRequest>> {
        let row: Option<Json<TravelRequest>> =
            sqlx::query_scalar("SELECT document FROM travel_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.map(|Json(request)| request))
    }

    async fn replace_request(&self, request: &TravelRequest) -> CoreResult<TravelRequest> {
        let mut next = request.clone();
        next.version = request.version + 1;
        next.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE travel_requests
            SET guide_id = $1, status = $2, version = $3, document = $4, updated_at = $5
            WHERE id = $6 AND version = $7
            "#,
        )
        .bind(next.guide_id.as_deref())
        .bind(next.status.as_str())
        .bind(next.version as i64)
        .bind(Json(&next))
        .bind(next.updated_at)
        .bind(request.id)
        .bind(request.version as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        match self.get_request(request.id).await? {
            Some(current) => Err(CoreError::Conflict(format!(
                "request {} is at version {}, write was based on {}",
                request.id, current.version, request.version
            ))),
            None => Err(CoreError::NotFound(format!("request {}", request.id))),
        }
    }

    async fn delete_request(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM travel_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("request {}", id)));
        }
        Ok(())
    }

    async fn list_by_traveler(&self, traveler_id: &str) -> CoreResult<Vec<TravelRequest>> {
        self.list_where("traveler_id", traveler_id).await
    }

    async fn list_by_guide(&self, guide_id: &str) -> CoreResult<Vec<TravelRequest>> {
        self.list_where("guide_id", guide_id).await
    }
}
