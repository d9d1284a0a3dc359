use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tripmate_core::repository::UserRepository;
use tripmate_core::{CoreError, CoreResult, GuideProfile, Role, User};

use crate::storage_error;

pub struct StoreUserRepository {
    pool: PgPool,
}

impl StoreUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn missing_user(uid: &str) -> CoreError {
    CoreError::NotFound(format!("user {}", uid))
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    async fn insert_user(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (uid, role, document, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(&user.uid)
        .bind(user.role.as_str())
        .bind(Json(user))
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!("user {} already exists", user.uid)));
        }
        Ok(())
    }

    async fn update_profile(&self, user: &User) -> CoreResult<()> {
        // role is fixed at signup, so only the document changes; tokens keep their stored value
        let result = sqlx::query(
            r#"
            UPDATE users
            SET document = jsonb_set($1::jsonb, '{fcm_tokens}', COALESCE(document->'fcm_tokens', '[]'::jsonb))
            WHERE uid = $2
            "#,
        )
        .bind(Json(user))
        .bind(&user.uid)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(missing_user(&user.uid));
        }
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> CoreResult<Option<User>> {
        let row: Option<Json<User>> = sqlx::query_scalar("SELECT document FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(|Json(user)| user))
    }

    async fn list_users_by_role(&self, role: Role) -> CoreResult<Vec<User>> {
        let rows: Vec<Json<User>> =
            sqlx::query_scalar("SELECT document FROM users WHERE role = $1 ORDER BY created_at")
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(rows.into_iter().map(|Json(user)| user).collect())
    }

    async fn get_guide_profile(&self, uid: &str) -> CoreResult<Option<GuideProfile>> {
        let row: Option<Json<GuideProfile>> =
            sqlx::query_scalar("SELECT document FROM guide_profiles WHERE uid = $1")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.map(|Json(profile)| profile))
    }

    async fn save_guide_profile(&self, profile: &GuideProfile) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guide_profiles (uid, document, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (uid) DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.uid)
        .bind(Json(profile))
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn add_push_token(&self, uid: &str, token: &str) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET document = jsonb_set(
                document,
                '{fcm_tokens}',
                (
                    SELECT COALESCE(jsonb_agg(DISTINCT t ORDER BY t), '[]'::jsonb)
                    FROM jsonb_array_elements_text(
                        COALESCE(document->'fcm_tokens', '[]'::jsonb) || to_jsonb($2::text)
                    ) AS t
                )
            )
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(missing_user(uid));
        }
        Ok(())
    }

    async fn remove_push_token(&self, uid: &str, token: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET document = jsonb_set(document, '{fcm_tokens}', COALESCE(document->'fcm_tokens', '[]'::jsonb) - $2::text)
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn is_admin(&self, uid: &str) -> CoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM roles_admin WHERE uid = $1)")
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(exists)
    }
}
