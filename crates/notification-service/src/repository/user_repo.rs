//! 用户目录仓储
//!
//! 校友和学生存放在同一张 `users` 表中，通过 `role` 列区分。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::traits::UserRepositoryTrait;
use crate::error::Result;
use crate::models::{NotificationPreferences, PushTokenEntry, UserRecord, UserRole};

const USER_COLUMNS: &str = "id, role, first_name, last_name, email, is_active, push_token, \
                            preferences, last_active_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    role: UserRole,
    first_name: String,
    last_name: String,
    email: Option<String>,
    is_active: bool,
    push_token: Option<String>,
    preferences: Option<Json<NotificationPreferences>>,
    last_active_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            role: row.role,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            is_active: row.is_active,
            push_token: row.push_token,
            preferences: row.preferences.map(|p| p.0),
            last_active_at: row.last_active_at,
        }
    }
}

/// 用户目录仓储
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    pub async fn get_user(&self, user_id: &str, role: UserRole) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND role = $2");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    pub async fn find_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushTokenEntry>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let entries = sqlx::query_as::<_, PushTokenEntry>(
            r#"
            SELECT id, role, push_token
            FROM users
            WHERE id = ANY($1) AND push_token IS NOT NULL AND push_token <> ''
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn list_active_users(&self) -> Result<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE is_active = TRUE ORDER BY id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_reachable_user_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id
            FROM users
            WHERE is_active = TRUE
              AND push_token IS NOT NULL
              AND COALESCE((preferences -> 'push' ->> 'enabled')::BOOLEAN, TRUE)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // ==================== 写入操作 ====================

    pub async fn set_push_token(&self, user_id: &str, role: UserRole, token: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET push_token = $3, updated_at = NOW()
            WHERE id = $1 AND role = $2
            "#,
        )
        .bind(user_id)
        .bind(role)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_push_token(&self, user_id: &str, role: UserRole) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET push_token = NULL, updated_at = NOW()
            WHERE id = $1 AND role = $2 AND push_token IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_push_tokens(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE users
            SET push_token = NULL, updated_at = NOW()
            WHERE push_token = ANY($1)
            "#,
        )
        .bind(tokens)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserRepositoryTrait for UserRepository {
    async fn get_user(&self, user_id: &str, role: UserRole) -> Result<Option<UserRecord>> {
        self.get_user(user_id, role).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        self.find_user(user_id).await
    }

    async fn find_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushTokenEntry>> {
        self.find_push_tokens(user_ids).await
    }

    async fn set_push_token(&self, user_id: &str, role: UserRole, token: &str) -> Result<bool> {
        self.set_push_token(user_id, role, token).await
    }

    async fn clear_push_token(&self, user_id: &str, role: UserRole) -> Result<bool> {
        self.clear_push_token(user_id, role).await
    }

    async fn clear_push_tokens(&self, tokens: &[String]) -> Result<u64> {
        self.clear_push_tokens(tokens).await
    }

    async fn list_active_users(&self) -> Result<Vec<UserRecord>> {
        self.list_active_users().await
    }

    async fn list_reachable_user_ids(&self) -> Result<Vec<String>> {
        self.list_reachable_user_ids().await
    }
}
