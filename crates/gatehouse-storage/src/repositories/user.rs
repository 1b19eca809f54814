#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{NewUser, User};
use chrono::Utc;
use gatehouse_core::{RegistrationKind, RegistrationUpdate, Uid};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    id, name, email, department, status,
    card_registered, fingerprint_registered, palm_registered, face_registered,
    card_number, face_api_id, zkteco_uid,
    created_at, updated_at, last_seen
"#;

/// Data access for dashboard users.
///
/// Uses native async trait methods; callers holding the concrete
/// [`SqliteUserRepository`] get `Send` futures.
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<User>>;

    async fn find_by_zkteco_uid(&self, uid: Uid) -> StorageResult<Option<User>>;

    async fn create(&self, user: &NewUser) -> StorageResult<User>;

    /// Record the uid the terminal assigned to this user.
    async fn set_zkteco_uid(&self, id: &str, uid: Option<Uid>) -> StorageResult<()>;

    /// Set one registration flag.
    ///
    /// For cards, a registration stores `card_number` when given and a
    /// deregistration clears it.
    async fn set_registration(
        &self,
        id: &str,
        kind: RegistrationKind,
        registered: bool,
        card_number: Option<&str>,
    ) -> StorageResult<User>;

    /// Apply a device-reported change to the user holding `update.uid`.
    async fn apply_registration(&self, update: &RegistrationUpdate) -> StorageResult<User>;

    async fn delete(&self, id: &str) -> StorageResult<()>;
}

/// SQLite implementation of [`UserRepository`]
#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require(&self, id: &str) -> StorageResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| StorageError::user_not_found("id", id))
    }

    fn check_affected(rows: u64, id: &str) -> StorageResult<()> {
        if rows == 0 {
            return Err(StorageError::user_not_found("id", id));
        }
        Ok(())
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_zkteco_uid(&self, uid: Uid) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE zkteco_uid = ?"
        ))
        .bind(i64::from(uid.get()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: &NewUser) -> StorageResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, department, zkteco_uid, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.department)
        .bind(user.zkteco_uid.map(|uid| i64::from(uid.get())))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(user_id = %id, name = %user.name, "User created");
        self.require(&id).await
    }

    async fn set_zkteco_uid(&self, id: &str, uid: Option<Uid>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET zkteco_uid = ?, updated_at = ? WHERE id = ?")
            .bind(uid.map(|uid| i64::from(uid.get())))
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::check_affected(result.rows_affected(), id)
    }

    async fn set_registration(
        &self,
        id: &str,
        kind: RegistrationKind,
        registered: bool,
        card_number: Option<&str>,
    ) -> StorageResult<User> {
        let now = Utc::now();
        let result = match kind {
            RegistrationKind::Card => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET card_registered = ?,
                        card_number = CASE WHEN ? THEN COALESCE(?, card_number) ELSE NULL END,
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(registered)
                .bind(registered)
                .bind(card_number)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            _ => {
                // Column names come from a closed enum.
                let sql = format!(
                    "UPDATE users SET {} = ?, updated_at = ? WHERE id = ?",
                    kind.column()
                );
                sqlx::query(&sql)
                    .bind(registered)
                    .bind(now)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        Self::check_affected(result.rows_affected(), id)?;
        debug!(user_id = %id, column = kind.column(), registered, "Registration updated");
        self.require(id).await
    }

    async fn apply_registration(&self, update: &RegistrationUpdate) -> StorageResult<User> {
        let user = self
            .find_by_zkteco_uid(update.uid)
            .await?
            .ok_or_else(|| StorageError::user_not_found("zkteco_uid", update.uid))?;

        self.set_registration(
            &user.id,
            update.kind,
            update.registered,
            update.card_number.as_deref(),
        )
        .await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::check_affected(result.rows_affected(), id)?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }
}
