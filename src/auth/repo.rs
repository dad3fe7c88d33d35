use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Unique constraint names declared in `migrations/0001_create_users.sql`.
const USERNAME_CONSTRAINT: &str = "uq_users_username";
const EMAIL_CONSTRAINT: &str = "uq_users_email";

/// Outcome of a failed insert. Duplicates are told apart so the caller can
/// name the conflicting field.
#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("email already taken")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Either the whole row is stored or nothing is.
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError>;

    /// Find a user by email, matched exactly as stored.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(classify_insert_error)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }
}

/// Map an insert failure to a duplicate variant by looking at the violated
/// constraint name, never at the message text.
fn classify_insert_error(err: sqlx::Error) -> CreateUserError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(USERNAME_CONSTRAINT) => return CreateUserError::DuplicateUsername,
                Some(EMAIL_CONSTRAINT) => return CreateUserError::DuplicateEmail,
                _ => {}
            }
        }
    }
    CreateUserError::Other(anyhow::Error::new(err).context("insert user"))
}

/// In-memory store with the same uniqueness rules as the `users` table.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryUserStore {
    users: std::sync::Mutex<Vec<User>>,
}

#[cfg(test)]
impl MemoryUserStore {
    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Vec<User>>> {
        self.users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store lock poisoned"))
    }
}

#[cfg(test)]
#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        let mut users = self.lock()?;
        if users.iter().any(|u| u.username == username) {
            return Err(CreateUserError::DuplicateUsername);
        }
        if users.iter().any(|u| u.email == email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            created_at: time::OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.iter().find(|u| u.id == id).cloned())
    }
}
