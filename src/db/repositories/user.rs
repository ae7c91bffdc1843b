use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};
use tokio::task;

use crate::auth::password::{hash_password, verify_password};
use crate::config::SecurityConfig;
use crate::entities::users;

/// User data returned from the repository (without the password hash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub group: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            username: model.username,
            group: model.group,
            is_active: model.is_active,
            is_superuser: model.is_superuser,
        }
    }
}

/// Input for creating a user. The password is hashed inside the repository;
/// plaintext never reaches the database.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub group: String,
    pub password: String,
    pub is_superuser: bool,
    pub is_active: bool,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a new user.
    ///
    /// Returns `None` when the email is already registered. The unique
    /// constraint on the email column settles concurrent registrations:
    /// one insert lands, the other surfaces here as a conflict.
    pub async fn create(&self, new: &NewUser, security: &SecurityConfig) -> Result<Option<User>> {
        let password = new.password.clone();
        let security = security.clone();

        // Argon2 hashing is CPU-intensive; keep it off the async runtime.
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let active = users::ActiveModel {
            email: Set(new.email.clone()),
            username: Set(new.username.clone()),
            group: Set(new.group.clone()),
            password_hash: Set(password_hash),
            is_active: Set(new.is_active),
            is_superuser: Set(new.is_superuser),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(Some(model.into())),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(None),
                _ => Err(err).context("Failed to insert user"),
            },
        }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn exists(&self, id: i32) -> Result<bool> {
        Ok(self.get_by_id(id).await?.is_some())
    }

    /// Page of users ordered by id ascending (insertion order).
    pub async fn list(&self, skip: u64, limit: u64) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Verify a password for the account registered under `email`.
    ///
    /// Missing accounts, deactivated accounts and wrong passwords all
    /// come back `false`; callers cannot tell which addresses exist.
    /// The hash never leaves this repository.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        if !user.is_active {
            return Ok(false);
        }

        let password_hash = user.password_hash;
        let password = password.to_string();

        // Argon2 verification is CPU-intensive; run it on a blocking thread.
        let is_valid = task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .context("Password verification task panicked")?;

        Ok(is_valid)
    }

    /// Delete by id; `false` when no row matched.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = users::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected > 0)
    }
}
