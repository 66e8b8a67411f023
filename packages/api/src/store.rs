//! # Persistence Gateway
//!
//! The only writer of `users` and `scans` rows. Every operation checks a
//! connection out of the pool for its own duration; the handle is returned on
//! drop, whichever way the operation exits.

use crate::entity::{scan, user};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Schema, Set, SqlErr,
    TransactionTrait,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no user registered with email {0}")]
    UserNotFound(String),
    #[error("email {0} is already registered")]
    DuplicateUser(String),
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

/// Bounds of the connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub sqlx_logging: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(8),
            sqlx_logging: false,
        }
    }
}

/// Fields of a scan about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScan {
    pub prediction: String,
    pub confidence: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct ScanStore {
    db: DatabaseConnection,
}

impl ScanStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str, pool: &PoolOptions) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .connect_timeout(pool.connect_timeout)
            .sqlx_logging(pool.sqlx_logging);
        let db = Database::connect(opt).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Creates `users` and `scans` when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut users = schema.create_table_from_entity(user::Entity);
        let mut scans = schema.create_table_from_entity(scan::Entity);
        for stmt in [users.if_not_exists(), scans.if_not_exists()] {
            self.db.execute(backend.build(&*stmt)).await?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        Ok(found)
    }

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: String,
    ) -> Result<user::Model, StoreError> {
        if self.find_user_by_email(email).await?.is_some() {
            return Err(StoreError::DuplicateUser(email.to_string()));
        }

        let model = user::ActiveModel {
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };

        // A concurrent registration can still win between the check and the insert.
        model.insert(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                StoreError::DuplicateUser(email.to_string())
            }
            _ => StoreError::Storage(e),
        })
    }

    /// Resolves the email and inserts the scan in one transaction, so the user
    /// cannot disappear between lookup and insert. Nothing is written when the
    /// user is unknown or the insert fails.
    pub async fn save_scan(&self, user_email: &str, scan: NewScan) -> Result<i32, StoreError> {
        let txn = self.db.begin().await?;

        let owner = user::Entity::find()
            .filter(user::Column::Email.eq(user_email))
            .one(&txn)
            .await?;
        let Some(owner) = owner else {
            txn.rollback().await?;
            return Err(StoreError::UserNotFound(user_email.to_string()));
        };

        let model = scan::ActiveModel {
            user_id: Set(owner.id),
            prediction: Set(scan.prediction),
            confidence: Set(scan.confidence),
            recommendation: Set(scan.recommendation),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };

        match model.insert(&txn).await {
            Ok(saved) => {
                txn.commit().await?;
                tracing::debug!(scan_id = saved.id, user_id = owner.id, "scan saved");
                Ok(saved.id)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!("Rollback after failed scan insert failed: {}", rollback_err);
                }
                Err(StoreError::Storage(e))
            }
        }
    }

    /// Most recent first. An unknown email yields an empty history.
    pub async fn list_scans(&self, user_email: &str) -> Result<Vec<scan::Model>, StoreError> {
        let Some(owner) = self.find_user_by_email(user_email).await? else {
            return Ok(Vec::new());
        };

        let scans = scan::Entity::find()
            .filter(scan::Column::UserId.eq(owner.id))
            .order_by_desc(scan::Column::CreatedAt)
            .order_by_desc(scan::Column::Id)
            .all(&self.db)
            .await?;
        Ok(scans)
    }
}
