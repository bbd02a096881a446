use crate::entities::{prelude::*, users};
use crate::services::upload::UploadError;
use crate::utils::keyed_mutex::KeyedMutex;
use dashmap::DashMap;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaUsage {
    pub used: i64,
    pub limit: i64,
    pub reserved: i64,
    pub percentage: f64,
}

/// Bytes held back for an upload that has not committed yet.
/// Dropping the reservation hands the bytes back.
#[derive(Debug)]
pub struct QuotaReservation {
    owner_id: String,
    bytes: i64,
    reservations: Arc<DashMap<String, i64>>,
}

impl QuotaReservation {
    pub fn bytes(&self) -> i64 {
        self.bytes
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if let Some(mut reserved) = self.reservations.get_mut(&self.owner_id) {
            *reserved -= self.bytes;
        }
        self.reservations
            .remove_if(&self.owner_id, |_, reserved| *reserved <= 0);
    }
}

/// Per-owner quota ledger: `storage_used`/`storage_limit` live in the `users` table,
/// in-flight reservations live in memory.
#[derive(Clone)]
pub struct QuotaService {
    db: DatabaseConnection,
    reservations: Arc<DashMap<String, i64>>,
    locks: KeyedMutex,
}

impl QuotaService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            reservations: Arc::new(DashMap::new()),
            locks: KeyedMutex::new(),
        }
    }

    pub async fn load_owner(&self, owner_id: &str) -> Result<users::Model, UploadError> {
        Users::find_by_id(owner_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| UploadError::UnknownOwner(owner_id.to_string()))
    }

    /// Holds `bytes` against the owner's limit until the returned guard is dropped.
    /// Fails with `QuotaExceeded` when `used + reserved + bytes > limit`.
    pub async fn reserve(
        &self,
        owner_id: &str,
        bytes: i64,
    ) -> Result<QuotaReservation, UploadError> {
        let _lock = self.locks.lock(owner_id).await;

        let owner = self.load_owner(owner_id).await?;
        let reserved = self.reserved(owner_id);
        let available = owner.storage_limit - owner.storage_used - reserved;

        if bytes > available {
            tracing::warn!(
                owner_id = %owner_id,
                requested = bytes,
                available,
                "Quota exceeded"
            );
            return Err(UploadError::QuotaExceeded {
                requested: bytes,
                available: available.max(0),
            });
        }

        *self
            .reservations
            .entry(owner_id.to_string())
            .or_insert(0) += bytes;

        Ok(QuotaReservation {
            owner_id: owner_id.to_string(),
            bytes,
            reservations: self.reservations.clone(),
        })
    }

    /// Runs `commit` under the owner's lock and releases `reservation` before unlocking,
    /// so no concurrent `reserve` sees the bytes as both used and reserved.
    pub async fn settle<T, E, F>(&self, reservation: QuotaReservation, commit: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let _lock = self.locks.lock(&reservation.owner_id).await;
        let result = commit.await;
        drop(reservation);
        result
    }

    pub fn reserved(&self, owner_id: &str) -> i64 {
        self.reservations
            .get(owner_id)
            .map(|reserved| *reserved)
            .unwrap_or(0)
    }

    pub async fn usage(&self, owner_id: &str) -> Result<QuotaUsage, UploadError> {
        let owner = self.load_owner(owner_id).await?;
        let percentage = if owner.storage_limit > 0 {
            owner.storage_used as f64 / owner.storage_limit as f64 * 100.0
        } else {
            0.0
        };

        Ok(QuotaUsage {
            used: owner.storage_used,
            limit: owner.storage_limit,
            reserved: self.reserved(owner_id),
            percentage,
        })
    }

    /// Adds committed bytes to `storage_used`. Run inside the record transaction.
    pub async fn increment<C: ConnectionTrait>(
        conn: &C,
        owner_id: &str,
        bytes: i64,
    ) -> Result<(), DbErr> {
        Users::update_many()
            .col_expr(
                users::Column::StorageUsed,
                Expr::col(users::Column::StorageUsed).add(bytes),
            )
            .filter(users::Column::Id.eq(owner_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Returns bytes of deleted objects to the owner.
    pub async fn decrement<C: ConnectionTrait>(
        conn: &C,
        owner_id: &str,
        bytes: i64,
    ) -> Result<(), DbErr> {
        Users::update_many()
            .col_expr(
                users::Column::StorageUsed,
                Expr::col(users::Column::StorageUsed).sub(bytes),
            )
            .filter(users::Column::Id.eq(owner_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub async fn reset<C: ConnectionTrait>(conn: &C, owner_id: &str) -> Result<(), DbErr> {
        Users::update_many()
            .col_expr(users::Column::StorageUsed, Expr::value(0i64))
            .filter(users::Column::Id.eq(owner_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Drops per-owner locks nobody is waiting on.
    pub fn prune_locks(&self) -> usize {
        self.locks.cleanup()
    }
}
