//! `UserRepository` trait — the single persistence seam the bot core consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::profile::{UserField, UserId, UserRecord};

/// Backend-agnostic CRUD over user records, keyed by user id.
///
/// Records are never deleted through this interface.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch a user. Fails with `DatabaseError::NotFound` if absent.
    async fn get(&self, id: UserId) -> Result<UserRecord, DatabaseError>;

    /// Insert a new user. Fails with `DatabaseError::AlreadyExists` on duplicate id.
    async fn create(
        &self,
        id: UserId,
        name: Option<&str>,
        username: Option<&str>,
    ) -> Result<UserRecord, DatabaseError>;

    /// Set (or clear, with `None`) one field. Fails with `NotFound` if the user is absent.
    async fn update_field(
        &self,
        id: UserId,
        field: UserField,
        value: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Set several fields atomically: either all are written or none are.
    async fn update_fields(
        &self,
        id: UserId,
        fields: &[(UserField, &str)],
    ) -> Result<(), DatabaseError>;

    /// Every user except `excluding`, in stable enumeration order.
    async fn list_others(&self, excluding: UserId) -> Result<Vec<UserRecord>, DatabaseError>;

    /// Whether a record exists for `id`.
    async fn exists(&self, id: UserId) -> Result<bool, DatabaseError> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(DatabaseError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Store the subscription expiry.
    async fn set_vip_until(&self, id: UserId, until: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.update_field(id, UserField::VipUntil, Some(&until.to_rfc3339()))
            .await
    }
}
