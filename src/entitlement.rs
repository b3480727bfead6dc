//! Entitlement gate — time-bounded VIP access to paid capabilities.
//!
//! A user is entitled iff their stored `vip_until` is strictly later than now.
//! There is no separate entitlement storage; one-off purchases are consumed
//! at confirmation time and never recorded as standing access.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::DatabaseError;
use crate::payments::CatalogItem;
use crate::profile::{UserId, UserRecord};
use crate::store::UserRepository;

/// Default subscription length.
pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// A paid capability behind the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// AI-generated profile summary (`/about_me`).
    AboutMe,
    /// Team member search (`/find_team`).
    FindTeam,
}

impl Capability {
    /// The one-off item that unlocks this capability once.
    pub fn single_item(&self) -> CatalogItem {
        match self {
            Self::AboutMe => CatalogItem::AboutUser,
            Self::FindTeam => CatalogItem::FindTeam,
        }
    }

    /// Items offered to a non-entitled user, one-off purchase first.
    pub fn offers(&self) -> Vec<CatalogItem> {
        vec![self.single_item(), CatalogItem::Vip]
    }
}

/// Outcome of an entitlement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Active subscription: run the capability at no cost.
    Entitled,
    /// The caller should offer these items for purchase.
    RequiresPurchase(Vec<CatalogItem>),
}

/// Decides access to paid capabilities and records subscription grants.
pub struct EntitlementGate {
    repo: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    subscription: Duration,
}

impl EntitlementGate {
    pub fn new(repo: Arc<dyn UserRepository>, clock: Arc<dyn Clock>) -> Self {
        Self::with_subscription_days(repo, clock, DEFAULT_SUBSCRIPTION_DAYS)
    }

    pub fn with_subscription_days(
        repo: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        days: i64,
    ) -> Self {
        Self {
            repo,
            clock,
            subscription: Duration::days(days),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether `user` holds an active subscription right now.
    pub fn is_entitled(&self, user: &UserRecord) -> bool {
        user.is_vip_at(self.clock.now())
    }

    /// Check access to `capability`. Unregistered users are offered a purchase.
    pub async fn check(
        &self,
        user_id: UserId,
        capability: Capability,
    ) -> Result<Access, DatabaseError> {
        let entitled = match self.repo.get(user_id).await {
            Ok(user) => self.is_entitled(&user),
            Err(DatabaseError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        if entitled {
            Ok(Access::Entitled)
        } else {
            Ok(Access::RequiresPurchase(capability.offers()))
        }
    }

    /// Start a subscription from now. Repeated grants reset, never extend.
    pub async fn grant_subscription(&self, user_id: UserId) -> Result<DateTime<Utc>, DatabaseError> {
        let until = self.clock.now() + self.subscription;
        self.repo.set_vip_until(user_id, until).await?;
        info!(user_id, until = %until, "Subscription granted");
        Ok(until)
    }
}
