//! Payments — catalog, provider seam, purchase coordination, and audit counters.
//!
//! Flow for one purchase: the user picks a catalog item, an invoice is sent,
//! the provider asks for pre-checkout approval, and a confirmation carrying a
//! charge id triggers the item's effect. Charge ids are later used for refunds.

pub mod catalog;
pub mod coordinator;
pub mod provider;
pub mod stats;

pub use catalog::{CatalogItem, CURRENCY};
pub use coordinator::{Fulfilment, PaymentCoordinator, PreCheckoutDecision, PurchaseState};
pub use provider::PaymentProvider;
pub use stats::{PurchaseEvent, PurchaseOutcome, PurchaseStats};
