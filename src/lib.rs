//! Team Finder — Telegram bot core for profiles, team matching and paid features.

pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod entitlement;
pub mod error;
pub mod matcher;
pub mod payments;
pub mod profile;
pub mod store;
pub mod summary;
