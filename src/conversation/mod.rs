//! Multi-step conversations: flows, per-user sessions and the engine that
//! drives them.

pub mod engine;
pub mod session;
pub mod state;
pub mod validation;

pub use engine::ConversationEngine;
pub use session::{ConversationSession, SessionStore, spawn_prune_task};
pub use state::{FlowKind, FlowState};
