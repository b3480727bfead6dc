//! Per-user conversation sessions with idle expiry.
//!
//! At most one session exists per user. Starting a flow replaces whatever
//! session was open, and a session idle for longer than the timeout is
//! treated as absent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conversation::{FlowKind, FlowState};
use crate::entitlement::Clock;
use crate::profile::UserId;

/// Default idle timeout before an open flow is discarded.
pub const DEFAULT_IDLE_MINUTES: i64 = 30;

/// One user's open flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: FlowKind,
    pub state: FlowState,
    /// Phone accepted during registration, committed together with the email.
    pub pending_phone: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationSession {
    fn new(user_id: UserId, kind: FlowKind, state: FlowState, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            state,
            pending_phone: None,
            started_at: now,
            last_activity: now,
        }
    }

    /// Step to the next state of this flow. Returns false and leaves the
    /// state untouched when no such step exists.
    pub fn advance(&mut self) -> bool {
        match self.state.next() {
            Some(next) if self.state.can_transition_to(next) && self.kind.accepts(next) => {
                self.state = next;
                true
            }
            _ => false,
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity >= timeout
    }
}

/// In-memory session table. Sessions do not survive a restart.
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, ConversationSession>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            clock,
        }
    }

    /// Open `kind` at its entry state, replacing any open session.
    pub async fn begin(&self, user_id: UserId, kind: FlowKind) -> ConversationSession {
        self.begin_at(user_id, kind, kind.entry_state()).await
    }

    /// Open `kind` at a specific state, replacing any open session.
    pub async fn begin_at(
        &self,
        user_id: UserId,
        kind: FlowKind,
        state: FlowState,
    ) -> ConversationSession {
        let session = ConversationSession::new(user_id, kind, state, self.clock.now());
        let replaced = self
            .sessions
            .write()
            .await
            .insert(user_id, session.clone());
        if let Some(old) = replaced {
            tracing::debug!(
                user_id,
                flow = %old.kind,
                state = %old.state,
                "Open flow replaced by {kind}"
            );
        }
        session
    }

    /// The user's live session, if any. Idle sessions are removed on sight.
    pub async fn get(&self, user_id: UserId) -> Option<ConversationSession> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&user_id) {
                None => return None,
                Some(s) if !s.is_idle(now, self.idle_timeout) => return Some(s.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&user_id)
            .is_some_and(|s| s.is_idle(now, self.idle_timeout))
        {
            sessions.remove(&user_id);
            tracing::debug!(user_id, "Idle session expired");
        }
        None
    }

    /// Store an updated session and refresh its activity time.
    ///
    /// A terminal session is removed instead. Saving a session that was
    /// replaced in the meantime is ignored.
    pub async fn save(&self, mut session: ConversationSession) {
        let mut sessions = self.sessions.write().await;
        let current = sessions.get(&session.user_id).map(|s| s.id);
        if current != Some(session.id) {
            return;
        }
        if session.state.is_terminal() {
            sessions.remove(&session.user_id);
        } else {
            session.last_activity = self.clock.now();
            sessions.insert(session.user_id, session);
        }
    }

    /// Discard the user's session. Returns whether one was open.
    pub async fn end(&self, user_id: UserId) -> bool {
        self.sessions.write().await.remove(&user_id).is_some()
    }

    /// Remove every idle session. Returns how many were removed.
    pub async fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_idle(now, self.idle_timeout));
        before - sessions.len()
    }

    /// Number of sessions held, idle or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Spawn a background task that prunes idle sessions every minute.
pub fn spawn_prune_task(store: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let pruned = store.prune_idle().await;
            if pruned > 0 {
                let open = store.len().await;
                tracing::info!(pruned, open, "Pruned idle sessions");
            }
        }
    })
}
