//! Conversation engine — starts flows and feeds free text to the open one.
//!
//! Validation failures re-prompt in place. Any other failure ends the flow,
//! and the caller turns the error into a single reply.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::conversation::validation::{is_valid_email, is_valid_phone};
use crate::conversation::{ConversationSession, FlowKind, FlowState, SessionStore};
use crate::error::{DatabaseError, FlowError};
use crate::matcher::SkillMatcher;
use crate::profile::{UserField, UserId, append_project};
use crate::store::UserRepository;

pub const PROMPT_PHONE: &str = "📱 Enter your phone number:";
pub const PROMPT_NEW_PHONE: &str = "📱 Enter your new phone number:";
pub const PROMPT_EMAIL: &str = "✉️ Now enter your email:";
pub const PROMPT_NEW_EMAIL: &str = "✉️ Enter your new email:";
pub const PROMPT_SKILLS: &str = "🔧 List your skills separated by commas (e.g., Python, React).";
pub const PROMPT_PREFERENCES: &str =
    "🌟 Share your work preferences (e.g., remote only, startups, agile teams).";
pub const PROMPT_PROJECT: &str =
    "📁 Send me the project you've completed. Include name and short description.";
pub const PROMPT_REQUIREMENTS: &str = "Please describe what kind of team members you're looking for. \
     Include skills and any other requirements.";

const REGISTRATION_COMPLETE: &str = "✅ Registration complete!";
const CONTACTS_UPDATED: &str = "✅ Contact details updated.";
const SKILLS_UPDATED: &str = "✅ Skills updated.";
const PREFERENCES_UPDATED: &str = "✅ Preferences updated.";
const PREFERENCES_FAILED: &str = "❌ Failed to update preferences.";
const PROJECT_ADDED: &str = "✅ Project added to your portfolio!";
const SKILLS_CANCELLED: &str = "❌ Skill update cancelled.";
const FLOW_CANCELLED: &str = "❌ Cancelled. Nothing was saved.";

/// Drives every multi-step flow for every user.
pub struct ConversationEngine {
    repo: Arc<dyn UserRepository>,
    sessions: Arc<SessionStore>,
}

impl ConversationEngine {
    pub fn new(repo: Arc<dyn UserRepository>, sessions: Arc<SessionStore>) -> Self {
        Self { repo, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// `/sign_up`: create the record, then ask for the phone number.
    pub async fn start_registration(
        &self,
        user_id: UserId,
        name: Option<&str>,
        username: Option<&str>,
    ) -> Result<String, FlowError> {
        if self.repo.exists(user_id).await? {
            return Err(FlowError::AlreadyExists(user_id));
        }
        self.repo.create(user_id, name, username).await?;
        info!(user_id, "User record created");
        self.sessions.begin(user_id, FlowKind::Registration).await;
        Ok(PROMPT_PHONE.into())
    }

    /// `/modify`: edit phone and email of an existing record.
    pub async fn start_modify(&self, user_id: UserId) -> Result<String, FlowError> {
        self.require_registered(user_id).await?;
        self.sessions.begin(user_id, FlowKind::Modify).await;
        Ok(PROMPT_NEW_PHONE.into())
    }

    /// `/modify_email`: edit only the email of an existing record.
    pub async fn start_modify_email(&self, user_id: UserId) -> Result<String, FlowError> {
        self.require_registered(user_id).await?;
        self.sessions
            .begin_at(user_id, FlowKind::Modify, FlowState::AwaitingEmail)
            .await;
        Ok(PROMPT_NEW_EMAIL.into())
    }

    pub async fn start_skills(&self, user_id: UserId) -> String {
        self.sessions.begin(user_id, FlowKind::Skills).await;
        PROMPT_SKILLS.into()
    }

    pub async fn start_preferences(&self, user_id: UserId) -> String {
        self.sessions.begin(user_id, FlowKind::Preferences).await;
        PROMPT_PREFERENCES.into()
    }

    pub async fn start_portfolio(&self, user_id: UserId) -> String {
        self.sessions.begin(user_id, FlowKind::Portfolio).await;
        PROMPT_PROJECT.into()
    }

    /// Open team finding. Callers check entitlement first.
    pub async fn start_team_find(&self, user_id: UserId) -> String {
        self.sessions.begin(user_id, FlowKind::TeamFind).await;
        PROMPT_REQUIREMENTS.into()
    }

    /// `/cancel`: drop the open flow without committing. `None` if nothing was open.
    pub async fn cancel(&self, user_id: UserId) -> Option<String> {
        let session = self.sessions.get(user_id).await?;
        self.sessions.end(user_id).await;
        debug!(user_id, flow = %session.kind, state = %session.state, "Flow cancelled");
        Some(match session.kind {
            FlowKind::Skills => SKILLS_CANCELLED.into(),
            _ => FLOW_CANCELLED.into(),
        })
    }

    /// Feed free text to the user's open flow.
    ///
    /// `Ok(None)` means the input was ignored: no open flow, or blank text.
    pub async fn handle_text(&self, user_id: UserId, text: &str) -> Result<Option<String>, FlowError> {
        let Some(session) = self.sessions.get(user_id).await else {
            return Ok(None);
        };
        let input = text.trim();
        if input.is_empty() {
            return Ok(None);
        }

        debug!(user_id, flow = %session.kind, state = %session.state, "Flow input");
        let result = match (session.kind, session.state) {
            (FlowKind::Registration | FlowKind::Modify, FlowState::AwaitingPhone) => {
                self.accept_phone(session, input).await
            }
            (FlowKind::Registration | FlowKind::Modify, FlowState::AwaitingEmail) => {
                self.accept_email(session, input).await
            }
            (FlowKind::Skills, FlowState::AwaitingSkills) => {
                self.finish(session, self.repo.update_field(user_id, UserField::Skills, Some(input)))
                    .await
                    .map(|()| SKILLS_UPDATED.to_string())
            }
            (FlowKind::Preferences, FlowState::AwaitingPreferences) => {
                let saved = self
                    .finish(
                        session,
                        self.repo
                            .update_field(user_id, UserField::Preferences, Some(input)),
                    )
                    .await;
                match saved {
                    Ok(()) => Ok(PREFERENCES_UPDATED.to_string()),
                    Err(FlowError::Repository(_)) => Ok(PREFERENCES_FAILED.to_string()),
                    Err(e) => Err(e),
                }
            }
            (FlowKind::Portfolio, FlowState::AwaitingProject) => {
                self.finish(session, self.append_portfolio(user_id, input))
                    .await
                    .map(|()| PROJECT_ADDED.to_string())
            }
            (FlowKind::TeamFind, FlowState::AwaitingRequirements) => {
                self.run_team_find(session, input).await
            }
            (kind, state) => {
                debug!(user_id, flow = %kind, state = %state, "No handler for state; input ignored");
                return Ok(None);
            }
        };
        result.map(Some)
    }

    async fn require_registered(&self, user_id: UserId) -> Result<(), FlowError> {
        if self.repo.exists(user_id).await? {
            Ok(())
        } else {
            Err(FlowError::NotFound(user_id))
        }
    }

    async fn accept_phone(
        &self,
        mut session: ConversationSession,
        input: &str,
    ) -> Result<String, FlowError> {
        if !is_valid_phone(input) {
            // Re-prompt in place; touching the session keeps it from idling out.
            self.sessions.save(session).await;
            return Err(FlowError::Validation {
                field: "phone number",
            });
        }
        session.pending_phone = Some(input.to_string());
        session.advance();
        self.sessions.save(session).await;
        Ok(PROMPT_EMAIL.into())
    }

    async fn accept_email(
        &self,
        session: ConversationSession,
        input: &str,
    ) -> Result<String, FlowError> {
        if !is_valid_email(input) {
            self.sessions.save(session).await;
            return Err(FlowError::Validation {
                field: "email format",
            });
        }

        let user_id = session.user_id;
        let kind = session.kind;
        let phone = session.pending_phone.clone();
        let mut fields = vec![(UserField::Email, input)];
        if let Some(ref phone) = phone {
            fields.insert(0, (UserField::Phone, phone.as_str()));
        }

        self.finish(session, self.repo.update_fields(user_id, &fields))
            .await?;
        info!(user_id, flow = %kind, phone_updated = phone.is_some(), "Contact details committed");
        Ok(match kind {
            FlowKind::Registration => REGISTRATION_COMPLETE.into(),
            _ => CONTACTS_UPDATED.into(),
        })
    }

    async fn append_portfolio(&self, user_id: UserId, entry: &str) -> Result<(), DatabaseError> {
        let user = self.repo.get(user_id).await?;
        let portfolio = append_project(user.portfolio.as_deref(), entry);
        self.repo
            .update_field(user_id, UserField::Portfolio, Some(&portfolio))
            .await
    }

    async fn run_team_find(
        &self,
        session: ConversationSession,
        requirements: &str,
    ) -> Result<String, FlowError> {
        let user_id = session.user_id;
        let outcome = SkillMatcher::find(self.repo.as_ref(), user_id, requirements).await;
        self.complete(session).await;

        let report = outcome??;
        info!(user_id, matches = report.total(), "Team search finished");
        Ok(report.render())
    }

    /// Await the commit, then end the flow whatever the outcome.
    async fn finish<F>(&self, session: ConversationSession, commit: F) -> Result<(), FlowError>
    where
        F: std::future::Future<Output = Result<(), DatabaseError>>,
    {
        let user_id = session.user_id;
        let flow = session.kind;
        let result = commit.await;
        self.complete(session).await;
        result.map_err(|e| {
            error!(user_id, flow = %flow, error = %e, "Failed to commit flow");
            FlowError::from(e)
        })
    }

    async fn complete(&self, mut session: ConversationSession) {
        if !session.advance() || !session.state.is_terminal() {
            warn!(
                user_id = session.user_id,
                flow = %session.kind,
                state = %session.state,
                "Flow finished from a non-final step"
            );
            session.state = FlowState::Done;
        }
        self.sessions.save(session).await;
    }
}
