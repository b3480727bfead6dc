//! Flow state machine — which step of which flow a user is in.

use serde::{Deserialize, Serialize};

/// A named multi-step conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// `/sign_up`: phone then email, committed together.
    Registration,
    /// `/modify` and `/modify_email`: edit contact details of an existing record.
    Modify,
    Skills,
    Preferences,
    Portfolio,
    TeamFind,
}

impl FlowKind {
    /// State a freshly started flow waits in.
    pub fn entry_state(&self) -> FlowState {
        match self {
            Self::Registration | Self::Modify => FlowState::AwaitingPhone,
            Self::Skills => FlowState::AwaitingSkills,
            Self::Preferences => FlowState::AwaitingPreferences,
            Self::Portfolio => FlowState::AwaitingProject,
            Self::TeamFind => FlowState::AwaitingRequirements,
        }
    }

    /// Whether `state` belongs to this flow.
    pub fn accepts(&self, state: FlowState) -> bool {
        use FlowState::*;
        match self {
            Self::Registration | Self::Modify => {
                matches!(state, AwaitingPhone | AwaitingEmail | Done)
            }
            Self::Skills => matches!(state, AwaitingSkills | Done),
            Self::Preferences => matches!(state, AwaitingPreferences | Done),
            Self::Portfolio => matches!(state, AwaitingProject | Done),
            Self::TeamFind => matches!(state, AwaitingRequirements | Done),
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registration => "registration",
            Self::Modify => "modify",
            Self::Skills => "skills",
            Self::Preferences => "preferences",
            Self::Portfolio => "portfolio",
            Self::TeamFind => "team_find",
        };
        write!(f, "{s}")
    }
}

/// The step a flow is waiting on.
///
/// Contact flows run AwaitingPhone → AwaitingEmail → Done; every other flow
/// has a single input state followed by Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    AwaitingPhone,
    AwaitingEmail,
    AwaitingSkills,
    AwaitingPreferences,
    AwaitingProject,
    AwaitingRequirements,
    Done,
}

impl FlowState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, target),
            (AwaitingPhone, AwaitingEmail)
                | (AwaitingEmail, Done)
                | (AwaitingSkills, Done)
                | (AwaitingPreferences, Done)
                | (AwaitingProject, Done)
                | (AwaitingRequirements, Done)
        )
    }

    /// Whether the flow is finished and the session can be dropped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// The step after this one.
    pub fn next(&self) -> Option<FlowState> {
        use FlowState::*;
        match self {
            AwaitingPhone => Some(AwaitingEmail),
            AwaitingEmail
            | AwaitingSkills
            | AwaitingPreferences
            | AwaitingProject
            | AwaitingRequirements => Some(Done),
            Done => None,
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingPhone => "awaiting_phone",
            Self::AwaitingEmail => "awaiting_email",
            Self::AwaitingSkills => "awaiting_skills",
            Self::AwaitingPreferences => "awaiting_preferences",
            Self::AwaitingProject => "awaiting_project",
            Self::AwaitingRequirements => "awaiting_requirements",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}
