//! Error types for Team Finder.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// User repository errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("User {0} not found")]
    NotFound(i64),

    #[error("User {0} already exists")]
    AlreadyExists(i64),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Payment provider errors.
///
/// The provider does not say why a refund or invoice failed, so neither do we.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    Provider(String),

    #[error("Payment provider declined the request")]
    Declined,

    #[error("Unknown catalog item: {0}")]
    UnknownItem(String),
}

/// Profile summary generation errors.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Summary request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid summary response: {0}")]
    InvalidResponse(String),
}

/// Skill matcher precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("Requester has no skills set")]
    MissingOwnSkills,

    #[error("Requirements contain no usable skill tokens")]
    EmptyQuery,
}

/// Failures surfaced to the user while running a command or flow step.
///
/// `Validation` re-prompts in place; every other variant ends the flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Invalid {field}")]
    Validation { field: &'static str },

    #[error("User {0} is not registered")]
    NotFound(i64),

    #[error("User {0} is already registered")]
    AlreadyExists(i64),

    #[error("Repository failure: {0}")]
    Repository(DatabaseError),

    #[error("Payment failure: {0}")]
    Payment(#[from] PaymentError),

    #[error("Summary failure: {0}")]
    Summary(#[from] SummaryError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl From<DatabaseError> for FlowError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(id) => Self::NotFound(id),
            DatabaseError::AlreadyExists(id) => Self::AlreadyExists(id),
            other => Self::Repository(other),
        }
    }
}

impl FlowError {
    /// Whether the flow stays in its current state after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The single reply shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field } => format!("❌ Invalid {field}. Try again."),
            Self::NotFound(_) => "You don't have a profile yet. Use /sign_up to create one.".into(),
            Self::AlreadyExists(_) => {
                "You're already registered. Use /modify to change your info.".into()
            }
            Self::Repository(_) => "❌ Something went wrong while saving. Please try again later.".into(),
            Self::Payment(_) => {
                "❌ Sorry, the payment could not be processed. Please try again later.".into()
            }
            Self::Summary(_) => {
                "❌ Sorry, the profile summary could not be generated right now.".into()
            }
            Self::Match(MatchError::MissingOwnSkills) => {
                "You need to set your skills first using /set_skills".into()
            }
            Self::Match(MatchError::EmptyQuery) => {
                "Please specify some skills you're looking for in your team".into()
            }
        }
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
