//! Profile summaries — the side effect behind `/about_me` and the
//! `about_user_dict` purchase.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{FlowError, SummaryError};
use crate::profile::{UserField, UserId, UserRecord};
use crate::store::UserRepository;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_SUMMARY_MODEL: &str = "claude-3-5-haiku-latest";

/// Turns a user record into a short third-person description.
#[async_trait]
pub trait ProfileSummarizer: Send + Sync {
    async fn summarize(&self, user: &UserRecord) -> Result<String, SummaryError>;
}

/// Deterministic summary built from the record's own fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSummarizer;

#[async_trait]
impl ProfileSummarizer for TemplateSummarizer {
    async fn summarize(&self, user: &UserRecord) -> Result<String, SummaryError> {
        let mut out = user.display_name();

        match user.skill_set().as_slice() {
            [] => out.push_str(" has not listed any skills yet."),
            [only] => out.push_str(&format!(" works with {only}.")),
            [init @ .., last] => {
                out.push_str(&format!(" works with {} and {last}.", init.join(", ")))
            }
        }

        if let Some(preferences) = user.preferences.as_deref().filter(|p| !p.trim().is_empty()) {
            out.push_str(&format!(" Prefers: {}.", preferences.trim().trim_end_matches('.')));
        }

        let projects = user
            .portfolio
            .as_deref()
            .map(|p| p.split("\n\n").filter(|e| !e.trim().is_empty()).count())
            .unwrap_or(0);
        match projects {
            0 => {}
            1 => out.push_str(" Has 1 completed project in their portfolio."),
            n => out.push_str(&format!(" Has {n} completed projects in their portfolio.")),
        }

        Ok(out)
    }
}

/// Summaries from the Anthropic Messages API.
pub struct AnthropicSummarizer {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl AnthropicSummarizer {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn prompt(user: &UserRecord) -> String {
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        format!(
            "Write a short, friendly third-person summary (3 sentences max) of this \
             professional profile for potential teammates. Do not include contact details.\n\n\
             Name: {}\nSkills: {}\nPreferences: {}\nPortfolio:\n{}",
            user.display_name(),
            field(&user.skills),
            field(&user.preferences),
            field(&user.portfolio),
        )
    }
}

#[async_trait]
impl ProfileSummarizer for AnthropicSummarizer {
    async fn summarize(&self, user: &UserRecord) -> Result<String, SummaryError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 300,
            "messages": [{ "role": "user", "content": Self::prompt(user) }],
        });

        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| SummaryError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(SummaryError::RequestFailed(format!("{status}: {err}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        let text: String = data
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(SummaryError::InvalidResponse("no text content".into()));
        }
        Ok(text.to_string())
    }
}

/// Regenerate and store the `about_user` text for `user_id`.
pub async fn refresh_about(
    repo: &dyn UserRepository,
    summarizer: &dyn ProfileSummarizer,
    user_id: UserId,
) -> Result<String, FlowError> {
    let user = repo.get(user_id).await?;
    let summary = summarizer.summarize(&user).await?;
    repo.update_field(user_id, UserField::AboutUser, Some(&summary))
        .await?;
    tracing::info!(user_id, "Profile summary refreshed");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    fn record() -> UserRecord {
        let mut u = UserRecord::new(1, Some("Ann"), Some("ann"));
        u.skills = Some("Rust, Go, SQL".into());
        u.preferences = Some("remote only.".into());
        u.portfolio = Some("Bot\n\nCompiler".into());
        u
    }

    #[tokio::test]
    async fn template_mentions_skills_preferences_and_projects() {
        let text = TemplateSummarizer.summarize(&record()).await.unwrap();
        assert_eq!(
            text,
            "Ann works with rust, go and sql. Prefers: remote only. \
             Has 2 completed projects in their portfolio."
        );
    }

    #[tokio::test]
    async fn template_handles_empty_profile() {
        let user = UserRecord::new(2, None, Some("bob"));
        let text = TemplateSummarizer.summarize(&user).await.unwrap();
        assert_eq!(text, "bob has not listed any skills yet.");
    }

    #[test]
    fn prompt_omits_contact_details() {
        let mut user = record();
        user.phone = Some("+15550001111".into());
        user.email = Some("ann@example.com".into());
        let prompt = AnthropicSummarizer::prompt(&user);
        assert!(prompt.contains("Rust, Go, SQL"));
        assert!(!prompt.contains("+15550001111"));
        assert!(!prompt.contains("ann@example.com"));
    }

    #[tokio::test]
    async fn refresh_about_stores_summary() {
        let repo = LibSqlBackend::new_memory().await.unwrap();
        repo.create(1, Some("Ann"), None).await.unwrap();
        repo.update_field(1, UserField::Skills, Some("rust")).await.unwrap();

        let summary = refresh_about(&repo, &TemplateSummarizer, 1).await.unwrap();
        assert_eq!(summary, "Ann works with rust.");
        assert_eq!(
            repo.get(1).await.unwrap().about_user.as_deref(),
            Some("Ann works with rust.")
        );
    }

    #[tokio::test]
    async fn refresh_about_for_unknown_user_is_not_found() {
        let repo = LibSqlBackend::new_memory().await.unwrap();
        let err = refresh_about(&repo, &TemplateSummarizer, 9).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(9)));
    }
}
