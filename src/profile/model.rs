//! User record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable numeric user identity (the transport's user id).
pub type UserId = i64;

/// Separator placed between portfolio entries.
const PORTFOLIO_SEPARATOR: &str = "\n\n";

/// A registered user.
///
/// Only `id` is guaranteed; every other field stays `None` until a flow sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Comma-separated skill list, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,
    /// Append-only project log, entries separated by a blank line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_until: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(id: UserId, name: Option<&str>, username: Option<&str>) -> Self {
        Self {
            id,
            name: name.map(String::from),
            username: username.map(String::from),
            ..Self::default()
        }
    }

    /// The skills field, if set and not blank.
    pub fn skills_text(&self) -> Option<&str> {
        self.skills.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Skills split on commas, trimmed and lowercased.
    pub fn skill_set(&self) -> Vec<String> {
        self.skills_text()
            .map(|s| {
                s.split(',')
                    .map(|skill| skill.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the subscription is active at `now`.
    pub fn is_vip_at(&self, now: DateTime<Utc>) -> bool {
        self.vip_until.is_some_and(|until| until > now)
    }

    /// Name shown in listings, falling back to the handle and then the id.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("user {}", self.id))
    }

    /// Render the `/profile` view.
    pub fn render_profile(&self, now: DateTime<Utc>) -> String {
        let mut out = format!("👤 {}", self.display_name());
        if let Some(ref username) = self.username {
            out.push_str(&format!(" (@{username})"));
        }
        out.push_str("\n\n");

        if let Some(ref phone) = self.phone {
            out.push_str(&format!("📱 Phone: {phone}\n"));
        }
        if let Some(ref email) = self.email {
            out.push_str(&format!("✉️ Email: {email}\n"));
        }
        if let Some(skills) = self.skills_text() {
            out.push_str(&format!("\n🔧 Skills:\n{skills}\n"));
        }
        if let Some(ref preferences) = self.preferences {
            out.push_str(&format!("\n🌟 Preferences:\n{preferences}\n"));
        }
        if let Some(ref about) = self.about_user {
            out.push_str(&format!("\n📝 About:\n{about}\n"));
        }
        if let Some(until) = self.vip_until.filter(|until| *until > now) {
            out.push_str(&format!("\n👑 VIP until: {}\n", until.format("%Y-%m-%d")));
        }
        out
    }
}

/// Append a project entry to an existing portfolio log.
///
/// Entries are never validated or deduplicated.
pub fn append_project(existing: Option<&str>, entry: &str) -> String {
    let entry = entry.trim();
    match existing.map(str::trim).filter(|e| !e.is_empty()) {
        Some(current) => format!("{current}{PORTFOLIO_SEPARATOR}{entry}"),
        None => entry.to_string(),
    }
}

/// A single mutable column of the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Phone,
    Email,
    Skills,
    Preferences,
    Portfolio,
    AboutUser,
    VipUntil,
}

impl UserField {
    /// Column name in the `users` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Phone => "phone_number",
            Self::Email => "email",
            Self::Skills => "skills",
            Self::Preferences => "preferences",
            Self::Portfolio => "portfolio",
            Self::AboutUser => "about_user",
            Self::VipUntil => "vip_until",
        }
    }
}

impl std::fmt::Display for UserField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Skills => "skills",
            Self::Preferences => "preferences",
            Self::Portfolio => "portfolio",
            Self::AboutUser => "about_user",
            Self::VipUntil => "vip_until",
        };
        write!(f, "{s}")
    }
}
