//! Skill matcher — scores other users against free-text team requirements.
//!
//! A requirement token counts once per candidate if any of the candidate's
//! skills contains it as a case-insensitive substring. Candidates are ranked
//! by that count; ties keep repository order.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DatabaseError, MatchError};
use crate::profile::{UserId, UserRecord};
use crate::store::UserRepository;

/// Number of candidates shown in full.
pub const TOP_MATCHES: usize = 5;

/// Tokens must be made of these characters only.
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9+#.]+$").expect("valid token regex"));

/// A candidate with a positive score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub user_id: UserId,
    pub name: String,
    pub username: Option<String>,
    /// Skills as the candidate entered them.
    pub skills: String,
    pub score: usize,
}

/// Ranked matches: the top slice plus how many more matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub top: Vec<MatchResult>,
    pub remaining: usize,
}

impl MatchReport {
    /// Total number of candidates with a positive score.
    pub fn total(&self) -> usize {
        self.top.len() + self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }

    /// Render the reply for the team-finding flow.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No team members found with the required skills. Try different requirements."
                .to_string();
        }

        let mut out = format!("🔍 Found {} potential team members:\n\n", self.total());
        for (i, m) in self.top.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, m.name));
            if let Some(ref username) = m.username {
                out.push_str(&format!(" (@{username})"));
            }
            out.push_str(&format!("\n   Skills: {}\n\n", m.skills));
        }
        if self.remaining > 0 {
            out.push_str(&format!("...and {} more matches.", self.remaining));
        }
        out
    }
}

/// Split requirements into distinct lowercase skill tokens longer than two characters.
pub fn tokenize(requirements: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in requirements.to_lowercase().split_whitespace() {
        if word.chars().count() > 2
            && TOKEN_PATTERN.is_match(word)
            && !tokens.iter().any(|t| t == word)
        {
            tokens.push(word.to_string());
        }
    }
    tokens
}

/// Count tokens satisfied by at least one candidate skill.
pub fn score(tokens: &[String], candidate_skills: &[String]) -> usize {
    tokens
        .iter()
        .filter(|token| {
            candidate_skills
                .iter()
                .any(|skill| skill.contains(token.as_str()))
        })
        .count()
}

/// Stateless matcher over a snapshot of users.
pub struct SkillMatcher;

impl SkillMatcher {
    /// Rank `candidates` for `requester`.
    ///
    /// The requester is skipped if present in `candidates`.
    pub fn rank(
        requester: &UserRecord,
        candidates: &[UserRecord],
        requirements: &str,
    ) -> Result<MatchReport, MatchError> {
        if requester.skills_text().is_none() {
            return Err(MatchError::MissingOwnSkills);
        }

        let tokens = tokenize(requirements);
        if tokens.is_empty() {
            return Err(MatchError::EmptyQuery);
        }

        let mut matches: Vec<MatchResult> = candidates
            .iter()
            .filter(|c| c.id != requester.id)
            .filter_map(|candidate| {
                let skills = candidate.skills_text()?;
                let hits = score(&tokens, &candidate.skill_set());
                (hits > 0).then(|| MatchResult {
                    user_id: candidate.id,
                    name: candidate.display_name(),
                    username: candidate.username.clone(),
                    skills: skills.to_string(),
                    score: hits,
                })
            })
            .collect();

        // `sort_by` is stable, so equal scores keep enumeration order.
        matches.sort_by(|a, b| b.score.cmp(&a.score));

        let remaining = matches.len().saturating_sub(TOP_MATCHES);
        matches.truncate(TOP_MATCHES);
        Ok(MatchReport {
            top: matches,
            remaining,
        })
    }

    /// Load the requester and every other user, then rank.
    pub async fn find(
        repo: &dyn UserRepository,
        requester_id: UserId,
        requirements: &str,
    ) -> Result<Result<MatchReport, MatchError>, DatabaseError> {
        let requester = match repo.get(requester_id).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => return Ok(Err(MatchError::MissingOwnSkills)),
            Err(e) => return Err(e),
        };
        if requester.skills_text().is_none() {
            return Ok(Err(MatchError::MissingOwnSkills));
        }
        let others = repo.list_others(requester_id).await?;
        Ok(Self::rank(&requester, &others, requirements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, name: &str, skills: Option<&str>) -> UserRecord {
        let mut u = UserRecord::new(id, Some(name), Some(&name.to_lowercase()));
        u.skills = skills.map(String::from);
        u
    }

    fn requester() -> UserRecord {
        user(1, "Req", Some("Python, React"))
    }

    #[test]
    fn tokenize_applies_whitelist_and_length() {
        assert_eq!(
            tokenize("Need a C++ dev, knows go! and c# .net"),
            vec!["need", "c++", "knows", "and", ".net"]
        );
    }

    #[test]
    fn tokenize_keeps_three_letter_tokens() {
        assert_eq!(tokenize("dev ui ux sql"), vec!["dev", "sql"]);
    }

    #[test]
    fn no_surviving_tokens_is_empty_query() {
        for text in ["", "   ", "a an to", "!!! ???", "go, js"] {
            let err = SkillMatcher::rank(&requester(), &[], text).unwrap_err();
            assert_eq!(err, MatchError::EmptyQuery, "input {text:?}");
        }
    }

    #[test]
    fn requester_without_skills_is_rejected_first() {
        let candidates = vec![user(2, "A", Some("python"))];
        for skills in [None, Some(""), Some("  ")] {
            let req = user(1, "Req", skills);
            let err = SkillMatcher::rank(&req, &candidates, "python").unwrap_err();
            assert_eq!(err, MatchError::MissingOwnSkills);
            let err = SkillMatcher::rank(&req, &candidates, "").unwrap_err();
            assert_eq!(err, MatchError::MissingOwnSkills);
        }
    }

    #[test]
    fn python_scenario() {
        let candidates = vec![
            user(2, "A", Some("python, node")),
            user(3, "B", Some("java")),
        ];
        let report = SkillMatcher::rank(&requester(), &candidates, "need python dev").unwrap();

        assert_eq!(report.top.len(), 1);
        assert_eq!(report.top[0].user_id, 2);
        assert_eq!(report.top[0].score, 1);
        assert_eq!(report.remaining, 0);
        assert!(!report.render().contains("No team members"));
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let candidates = vec![user(2, "A", Some("PostgreSQL, JavaScript"))];
        let report = SkillMatcher::rank(&requester(), &candidates, "SQL script").unwrap();
        assert_eq!(report.top[0].score, 2);
    }

    #[test]
    fn token_counts_once_even_if_many_skills_match() {
        let candidates = vec![user(2, "A", Some("rust, rust async, rustls"))];
        let report = SkillMatcher::rank(&requester(), &candidates, "rust").unwrap();
        assert_eq!(report.top[0].score, 1);
    }

    #[test]
    fn repeated_token_counts_once() {
        assert_eq!(tokenize("Rust rust RUST"), vec!["rust"]);
        let candidates = vec![user(2, "A", Some("rust"))];
        let report = SkillMatcher::rank(&requester(), &candidates, "rust rust").unwrap();
        assert_eq!(report.top[0].score, 1);
    }

    #[test]
    fn adding_a_matching_token_never_lowers_score() {
        let skills = user(2, "A", Some("python, docker, aws")).skill_set();
        let base = tokenize("python kubernetes");
        let mut extended = base.clone();
        extended.push("docker".into());
        assert!(score(&extended, &skills) >= score(&base, &skills));
        assert_eq!(score(&extended, &skills), score(&base, &skills) + 1);
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let candidates = vec![
            user(5, "E", Some("rust")),
            user(3, "C", Some("rust, go")),
            user(4, "D", Some("rust")),
            user(2, "B", Some("rust, golang")),
        ];
        let report = SkillMatcher::rank(&requester(), &candidates, "rust golang").unwrap();
        let ids: Vec<UserId> = report.top.iter().map(|m| m.user_id).collect();
        // B scores 2; the rest score 1 and keep their input order.
        assert_eq!(ids, vec![2, 5, 3, 4]);
    }

    #[test]
    fn zero_score_and_skill_less_candidates_are_dropped() {
        let candidates = vec![
            user(2, "A", None),
            user(3, "B", Some("")),
            user(4, "C", Some("java")),
        ];
        let report = SkillMatcher::rank(&requester(), &candidates, "python").unwrap();
        assert!(report.is_empty());
        assert!(report.render().starts_with("No team members found"));
    }

    #[test]
    fn overflow_beyond_top_five_is_counted() {
        let candidates: Vec<UserRecord> = (2..10)
            .map(|id| user(id, &format!("U{id}"), Some("rust")))
            .collect();
        let report = SkillMatcher::rank(&requester(), &candidates, "rust").unwrap();
        assert_eq!(report.top.len(), TOP_MATCHES);
        assert_eq!(report.remaining, 3);
        assert_eq!(report.total(), 8);
        assert!(report.render().ends_with("...and 3 more matches."));
    }

    #[test]
    fn requester_is_never_matched() {
        let me = requester();
        let candidates = vec![me.clone(), user(2, "A", Some("react"))];
        let report = SkillMatcher::rank(&me, &candidates, "react").unwrap();
        assert_eq!(report.top.len(), 1);
        assert_eq!(report.top[0].user_id, 2);
    }

    #[test]
    fn render_lists_handle_and_skills() {
        let candidates = vec![user(2, "Ann", Some("Python, Node"))];
        let text = SkillMatcher::rank(&requester(), &candidates, "python")
            .unwrap()
            .render();
        assert!(text.starts_with("🔍 Found 1 potential team members:"));
        assert!(text.contains("1. Ann (@ann)\n   Skills: Python, Node"));
    }
}
