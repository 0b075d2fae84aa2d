use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::owner::OwnerId;

pub type HandleId = i64;

/// Canonical form of a handle: no surrounding whitespace or `@`, no leading or
/// trailing `_`/`.`, lowercase. Returns `None` when nothing is left.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let core = trimmed.trim_matches(|c| c == '_' || c == '.');
    if core.is_empty() {
        None
    } else {
        Some(core.to_lowercase())
    }
}

/// A third-party account identifier tracked for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    pub id: HandleId,
    pub owner_id: OwnerId,
    pub text: String,
    pub done: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Handle {
    pub fn new(id: HandleId, owner_id: OwnerId, text: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            text: text.into(),
            done: false,
            activated_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn normalized(&self) -> Option<String> {
        normalize_handle(&self.text)
    }

    pub const fn is_pending(&self) -> bool {
        !self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators_and_lowercases() {
        assert_eq!(normalize_handle("_bad.user_").as_deref(), Some("bad.user"));
        assert_eq!(normalize_handle("BAD.USER").as_deref(), Some("bad.user"));
        assert_eq!(normalize_handle("...ok...").as_deref(), Some("ok"));
        assert_eq!(normalize_handle("  @Someone_ ").as_deref(), Some("someone"));
    }

    #[test]
    fn test_normalize_keeps_inner_separators() {
        assert_eq!(normalize_handle("a._.b").as_deref(), Some("a._.b"));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert_eq!(normalize_handle(""), None);
        assert_eq!(normalize_handle("._._"), None);
        assert_eq!(normalize_handle("@"), None);
    }
}
