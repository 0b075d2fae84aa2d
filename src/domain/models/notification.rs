use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::outcome::ErrorTag;
use super::strategy::ResourceClass;

/// Per-handle message delivered to an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ActiveFound {
        handle: String,
        artifact: Option<PathBuf>,
    },
    NotFound {
        handle: String,
    },
    CheckFailed {
        handle: String,
        error_tag: ErrorTag,
    },
    SkippedMissingResource {
        handle: String,
        class: ResourceClass,
    },
}

/// Status a notification reports, without the artifact. Two notifications
/// with the same kind for the same handle say the same thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ActiveFound,
    NotFound,
    CheckFailed(ErrorTag),
    SkippedMissingResource(ResourceClass),
}

impl Notification {
    pub fn handle(&self) -> &str {
        match self {
            Self::ActiveFound { handle, .. }
            | Self::NotFound { handle }
            | Self::CheckFailed { handle, .. }
            | Self::SkippedMissingResource { handle, .. } => handle,
        }
    }

    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::ActiveFound { .. } => NotificationKind::ActiveFound,
            Self::NotFound { .. } => NotificationKind::NotFound,
            Self::CheckFailed { error_tag, .. } => NotificationKind::CheckFailed(*error_tag),
            Self::SkippedMissingResource { class, .. } => {
                NotificationKind::SkippedMissingResource(*class)
            }
        }
    }

    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Self::ActiveFound { artifact, .. } => artifact.as_deref(),
            _ => None,
        }
    }

    pub fn render_text(&self) -> String {
        match self {
            Self::ActiveFound { handle, .. } => format!("✅ @{handle} active"),
            Self::NotFound { handle } => format!("❌ @{handle} not found"),
            Self::CheckFailed { handle, error_tag } => {
                format!("⚠️ @{handle} failed: {}", error_tag.user_reason())
            }
            Self::SkippedMissingResource { handle, class } => {
                format!("⏭ @{handle} skipped: missing {}", class.label())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text() {
        let active = Notification::ActiveFound {
            handle: "bob".into(),
            artifact: None,
        };
        assert_eq!(active.render_text(), "✅ @bob active");

        let failed = Notification::CheckFailed {
            handle: "bob".into(),
            error_tag: ErrorTag::ProxyRefused,
        };
        assert_eq!(failed.render_text(), "⚠️ @bob failed: proxy refused the connection");

        let skipped = Notification::SkippedMissingResource {
            handle: "bob".into(),
            class: ResourceClass::ApiKey,
        };
        assert_eq!(skipped.render_text(), "⏭ @bob skipped: missing API key");
    }

    #[test]
    fn test_kind_ignores_artifact() {
        let a = Notification::ActiveFound {
            handle: "x".into(),
            artifact: Some(PathBuf::from("/tmp/a.png")),
        };
        let b = Notification::ActiveFound {
            handle: "x".into(),
            artifact: None,
        };
        assert_eq!(a.kind(), b.kind());
        assert_eq!(a.artifact(), Some(Path::new("/tmp/a.png")));
    }

    #[test]
    fn test_internal_errors_never_leak() {
        let failed = Notification::CheckFailed {
            handle: "x".into(),
            error_tag: ErrorTag::Unknown,
        };
        assert!(failed.render_text().ends_with("internal error"));
    }
}
