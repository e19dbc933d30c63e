//! Current-affairs detection.
//!
//! One decision, made once per query, gates both the news-vertical search in
//! [`crate::retrieve`] and the context-sufficiency check in [`crate::answer`].

use serde::Serialize;

use crate::models::Vertical;

/// Lowercase phrases that mark a query as current affairs.
pub const CURRENT_AFFAIRS_KEYWORDS: &[&str] = &["current affairs", "attack", "terror", "news", "2025"];

/// Result of classifying a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_current_affairs: bool,
}

impl Classification {
    /// Search vertical this query should be sent to.
    pub fn vertical(&self) -> Vertical {
        if self.is_current_affairs {
            Vertical::News
        } else {
            Vertical::Web
        }
    }

    pub fn label(&self) -> &'static str {
        if self.is_current_affairs {
            "current-affairs"
        } else {
            "general"
        }
    }
}

/// Case-insensitive substring match against [`CURRENT_AFFAIRS_KEYWORDS`].
pub fn classify(query: &str) -> Classification {
    let lowered = query.to_lowercase();
    Classification {
        is_current_affairs: CURRENT_AFFAIRS_KEYWORDS
            .iter()
            .any(|kw| lowered.contains(kw)),
    }
}
