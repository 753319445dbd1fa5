//! Candidate items submitted for resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of external content a candidate refers to.
///
/// Each kind gets its own resolver chain; a podcast episode is resolved
/// through different sources than a news article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Written article or blog post.
    Article,
    /// Podcast episode (transcript discovery).
    PodcastEpisode,
    /// Audio/video media item.
    Media,
    /// Anything reachable by URL with no more specific kind.
    GenericUrl,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Article => write!(f, "article"),
            SourceKind::PodcastEpisode => write!(f, "podcast_episode"),
            SourceKind::Media => write!(f, "media"),
            SourceKind::GenericUrl => write!(f, "generic_url"),
        }
    }
}

/// An external reference submitted for resolution.
///
/// Immutable once created; jobs own their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// What kind of content this reference points at.
    pub source_kind: SourceKind,

    /// URL where the content was referenced.
    pub origin_url: String,

    /// Human-readable title, when the submitter had one.
    pub display_title: Option<String>,

    /// Name of the feed/site/source the reference came from. Used with the
    /// title for the advisory secondary dedup key.
    pub source_name: Option<String>,

    /// Higher values are leased sooner.
    pub submission_priority: i32,

    /// Free-text provenance tag (e.g. "rss:acme-feed", "manual").
    pub submitted_by: String,

    /// When the reference was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl CandidateItem {
    /// Creates a candidate with default priority and the current time.
    pub fn new(
        source_kind: SourceKind,
        origin_url: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Self {
        Self {
            source_kind,
            origin_url: origin_url.into(),
            display_title: None,
            source_name: None,
            submission_priority: 0,
            submitted_by: submitted_by.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.display_title = Some(title.into());
        self
    }

    /// Sets the source name.
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Sets the submission priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.submission_priority = priority;
        self
    }
}
