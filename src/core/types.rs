use serde::{Deserialize, Serialize};

/// A job posting found on the listing view. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
}

impl Job {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One job's entry in the progress ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedJob {
    #[serde(default)]
    pub title: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub completed_at: String,
    #[serde(default)]
    pub downloads: u64,
}

/// Summary handed to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub completed: usize,
    pub total_downloads: u64,
    pub started_at: Option<String>,
}

/// An anchor on the current page: its `href` attribute and visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub text: String,
}

/// Snapshot of how a selector resolves on the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementProbe {
    pub count: usize,
    /// Whether the first match is rendered and visible.
    pub first_visible: bool,
    /// Text content of the first match, if any.
    pub first_text: Option<String>,
}

impl ElementProbe {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.count > 0 && self.first_visible
    }
}
