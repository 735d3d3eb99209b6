use thiserror::Error;

/// Everything that can interrupt a harvest run.
///
/// Fatal variants (see [`HarvestError::is_fatal`]) stop the whole run; the
/// rest are contained to the page step or job that raised them, logged, and
/// skipped. A job that fails with a contained error is never marked complete,
/// so the next run picks it up again.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("redirected to login page ({url}); cookies may be invalid or expired")]
    Auth { url: String },

    #[error("CAPTCHA detected! Please solve it manually in a browser and restart")]
    Captcha,

    #[error("portal flagged this browser as automated or rate limited ({marker})")]
    Blocked { marker: String },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page interaction failed: {0}")]
    Interaction(String),

    #[error("session setup failed: {0}")]
    Session(String),

    #[error("browser connection closed")]
    BrowserClosed,

    #[error("progress ledger error: {0}")]
    Ledger(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HarvestError {
    /// `true` when the run must stop instead of skipping the current unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Auth { .. }
                | HarvestError::Captcha
                | HarvestError::Blocked { .. }
                | HarvestError::BrowserClosed
                | HarvestError::Ledger(_)
        )
    }
}

pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interruptions_are_fatal() {
        assert!(HarvestError::Captcha.is_fatal());
        assert!(HarvestError::Auth { url: "https://x/login".into() }.is_fatal());
        assert!(HarvestError::Blocked { marker: "plugin".into() }.is_fatal());
        assert!(HarvestError::BrowserClosed.is_fatal());
        assert!(HarvestError::Ledger("disk full".into()).is_fatal());

        assert!(!HarvestError::Navigation("timeout".into()).is_fatal());
        assert!(!HarvestError::Interaction("detached".into()).is_fatal());
        assert!(!HarvestError::Session("rejected".into()).is_fatal());
        assert!(!HarvestError::Config("bad".into()).is_fatal());
    }
}
