//! Page Navigator: low-level checks and moves shared by discovery and download.
//!
//! Every UI state is detected by polling, so callers run [`Navigator::checkpoint`]
//! after every navigation and before every page-level interaction.

use crate::core::config::HarvestConfig;
use crate::core::error::{HarvestError, HarvestResult};
use crate::features::antibot::JitterDelay;
use crate::scraping::page::{PortalPage, Selector};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

static PAGE_TOTAL_RE: OnceLock<Regex> = OnceLock::new();

/// Extract `Y` from a "Page X of Y" style indicator.
pub fn parse_page_total(text: &str) -> Option<u32> {
    let re = PAGE_TOTAL_RE.get_or_init(|| {
        Regex::new(r"(?i)\bof\s+(\d+)").expect("page total pattern is valid")
    });
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Selectors pre-parsed from config.
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    pub job_links: Selector,
    pub next_page: Selector,
    pub page_indicator: Selector,
    pub select_all: Selector,
    pub download_button: Selector,
    pub page_size_dropdown: Selector,
    pub page_size_max_option: Selector,
    pub no_responses: Selector,
    pub captcha: Selector,
    pub blocked: Selector,
}

impl PortalSelectors {
    pub fn from_config(config: &HarvestConfig) -> Self {
        let s = &config.selectors;
        Self {
            job_links: Selector::parse(&s.job_links),
            next_page: Selector::parse(&s.next_page),
            page_indicator: Selector::parse(&s.page_indicator),
            select_all: Selector::parse(&s.select_all),
            download_button: Selector::parse(&s.download_button),
            page_size_dropdown: Selector::parse(&s.page_size_dropdown),
            page_size_max_option: Selector::parse(&s.page_size_max_option),
            no_responses: Selector::parse(&s.no_responses),
            captcha: Selector::parse(&s.captcha),
            blocked: Selector::parse(&s.blocked),
        }
    }
}

/// Stateless helper bound to one live page.
pub struct Navigator<'a> {
    page: &'a dyn PortalPage,
    config: &'a HarvestConfig,
    selectors: PortalSelectors,
    delay: JitterDelay,
}

impl<'a> Navigator<'a> {
    pub fn new(page: &'a dyn PortalPage, config: &'a HarvestConfig) -> Self {
        Self {
            page,
            config,
            selectors: PortalSelectors::from_config(config),
            delay: JitterDelay::from_timing(&config.timing),
        }
    }

    pub fn page(&self) -> &'a dyn PortalPage {
        self.page
    }

    pub fn config(&self) -> &'a HarvestConfig {
        self.config
    }

    pub fn selectors(&self) -> &PortalSelectors {
        &self.selectors
    }

    /// `true` iff something matches and the first match is visible.
    /// Lookup failures count as "absent", except a dead browser.
    pub async fn exists_visible(&self, selector: &Selector) -> HarvestResult<bool> {
        match self.page.probe(selector).await {
            Ok(probe) => Ok(probe.is_visible()),
            Err(HarvestError::BrowserClosed) => Err(HarvestError::BrowserClosed),
            Err(e) => {
                debug!("lookup of '{}' failed, treating as absent: {}", selector, e);
                Ok(false)
            }
        }
    }

    /// Sleep `base_seconds` plus configured jitter.
    pub async fn wait(&self, base_seconds: f64) {
        self.delay.wait(base_seconds).await;
    }

    /// Fail with `Captcha` when the challenge marker is visible.
    pub async fn detect_captcha(&self) -> HarvestResult<()> {
        if self.exists_visible(&self.selectors.captcha).await? {
            return Err(HarvestError::Captcha);
        }
        Ok(())
    }

    /// Fail with `Blocked` when the automation/rate-limit marker is visible.
    pub async fn detect_block(&self) -> HarvestResult<()> {
        if self.exists_visible(&self.selectors.blocked).await? {
            return Err(HarvestError::Blocked {
                marker: self.selectors.blocked.to_string(),
            });
        }
        Ok(())
    }

    /// Fail with `Auth` when the current URL looks like a login page.
    pub async fn ensure_authenticated(&self) -> HarvestResult<()> {
        let url = self.page.current_url().await?;
        let marker = self.config.portal.login_url_marker.to_ascii_lowercase();
        if !marker.is_empty() && url.to_ascii_lowercase().contains(&marker) {
            return Err(HarvestError::Auth { url });
        }
        Ok(())
    }

    /// The interruption checks every navigation and interaction is gated on.
    pub async fn checkpoint(&self) -> HarvestResult<()> {
        self.detect_captcha().await?;
        self.detect_block().await
    }

    /// Navigate, wait for load, then verify auth and run the checkpoint.
    pub async fn open(&self, url: &str) -> HarvestResult<()> {
        self.page.goto(url).await?;
        self.wait(self.config.timing.page_load).await;
        self.ensure_authenticated().await?;
        self.checkpoint().await
    }

    /// Total page count from the pagination indicator; `1` when absent or unparsable.
    pub async fn current_page_total(&self) -> HarvestResult<u32> {
        let probe = match self.page.probe(&self.selectors.page_indicator).await {
            Ok(probe) => probe,
            Err(HarvestError::BrowserClosed) => return Err(HarvestError::BrowserClosed),
            Err(e) => {
                debug!("page indicator lookup failed, assuming one page: {}", e);
                return Ok(1);
            }
        };
        Ok(probe
            .first_text
            .as_deref()
            .and_then(parse_page_total)
            .unwrap_or(1))
    }

    pub async fn has_next_page(&self) -> HarvestResult<bool> {
        self.exists_visible(&self.selectors.next_page).await
    }

    /// Checkpoint, click "next", wait, and checkpoint the new page.
    pub async fn click_next_page(&self) -> HarvestResult<()> {
        self.checkpoint().await?;
        self.page.click_first(&self.selectors.next_page).await?;
        self.wait(self.config.timing.after_next_page).await;
        self.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_indicator_variants() {
        assert_eq!(parse_page_total("Page 1 of 3"), Some(3));
        assert_eq!(parse_page_total("2 of 12"), Some(12));
        assert_eq!(parse_page_total("Page 1 OF  7 "), Some(7));
        assert_eq!(parse_page_total("Page 1"), None);
        assert_eq!(parse_page_total("Page 0 of 0"), None);
        assert_eq!(parse_page_total(""), None);
    }
}
