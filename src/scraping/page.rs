//! The portal page seam.
//!
//! [`PortalPage`] is the narrow set of DOM operations the crawl needs. The
//! production implementation, [`CdpPage`], drives a chromiumoxide tab by
//! evaluating small DOM scripts; tests drive the state machine with a
//! scripted fake.

use crate::core::error::{HarvestError, HarvestResult};
use crate::core::types::{ElementProbe, LinkInfo};
use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A parsed element selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    /// Innermost element whose whitespace-collapsed text contains the needle
    /// (case-insensitive).
    Text(String),
}

impl Selector {
    /// `text=<needle>` becomes [`Selector::Text`]; everything else is CSS.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix("text=") {
            Some(needle) => Selector::Text(needle.trim().trim_matches('"').to_string()),
            None => Selector::Css(raw.to_string()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Selector::Css(_) => "css",
            Selector::Text(_) => "text",
        }
    }

    fn value(&self) -> &str {
        match self {
            Selector::Css(v) | Selector::Text(v) => v,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{css}"),
            Selector::Text(needle) => write!(f, "text={needle}"),
        }
    }
}

#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate and wait for the load to settle.
    async fn goto(&self, url: &str) -> HarvestResult<()>;

    async fn current_url(&self) -> HarvestResult<String>;

    /// Count matches and report visibility and text of the first one.
    async fn probe(&self, selector: &Selector) -> HarvestResult<ElementProbe>;

    /// Click the first match. Fails with `Interaction` when nothing matches.
    async fn click_first(&self, selector: &Selector) -> HarvestResult<()>;

    /// All matching anchors with their `href` and visible text.
    async fn links(&self, selector: &Selector) -> HarvestResult<Vec<LinkInfo>>;
}

// ── DOM scripts ──────────────────────────────────────────────────────────────

const RESOLVE_FN: &str = r#"
function __rhFind(kind, value) {
    if (kind === 'css') {
        return Array.from(document.querySelectorAll(value));
    }
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const needle = norm(value);
    if (!needle) return [];
    const root = document.body || document.documentElement;
    if (!root) return [];
    const skip = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD']);
    const out = [];
    const walker = document.createTreeWalker(root, NodeFilter.SHOW_ELEMENT);
    let node = walker.currentNode;
    while (node) {
        if (!skip.has(node.tagName) && norm(node.textContent).includes(needle)) {
            const inner = Array.from(node.children).some(
                (c) => !skip.has(c.tagName) && norm(c.textContent).includes(needle)
            );
            if (!inner) out.push(node);
        }
        node = walker.nextNode();
    }
    return out;
}
function __rhVisible(el) {
    if (!el || !el.isConnected) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    if (parseFloat(style.opacity) === 0) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}
"#;

fn script(selector: &Selector, body: &str) -> String {
    // serde_json string encoding doubles as JS string-literal escaping.
    let kind = serde_json::Value::from(selector.kind()).to_string();
    let value = serde_json::Value::from(selector.value()).to_string();
    format!(
        "(() => {{ {RESOLVE_FN}\nconst __els = __rhFind({kind}, {value});\n{body} }})()"
    )
}

fn probe_script(selector: &Selector) -> String {
    script(
        selector,
        r#"const first = __els[0];
return {
    count: __els.length,
    first_visible: first ? __rhVisible(first) : false,
    first_text: first ? (first.textContent || '').trim() : null
};"#,
    )
}

fn click_script(selector: &Selector) -> String {
    script(
        selector,
        r#"const first = __els[0];
if (!first) return false;
first.scrollIntoView({ block: 'center', inline: 'center' });
first.click();
return true;"#,
    )
}

fn links_script(selector: &Selector) -> String {
    script(
        selector,
        r#"return __els.map((el) => ({
    href: el.getAttribute('href') || '',
    text: (el.textContent || '').replace(/\s+/g, ' ').trim()
}));"#,
    )
}

// ── CDP implementation ───────────────────────────────────────────────────────

/// A live chromiumoxide tab.
///
/// `closed` is flipped by the CDP handler task when the browser connection
/// drops; every call checks it first and reports [`HarvestError::BrowserClosed`].
pub struct CdpPage {
    page: Page,
    closed: Arc<AtomicBool>,
    navigation_timeout: Duration,
}

impl CdpPage {
    pub fn new(page: Page, closed: Arc<AtomicBool>, navigation_timeout: Duration) -> Self {
        Self {
            page,
            closed,
            navigation_timeout,
        }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    fn ensure_open(&self) -> HarvestResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(HarvestError::BrowserClosed)
        } else {
            Ok(())
        }
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> HarvestResult<T> {
        self.ensure_open()?;
        let result = self.page.evaluate(js).await.map_err(|e| {
            if self.closed.load(Ordering::SeqCst) {
                HarvestError::BrowserClosed
            } else {
                HarvestError::Interaction(format!("script evaluation failed: {e}"))
            }
        })?;
        result
            .into_value::<T>()
            .map_err(|e| HarvestError::Interaction(format!("unexpected script result: {e}")))
    }
}

#[async_trait]
impl PortalPage for CdpPage {
    async fn goto(&self, url: &str) -> HarvestResult<()> {
        self.ensure_open()?;
        debug!("cdp: navigating to {}", url);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.ensure_open()?;
                Err(HarvestError::Navigation(format!("{url}: {e}")))
            }
            Err(_) => Err(HarvestError::Navigation(format!(
                "{url}: no response within {}s",
                self.navigation_timeout.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> HarvestResult<String> {
        self.ensure_open()?;
        let url = self
            .page
            .url()
            .await
            .map_err(|e| HarvestError::Navigation(format!("cannot read current URL: {e}")))?;
        Ok(url.unwrap_or_default())
    }

    async fn probe(&self, selector: &Selector) -> HarvestResult<ElementProbe> {
        self.eval(probe_script(selector)).await
    }

    async fn click_first(&self, selector: &Selector) -> HarvestResult<()> {
        let clicked: bool = self.eval(click_script(selector)).await?;
        if clicked {
            Ok(())
        } else {
            Err(HarvestError::Interaction(format!("nothing matches '{selector}'")))
        }
    }

    async fn links(&self, selector: &Selector) -> HarvestResult<Vec<LinkInfo>> {
        self.eval(links_script(selector)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_css_selectors() {
        assert_eq!(
            Selector::parse("text=No responses yet"),
            Selector::Text("No responses yet".into())
        );
        assert_eq!(Selector::parse("text=\"160\""), Selector::Text("160".into()));
        assert_eq!(
            Selector::parse("label.selectAll"),
            Selector::Css("label.selectAll".into())
        );
        assert_eq!(Selector::parse("text=160").to_string(), "text=160");
    }

    #[test]
    fn selector_values_are_escaped_into_scripts() {
        let js = probe_script(&Selector::parse(r#"a[href*="/applies"]"#));
        assert!(js.contains(r#"__rhFind("css", "a[href*=\"/applies\"]")"#));

        let js = click_script(&Selector::Text("it's \"quoted\"".into()));
        assert!(js.contains(r#"__rhFind("text", "it's \"quoted\"")"#));
    }
}
