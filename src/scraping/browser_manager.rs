//! Native browser management using `chromiumoxide`.
//!
//! This module owns the browser lifecycle for a harvest run:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Building the launch config (headless by default, automation flag hidden).
//! * [`BrowserSession`]: one browser, one tab, cookies injected, downloads
//!   routed to the configured directory. Opened once per run and closed
//!   exactly once, on every exit path.

use crate::core::config::{BrowserSettings, HarvestConfig};
use crate::core::error::{HarvestError, HarvestResult};
use crate::features::session_store::{self, Cookie};
use crate::scraping::page::CdpPage;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Handler};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `browser.executable` in config, then `CHROME_EXECUTABLE`
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable(config: &HarvestConfig) -> Option<String> {
    if let Some(p) = config.chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    let well_known: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    #[cfg(target_os = "linux")]
    let well_known: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/brave-browser",
        "/usr/local/bin/chromium",
    ];
    #[cfg(target_os = "windows")]
    let well_known: &[&str] = &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    ];
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let well_known: &[&str] = &[];

    well_known
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build a `BrowserConfig` for the harvest session.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag the portal's anti-automation checks look for.
pub fn build_browser_config(
    exe: &str,
    settings: &BrowserSettings,
    request_timeout: std::time::Duration,
) -> HarvestResult<BrowserConfig> {
    let ua = settings
        .user_agent
        .as_deref()
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or(DEFAULT_USER_AGENT);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .request_timeout(request_timeout)
        .viewport(Viewport {
            width: settings.viewport_width,
            height: settings.viewport_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(settings.viewport_width, settings.viewport_height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !settings.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| HarvestError::Session(format!("failed to build browser config: {e}")))
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

fn absolute(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// An authenticated browser session: one browser, one tab.
///
/// Call [`BrowserSession::close`] when done. If the session is dropped
/// without it (panic, early return), `Drop` schedules the close on the
/// current runtime so no Chromium process is left behind.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: CdpPage,
    handler_task: tokio::task::JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the browser, inject `cookies`, and route downloads.
    ///
    /// If anything after launch fails, the browser is closed before the
    /// error is returned.
    pub async fn open(config: &HarvestConfig, cookies: &[Cookie]) -> HarvestResult<Self> {
        let exe = find_chrome_executable(config).ok_or_else(|| {
            HarvestError::Session(
                "no browser found; install Chrome, Chromium, or Brave, or set CHROME_EXECUTABLE"
                    .to_string(),
            )
        })?;

        let download_dir = absolute(&config.paths.download_dir);
        std::fs::create_dir_all(&download_dir).map_err(|e| {
            HarvestError::Session(format!(
                "cannot create download directory {}: {}",
                download_dir.display(),
                e
            ))
        })?;

        info!("Launching browser ({})", exe);
        let deadline = config.timing.navigation_deadline();
        let browser_config = build_browser_config(&exe, &config.browser, deadline)?;
        let (mut browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarvestError::Session(format!("failed to launch {exe}: {e}")))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let prepared: HarvestResult<chromiumoxide::Page> = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| HarvestError::Session(format!("failed to open tab: {e}")))?;

            session_store::inject_into_page(&page, cookies).await?;

            let mut downloads = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
            downloads.download_path = Some(download_dir.to_string_lossy().into_owned());
            browser.execute(downloads).await.map_err(|e| {
                HarvestError::Session(format!("failed to enable downloads: {e}"))
            })?;
            info!("Downloads will be saved to {}", download_dir.display());
            Ok(page)
        }
        .await;

        match prepared {
            Ok(page) => Ok(Self {
                browser: Some(browser),
                page: CdpPage::new(page, closed, deadline),
                handler_task,
            }),
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("Browser close error (non-fatal): {}", close_err);
                }
                handler_task.abort();
                Err(e)
            }
        }
    }

    pub fn page(&self) -> &CdpPage {
        &self.page
    }

    /// Close the browser and stop the CDP handler.
    pub async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.handler_task.abort();
            return;
        };
        warn!("Browser session dropped without close; closing in background");
        // The handler must keep running until the close command is answered.
        let handler = self.handler_task.abort_handle();
        handle.spawn(async move {
            let _ = browser.close().await;
            handler.abort();
        });
    }
}
