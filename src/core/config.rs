use crate::core::error::{HarvestError, HarvestResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// HarvestConfig: file-based config loader (resume-harvester.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "RESUME_HARVESTER_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const CONFIG_FILE_NAME: &str = "resume-harvester.json";
/// Upper bound for any single timing value (one day).
pub const MAX_TIMING_SECONDS: f64 = 86_400.0;

/// Portal URLs. The applies URL is a template containing `{job_id}`.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct PortalConfig {
    pub job_listing_url: String,
    pub job_applies_url: String,
    /// Substring (case-insensitive) of the current URL that signals a login redirect.
    pub login_url_marker: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            job_listing_url: "https://hiring.naukri.com/hiring/job-listing".to_string(),
            job_applies_url: "https://hiring.naukri.com/hiring/{job_id}/applies".to_string(),
            login_url_marker: "login".to_string(),
        }
    }
}

impl PortalConfig {
    pub fn applies_url(&self, job_id: &str) -> String {
        self.job_applies_url.replace("{job_id}", job_id)
    }
}

/// Selectors are CSS unless prefixed with `text=`, which matches the innermost
/// element whose text contains the rest of the string (case-insensitive).
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct SelectorConfig {
    pub job_links: String,
    /// Regex applied to each job link's `href`; capture group 1 is the job id.
    pub job_link_pattern: String,
    pub next_page: String,
    pub page_indicator: String,
    pub select_all: String,
    pub download_button: String,
    pub page_size_dropdown: String,
    pub page_size_max_option: String,
    pub no_responses: String,
    pub captcha: String,
    pub blocked: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            job_links: r#"a[href*="/applies"]"#.to_string(),
            job_link_pattern: r"/hiring/(\w+)/applies".to_string(),
            next_page: "i.ico-expand.next".to_string(),
            page_indicator: "span.page-value".to_string(),
            select_all: "label.selectAll".to_string(),
            download_button: "div.action.allTab".to_string(),
            page_size_dropdown: "div.show-count-selected".to_string(),
            page_size_max_option: "text=160".to_string(),
            no_responses: "text=No responses yet".to_string(),
            captcha: "text=To continue your request please check the box".to_string(),
            blocked: "text=Browser is using an unauthorised plugin".to_string(),
        }
    }
}

/// Delays in seconds. Every wait adds a uniform jitter in `[min_jitter, max_jitter]`.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct TimingConfig {
    pub page_load: f64,
    pub after_page_size_dropdown: f64,
    pub after_page_size_select: f64,
    pub after_select_all: f64,
    pub after_download: f64,
    pub after_next_page: f64,
    pub between_jobs: f64,
    pub min_jitter: f64,
    pub max_jitter: f64,
    pub navigation_timeout: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_load: 5.0,
            after_page_size_dropdown: 2.0,
            after_page_size_select: 4.0,
            after_select_all: 3.0,
            after_download: 8.0,
            after_next_page: 4.0,
            between_jobs: 5.0,
            min_jitter: 1.0,
            max_jitter: 3.0,
            navigation_timeout: 30.0,
        }
    }
}

impl TimingConfig {
    /// All delays zeroed. Used by tests and dry runs against local fixtures.
    pub fn immediate() -> Self {
        Self {
            page_load: 0.0,
            after_page_size_dropdown: 0.0,
            after_page_size_select: 0.0,
            after_select_all: 0.0,
            after_download: 0.0,
            after_next_page: 0.0,
            between_jobs: 0.0,
            min_jitter: 0.0,
            max_jitter: 0.0,
            navigation_timeout: 30.0,
        }
    }

    pub fn navigation_deadline(&self) -> Duration {
        let secs = self.navigation_timeout.clamp(1.0, MAX_TIMING_SECONDS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(30))
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit browser binary; falls back to `CHROME_EXECUTABLE` and auto-discovery.
    pub executable: Option<String>,
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agent: None,
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct PathConfig {
    pub progress_file: PathBuf,
    pub download_dir: PathBuf,
    pub cookies_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from("progress.json"),
            download_dir: PathBuf::from("downloads"),
            cookies_file: PathBuf::from("cookies.json"),
        }
    }
}

/// Top-level config loaded from `resume-harvester.json`.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(default)]
pub struct HarvestConfig {
    pub portal: PortalConfig,
    pub selectors: SelectorConfig,
    pub timing: TimingConfig,
    pub browser: BrowserSettings,
    pub paths: PathConfig,
    /// Upper bound on listing pages scanned in one discovery pass.
    pub max_listing_pages: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            selectors: SelectorConfig::default(),
            timing: TimingConfig::default(),
            browser: BrowserSettings::default(),
            paths: PathConfig::default(),
            max_listing_pages: 500,
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> HarvestResult<()> {
        for (name, raw) in [
            ("portal.job_listing_url", &self.portal.job_listing_url),
            ("portal.job_applies_url", &self.portal.job_applies_url),
        ] {
            url::Url::parse(&raw.replace("{job_id}", "0"))
                .map_err(|e| HarvestError::Config(format!("{name} is not a valid URL: {e}")))?;
        }
        if !self.portal.job_applies_url.contains("{job_id}") {
            return Err(HarvestError::Config(
                "portal.job_applies_url must contain a {job_id} placeholder".to_string(),
            ));
        }

        let pattern = regex::Regex::new(&self.selectors.job_link_pattern)
            .map_err(|e| HarvestError::Config(format!("selectors.job_link_pattern: {e}")))?;
        if pattern.captures_len() < 2 {
            return Err(HarvestError::Config(
                "selectors.job_link_pattern needs a capture group for the job id".to_string(),
            ));
        }

        let t = &self.timing;
        let all = [
            ("page_load", t.page_load),
            ("after_page_size_dropdown", t.after_page_size_dropdown),
            ("after_page_size_select", t.after_page_size_select),
            ("after_select_all", t.after_select_all),
            ("after_download", t.after_download),
            ("after_next_page", t.after_next_page),
            ("between_jobs", t.between_jobs),
            ("min_jitter", t.min_jitter),
            ("max_jitter", t.max_jitter),
            ("navigation_timeout", t.navigation_timeout),
        ];
        for (name, secs) in all {
            if !secs.is_finite() || secs < 0.0 {
                return Err(HarvestError::Config(format!(
                    "timing.{name} must be a non-negative number of seconds (got {secs})"
                )));
            }
            if secs > MAX_TIMING_SECONDS {
                return Err(HarvestError::Config(format!(
                    "timing.{name} must not exceed {MAX_TIMING_SECONDS} seconds (got {secs})"
                )));
            }
        }
        if t.min_jitter > t.max_jitter {
            return Err(HarvestError::Config(format!(
                "timing.min_jitter ({}) exceeds timing.max_jitter ({})",
                t.min_jitter, t.max_jitter
            )));
        }
        if self.max_listing_pages == 0 {
            return Err(HarvestError::Config(
                "max_listing_pages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Browser binary override: config field, then `CHROME_EXECUTABLE` if it exists.
    pub fn chrome_executable_override(&self) -> Option<String> {
        let candidate = self
            .browser
            .executable
            .clone()
            .or_else(|| std::env::var(ENV_CHROME_EXECUTABLE).ok())?;
        let candidate = candidate.trim();
        if !candidate.is_empty() && Path::new(candidate).exists() {
            Some(candidate.to_string())
        } else {
            None
        }
    }
}

/// Read and parse one config file. Errors are reported, not swallowed.
pub fn load_config_file(path: &Path) -> HarvestResult<HarvestConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| HarvestError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str::<HarvestConfig>(&contents)
        .map_err(|e| HarvestError::Config(format!("cannot parse {}: {}", path.display(), e)))
}

/// Load `resume-harvester.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `RESUME_HARVESTER_CONFIG` env var path
/// 2. `./resume-harvester.json`
/// 3. `../resume-harvester.json`
/// 4. `~/.resume-harvester/resume-harvester.json`
///
/// Missing file → `HarvestConfig::default()`.
/// Parse error → log a warning, return `HarvestConfig::default()`.
pub fn load_harvest_config() -> HarvestConfig {
    let mut candidates = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from("..").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".resume-harvester").join(CONFIG_FILE_NAME));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        if !path.exists() {
            continue;
        }
        return match load_config_file(path) {
            Ok(cfg) => {
                tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                HarvestConfig::default()
            }
        };
    }

    HarvestConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        HarvestConfig::default().validate().unwrap();
    }

    #[test]
    fn applies_url_substitutes_job_id() {
        let portal = PortalConfig::default();
        assert_eq!(
            portal.applies_url("abc123"),
            "https://hiring.naukri.com/hiring/abc123/applies"
        );
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let cfg: HarvestConfig = serde_json::from_str(
            r#"{"timing": {"between_jobs": 9.5}, "paths": {"progress_file": "/tmp/p.json"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.timing.between_jobs, 9.5);
        assert_eq!(cfg.timing.page_load, 5.0);
        assert_eq!(cfg.paths.progress_file, PathBuf::from("/tmp/p.json"));
        assert_eq!(cfg.selectors.next_page, "i.ico-expand.next");
    }

    #[test]
    fn rejects_pattern_without_capture_group() {
        let mut cfg = HarvestConfig::default();
        cfg.selectors.job_link_pattern = r"/hiring/\w+/applies".to_string();
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn rejects_inverted_jitter_and_negative_delays() {
        let mut cfg = HarvestConfig::default();
        cfg.timing.min_jitter = 4.0;
        cfg.timing.max_jitter = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = HarvestConfig::default();
        cfg.timing.after_download = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_huge_finite_delays() {
        let mut cfg = HarvestConfig::default();
        cfg.timing.between_jobs = 1e20;
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));

        let mut timing = TimingConfig::immediate();
        timing.navigation_timeout = 1e20;
        assert_eq!(
            timing.navigation_deadline(),
            Duration::from_secs_f64(MAX_TIMING_SECONDS)
        );
    }

    #[test]
    fn rejects_applies_template_without_placeholder() {
        let mut cfg = HarvestConfig::default();
        cfg.portal.job_applies_url = "https://hiring.naukri.com/hiring/applies".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_config_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(HarvestError::Config(_))));
    }
}
