//! Scripted portal used to drive the crawl without a browser.
#![allow(dead_code)]

use async_trait::async_trait;
use resume_harvester::core::config::TimingConfig;
use resume_harvester::navigator::PortalSelectors;
use resume_harvester::scraping::page::{PortalPage, Selector};
use resume_harvester::{ElementProbe, HarvestConfig, HarvestError, HarvestResult, LinkInfo, StopSignal};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Default config with every delay zeroed and the ledger under `dir`.
pub fn test_config(dir: &std::path::Path) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.timing = TimingConfig::immediate();
    config.paths.progress_file = dir.join("progress.json");
    config.paths.download_dir = dir.join("downloads");
    config
}

/// Applicant view of one job.
#[derive(Debug, Clone, Default)]
pub struct FakeJob {
    pub title: String,
    pub pages: u32,
    pub no_responses: bool,
    /// 1-based pages on which the select-all control is missing.
    pub missing_select_all: HashSet<u32>,
    /// Clicking "next" on this page fails.
    pub next_fails_on: Option<u32>,
    /// The CAPTCHA marker shows up as soon as the job page opens.
    pub captcha: bool,
    /// Opening the job redirects to the login page.
    pub login_redirect: bool,
    /// Opening the job fails outright.
    pub open_fails: bool,
    /// The "unauthorised plugin" interstitial shows up when the job opens.
    pub blocked: bool,
    /// The CAPTCHA marker appears on arrival at this page.
    pub captcha_on_page: Option<u32>,
    /// The CAPTCHA marker appears right after the download click on this page.
    pub captcha_after_download_on: Option<u32>,
    /// The page-size dropdown is rendered.
    pub page_size_control: bool,
    /// The CAPTCHA marker appears right after the page-size dropdown opens.
    pub captcha_after_page_size_dropdown: bool,
}

impl FakeJob {
    pub fn new(title: &str, pages: u32) -> Self {
        Self {
            title: title.to_string(),
            pages,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct PortalState {
    url: String,
    listing_page: usize,
    job: Option<String>,
    job_page: u32,
    captcha_visible: bool,
    blocked_visible: bool,
    visited: Vec<String>,
    clicks_under_captcha: Vec<String>,
    downloads: Vec<(String, u32)>,
}

pub struct FakePortal {
    config: HarvestConfig,
    selectors: PortalSelectors,
    listing: Vec<Vec<String>>,
    jobs: HashMap<String, FakeJob>,
    listing_login_redirect: bool,
    listing_next_fails_on: Option<usize>,
    stop_after_download: Option<(String, StopSignal)>,
    state: Mutex<PortalState>,
}

impl FakePortal {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            config: config.clone(),
            selectors: PortalSelectors::from_config(config),
            listing: Vec::new(),
            jobs: HashMap::new(),
            listing_login_redirect: false,
            listing_next_fails_on: None,
            stop_after_download: None,
            state: Mutex::new(PortalState::default()),
        }
    }

    /// One listing page; ids must be registered with [`FakePortal::job`]
    /// unless the test only exercises discovery.
    pub fn listing_page(mut self, ids: &[&str]) -> Self {
        self.listing.push(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn job(mut self, id: &str, job: FakeJob) -> Self {
        self.jobs.insert(id.to_string(), job);
        self
    }

    pub fn listing_redirects_to_login(mut self) -> Self {
        self.listing_login_redirect = true;
        self
    }

    /// Clicking "next" on this 1-based listing page fails.
    pub fn listing_next_fails_on(mut self, page: usize) -> Self {
        self.listing_next_fails_on = Some(page);
        self
    }

    /// Request `stop` once a batch download is clicked on job `id`.
    pub fn stop_after_download_of(mut self, id: &str, stop: StopSignal) -> Self {
        self.stop_after_download = Some((id.to_string(), stop));
        self
    }

    pub fn downloads(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    /// Every click made while the CAPTCHA marker was on screen.
    pub fn clicks_under_captcha(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks_under_captcha.clone()
    }

    fn title_of(&self, id: &str) -> String {
        self.jobs
            .get(id)
            .map(|j| j.title.clone())
            .unwrap_or_else(|| format!("Job {id}"))
    }

    fn current_job(&self, state: &PortalState) -> Option<FakeJob> {
        state.job.as_ref().and_then(|id| self.jobs.get(id)).cloned()
    }

    fn login_url(&self) -> String {
        "https://hiring.naukri.com/login?redirect=1".to_string()
    }
}

fn visible(yes: bool) -> ElementProbe {
    if yes {
        ElementProbe {
            count: 1,
            first_visible: true,
            first_text: None,
        }
    } else {
        ElementProbe::absent()
    }
}

#[async_trait]
impl PortalPage for FakePortal {
    async fn goto(&self, url: &str) -> HarvestResult<()> {
        let mut state = self.state.lock().unwrap();
        state.visited.push(url.to_string());
        state.captcha_visible = false;
        state.blocked_visible = false;

        if url == self.config.portal.job_listing_url {
            state.job = None;
            state.listing_page = 0;
            state.url = if self.listing_login_redirect {
                self.login_url()
            } else {
                url.to_string()
            };
            return Ok(());
        }

        let id = self
            .jobs
            .keys()
            .find(|id| self.config.portal.applies_url(id) == url)
            .cloned()
            .ok_or_else(|| HarvestError::Navigation(format!("404 for {url}")))?;
        let job = &self.jobs[&id];
        if job.open_fails {
            return Err(HarvestError::Navigation(format!("timed out loading {url}")));
        }
        state.url = if job.login_redirect {
            self.login_url()
        } else {
            url.to_string()
        };
        state.captcha_visible = job.captcha || job.captcha_on_page == Some(1);
        state.blocked_visible = job.blocked;
        state.job = Some(id);
        state.job_page = 1;
        Ok(())
    }

    async fn current_url(&self) -> HarvestResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn probe(&self, selector: &Selector) -> HarvestResult<ElementProbe> {
        let state = self.state.lock().unwrap();
        let s = &self.selectors;
        let job = self.current_job(&state);

        if *selector == s.captcha {
            return Ok(visible(state.captcha_visible));
        }
        if *selector == s.blocked {
            return Ok(visible(state.blocked_visible));
        }
        if *selector == s.next_page {
            return Ok(visible(match &job {
                Some(job) => state.job_page < job.pages,
                None => state.listing_page + 1 < self.listing.len(),
            }));
        }
        let Some(job) = job else {
            return Ok(ElementProbe::absent());
        };
        if *selector == s.page_indicator {
            return Ok(ElementProbe {
                count: 1,
                first_visible: true,
                first_text: Some(format!("Page {} of {}", state.job_page, job.pages)),
            });
        }
        if *selector == s.no_responses {
            return Ok(visible(job.no_responses));
        }
        if *selector == s.select_all {
            return Ok(visible(
                !job.no_responses && !job.missing_select_all.contains(&state.job_page),
            ));
        }
        if *selector == s.download_button {
            return Ok(visible(!job.no_responses));
        }
        if *selector == s.page_size_dropdown {
            return Ok(visible(job.page_size_control));
        }
        Ok(ElementProbe::absent())
    }

    async fn click_first(&self, selector: &Selector) -> HarvestResult<()> {
        let mut state = self.state.lock().unwrap();
        let s = &self.selectors;
        let job = self.current_job(&state);
        if state.captcha_visible {
            state.clicks_under_captcha.push(selector.to_string());
        }

        if *selector == s.next_page {
            match job {
                Some(job) => {
                    if job.next_fails_on == Some(state.job_page) {
                        return Err(HarvestError::Interaction(
                            "next control detached".to_string(),
                        ));
                    }
                    if state.job_page >= job.pages {
                        return Err(HarvestError::Interaction("no next page".to_string()));
                    }
                    state.job_page += 1;
                    if job.captcha_on_page == Some(state.job_page) {
                        state.captcha_visible = true;
                    }
                }
                None => {
                    if self.listing_next_fails_on == Some(state.listing_page + 1) {
                        return Err(HarvestError::Navigation(
                            "listing page did not load".to_string(),
                        ));
                    }
                    if state.listing_page + 1 >= self.listing.len() {
                        return Err(HarvestError::Interaction("no next page".to_string()));
                    }
                    state.listing_page += 1;
                }
            }
            return Ok(());
        }
        if *selector == s.select_all && job.is_some() {
            return Ok(());
        }
        if let Some(job) = &job {
            if *selector == s.page_size_dropdown && job.page_size_control {
                if job.captcha_after_page_size_dropdown {
                    state.captcha_visible = true;
                }
                return Ok(());
            }
            if *selector == s.page_size_max_option && job.page_size_control {
                return Ok(());
            }
        }
        if *selector == s.download_button {
            if let Some(id) = state.job.clone() {
                let page = state.job_page;
                state.downloads.push((id.clone(), page));
                if job.as_ref().and_then(|j| j.captcha_after_download_on) == Some(page) {
                    state.captcha_visible = true;
                }
                if let Some((stop_id, stop)) = &self.stop_after_download {
                    if *stop_id == id {
                        stop.request();
                    }
                }
                return Ok(());
            }
        }
        Err(HarvestError::Interaction(format!("no element matches '{selector}'")))
    }

    async fn links(&self, selector: &Selector) -> HarvestResult<Vec<LinkInfo>> {
        let state = self.state.lock().unwrap();
        if *selector != self.selectors.job_links || state.job.is_some() {
            return Ok(Vec::new());
        }
        let ids = self
            .listing
            .get(state.listing_page)
            .cloned()
            .unwrap_or_default();
        Ok(ids
            .iter()
            .map(|id| LinkInfo {
                href: format!("/hiring/{id}/applies"),
                text: self.title_of(id),
            })
            .collect())
    }
}
