//! Run Orchestrator: discovery → filter by ledger → per-job download → ledger update.
//!
//! `Idle → SessionOpen → Discovering → Downloading(i) → Idle | Failed`
//!
//! Only fatal errors (see [`HarvestError::is_fatal`]) end the run early; any
//! other job failure is logged and the job is left out of the ledger so the
//! next run retries it. The browser session is released on every path.

use crate::core::config::HarvestConfig;
use crate::core::error::{HarvestError, HarvestResult};
use crate::core::run_context::{RunLog, StopSignal};
use crate::core::types::{Job, LedgerStats};
use crate::features::progress_ledger::ProgressLedger;
use crate::features::session_store;
use crate::scraping::browser_manager::BrowserSession;
use crate::scraping::navigator::Navigator;
use crate::scraping::page::PortalPage;
use crate::tools::{discovery, download};
use serde_json::Value;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestState {
    Idle,
    SessionOpen,
    Discovering,
    Downloading { index: usize, total: usize },
    Failed,
}

fn log_state(state: HarvestState) {
    info!("harvest_state={:?}", state);
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every remaining job was attempted.
    Completed,
    /// Discovery found nothing (usually expired cookies).
    NoJobs,
    /// The stop signal ended the run between jobs.
    Stopped,
    /// A fatal error ended the run.
    Halted(HarvestError),
}

impl RunOutcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, RunOutcome::Halted(_))
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub jobs_discovered: usize,
    /// Discovered jobs already in the ledger.
    pub jobs_skipped: usize,
    pub jobs_completed: usize,
    /// Jobs that failed with a contained error and stay eligible.
    pub jobs_failed: usize,
    /// Batch downloads triggered in this run.
    pub downloads: u64,
    /// Ledger totals after the run.
    pub stats: LedgerStats,
}

/// Discovered jobs not yet in the ledger, in discovery order.
pub fn remaining_jobs(jobs: &[Job], ledger: &ProgressLedger) -> Vec<Job> {
    jobs.iter()
        .filter(|job| !ledger.is_completed(&job.id))
        .cloned()
        .collect()
}

pub struct Harvester {
    config: HarvestConfig,
    ledger: ProgressLedger,
    stop: StopSignal,
    log: RunLog,
    state: HarvestState,
}

impl Harvester {
    pub fn new(config: HarvestConfig, ledger: ProgressLedger) -> Self {
        Self {
            config,
            ledger,
            stop: StopSignal::new(),
            log: RunLog::new(),
            state: HarvestState::Idle,
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    /// Handle the host keeps to request a cooperative stop.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> ProgressLedger {
        self.ledger
    }

    pub fn state(&self) -> HarvestState {
        self.state
    }

    fn enter(&mut self, state: HarvestState) {
        self.state = state;
        log_state(state);
    }

    /// Full run: normalize cookies, open the browser session, harvest, and
    /// close the session whatever happened.
    ///
    /// `Err` means the run never started (invalid config, rejected cookies, or
    /// no browser session); everything after that is reported through
    /// [`RunReport::outcome`].
    pub async fn run(&mut self, raw_cookies: &[Value]) -> HarvestResult<RunReport> {
        let prepared = self
            .config
            .validate()
            .and_then(|_| session_store::normalize_cookies(raw_cookies));
        let cookies = match prepared {
            Ok(cookies) => cookies,
            Err(e) => {
                self.log.error(format!("Cannot start run: {e}"));
                self.enter(HarvestState::Failed);
                return Err(e);
            }
        };

        self.log.info("Launching browser...");
        let session = match BrowserSession::open(&self.config, &cookies).await {
            Ok(session) => session,
            Err(e) => {
                self.log.error(format!("Error opening browser session: {e}"));
                self.enter(HarvestState::Failed);
                return Err(e);
            }
        };
        self.log.info("Cookies added successfully.");

        let report = self.run_on_page(session.page()).await;
        session.close().await;
        self.log.info("Browser closed.");
        Ok(report)
    }

    /// The crawl-and-download state machine on an already authenticated page.
    pub async fn run_on_page(&mut self, page: &dyn PortalPage) -> RunReport {
        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            jobs_discovered: 0,
            jobs_skipped: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            downloads: 0,
            stats: self.ledger.stats(),
        };

        self.enter(HarvestState::SessionOpen);
        let config = self.config.clone();
        let nav = Navigator::new(page, &config);

        report.outcome = match self.harvest(&nav, &mut report).await {
            Ok(outcome) => {
                self.enter(HarvestState::Idle);
                outcome
            }
            Err(e) => {
                self.enter(HarvestState::Failed);
                RunOutcome::Halted(e)
            }
        };

        report.stats = self.ledger.stats();
        self.log.info(format!(
            "Done! {} jobs processed, {} total batch downloads.",
            report.stats.completed, report.stats.total_downloads
        ));
        report
    }

    async fn harvest(
        &mut self,
        nav: &Navigator<'_>,
        report: &mut RunReport,
    ) -> HarvestResult<RunOutcome> {
        if let Err(e) = self.ledger.mark_started() {
            self.log.error(format!("Cannot write progress ledger: {e}"));
            return Err(e);
        }

        self.enter(HarvestState::Discovering);
        let jobs = match discovery::collect_all_jobs(nav, &self.stop, &self.log).await {
            Ok(jobs) => jobs,
            Err(e) => {
                self.log_interruption(&e);
                return Err(e);
            }
        };
        report.jobs_discovered = jobs.len();

        if jobs.is_empty() && self.stop.is_requested() {
            self.log.info("Stop requested. Progress is saved.");
            return Ok(RunOutcome::Stopped);
        }
        if jobs.is_empty() {
            self.log.warn("No jobs found. Check if cookies are valid.");
            return Ok(RunOutcome::NoJobs);
        }

        let remaining = remaining_jobs(&jobs, &self.ledger);
        report.jobs_skipped = jobs.len() - remaining.len();
        if report.jobs_skipped > 0 {
            self.log.info(format!(
                "Skipping {} already-completed jobs (resuming)",
                report.jobs_skipped
            ));
        }

        let total = remaining.len();
        for (index, job) in remaining.iter().enumerate() {
            if self.stop.is_requested() {
                self.log.info("Stop requested. Progress is saved.");
                return Ok(RunOutcome::Stopped);
            }

            self.enter(HarvestState::Downloading { index, total });
            self.log.info(format!(
                "[Job {}/{}] {} ({})",
                index + 1,
                total,
                job.title,
                job.id
            ));

            match download::download_for_job(nav, job, &self.stop, &self.log).await {
                Ok(count) => {
                    if let Err(e) = self.ledger.mark_complete(&job.id, &job.title, count) {
                        self.log.error(format!(
                            "  Cannot record completion of job {}: {}",
                            job.id, e
                        ));
                        return Err(e);
                    }
                    report.jobs_completed += 1;
                    report.downloads += count;
                    self.log.info(format!("  Completed: {count} batch download(s)"));
                }
                Err(e) if e.is_fatal() => {
                    self.log_interruption(&e);
                    return Err(e);
                }
                Err(e) => {
                    report.jobs_failed += 1;
                    self.log.error(format!(
                        "  Error processing job {}: {} (will retry next run)",
                        job.id, e
                    ));
                    continue;
                }
            }

            nav.wait(self.config.timing.between_jobs).await;
        }

        if self.stop.is_requested() {
            return Ok(RunOutcome::Stopped);
        }
        Ok(RunOutcome::Completed)
    }

    fn log_interruption(&self, err: &HarvestError) {
        match err {
            HarvestError::Captcha => {
                self.log.error(format!("CAPTCHA DETECTED: {err}"));
                self.log.error("Please solve the CAPTCHA manually and restart.");
            }
            HarvestError::Auth { .. } => {
                self.log.error(format!("{err}"));
                self.log.error("Export fresh cookies from a logged-in browser and restart.");
            }
            _ => self.log.error(format!("Run halted: {err}")),
        }
    }
}
