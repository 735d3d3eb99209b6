//! Applicant Download Driver: page through one job's applicants, selecting
//! all and triggering a batch download on each page.

use crate::core::error::HarvestResult;
use crate::core::run_context::{RunLog, StopSignal};
use crate::core::types::Job;
use crate::scraping::navigator::Navigator;

/// Best-effort switch to the largest page size. Never fails the job unless
/// the error is fatal.
async fn maximize_page_size(nav: &Navigator<'_>, log: &RunLog) -> HarvestResult<()> {
    let selectors = nav.selectors();
    let timing = &nav.config().timing;

    if !nav.exists_visible(&selectors.page_size_dropdown).await? {
        log.info("  Page-size control not found; using the portal default");
        return Ok(());
    }

    let attempt = async {
        nav.page().click_first(&selectors.page_size_dropdown).await?;
        nav.wait(timing.after_page_size_dropdown).await;
        nav.checkpoint().await?;
        nav.page().click_first(&selectors.page_size_max_option).await?;
        nav.wait(timing.after_page_size_select).await;
        nav.checkpoint().await
    }
    .await;
    log.contain(attempt, "Could not set maximum page size").map(|_| ())
}

/// Download every applicant page of `job`. Returns the number of batch
/// downloads triggered.
///
/// A page without a select-all control is skipped; a failed page move ends
/// the job early with what was collected so far. Only fatal errors
/// (CAPTCHA, login redirect, block, dead browser) and a failure to open the
/// job page come back as `Err`.
pub async fn download_for_job(
    nav: &Navigator<'_>,
    job: &Job,
    stop: &StopSignal,
    log: &RunLog,
) -> HarvestResult<u64> {
    let config = nav.config();
    let selectors = nav.selectors();
    let timing = &config.timing;

    nav.open(&config.portal.applies_url(&job.id)).await?;

    if nav.exists_visible(&selectors.no_responses).await? {
        log.info(format!("  No responses for job {}; skipping", job.title));
        return Ok(0);
    }

    maximize_page_size(nav, log).await?;

    let total_pages = nav.current_page_total().await?;
    log.info(format!("  {total_pages} page(s) of applicants"));

    let mut downloads: u64 = 0;

    for page_num in 1..=total_pages {
        if stop.is_requested() {
            log.info(format!(
                "  Stop requested; leaving job {} after {} of {} page(s)",
                job.id,
                page_num - 1,
                total_pages
            ));
            break;
        }

        nav.checkpoint().await?;
        log.info(format!(
            "  Page {page_num}/{total_pages}: selecting all & downloading..."
        ));

        if nav.exists_visible(&selectors.select_all).await? {
            let selected = log.contain(
                nav.page().click_first(&selectors.select_all).await,
                "Error clicking Select All",
            )?;
            if selected.is_some() {
                nav.wait(timing.after_select_all).await;
                nav.checkpoint().await?;

                if nav.exists_visible(&selectors.download_button).await? {
                    let clicked = log.contain(
                        nav.page().click_first(&selectors.download_button).await,
                        "Error clicking Download",
                    )?;
                    if clicked.is_some() {
                        nav.wait(timing.after_download).await;
                        downloads += 1;
                        log.info(format!("  Downloaded batch from page {page_num}"));
                    }
                } else {
                    log.warn(format!("  Download button not found on page {page_num}"));
                }
            }
        } else {
            log.warn(format!("  Select All not found on page {page_num}; skipping"));
        }

        if page_num < total_pages {
            if !nav.has_next_page().await? {
                log.warn(format!(
                    "  No next-page control after page {page_num}; stopping this job early"
                ));
                break;
            }
            let moved = log.contain(nav.click_next_page().await, "Error navigating to next page")?;
            if moved.is_none() {
                break;
            }
        }
    }

    Ok(downloads)
}
