//! Job Discovery: walk the paginated listing view and collect job postings.

use crate::core::error::{HarvestError, HarvestResult};
use crate::core::run_context::{RunLog, StopSignal};
use crate::core::types::{Job, LinkInfo};
use crate::scraping::navigator::Navigator;
use regex::Regex;
use std::collections::HashSet;

/// Turn listing anchors into jobs. Anchors whose `href` does not match the
/// pattern are ignored; an empty link text falls back to the id.
pub fn jobs_from_links(links: &[LinkInfo], pattern: &Regex) -> Vec<Job> {
    links
        .iter()
        .filter_map(|link| {
            let id = pattern.captures(&link.href)?.get(1)?.as_str().to_string();
            let title = link.text.trim();
            let title = if title.is_empty() { id.clone() } else { title.to_string() };
            Some(Job { id, title })
        })
        .collect()
}

/// Keep the first occurrence of each id, preserving first-seen order.
pub fn dedup_jobs(jobs: Vec<Job>) -> Vec<Job> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| seen.insert(job.id.clone()))
        .collect()
}

/// Collect every job on the listing view, across all pages.
///
/// Fails with `Auth` on a login redirect and with `Captcha`/`Blocked` when an
/// interruption marker shows up. A listing page that cannot be read or left
/// ends pagination with the jobs collected so far. An empty result is not an
/// error; the caller reports it as a likely cookie problem.
pub async fn collect_all_jobs(
    nav: &Navigator<'_>,
    stop: &StopSignal,
    log: &RunLog,
) -> HarvestResult<Vec<Job>> {
    let config = nav.config();
    let pattern = Regex::new(&config.selectors.job_link_pattern)
        .map_err(|e| HarvestError::Config(format!("selectors.job_link_pattern: {e}")))?;

    log.info(format!(
        "Navigating to job listing: {}",
        config.portal.job_listing_url
    ));
    nav.open(&config.portal.job_listing_url).await?;

    let mut all_jobs = Vec::new();
    let mut page_num: u32 = 1;

    loop {
        if stop.is_requested() {
            log.info("Stop requested during job discovery.");
            break;
        }

        log.info(format!("Scanning job listing page {page_num}..."));
        let links = match log.contain(
            nav.page().links(&nav.selectors().job_links).await,
            &format!("Could not read job links on listing page {page_num}"),
        )? {
            Some(links) => links,
            None => break,
        };
        let found = jobs_from_links(&links, &pattern);
        log.info(format!(
            "  Found {} jobs on page {} ({} links)",
            found.len(),
            page_num,
            links.len()
        ));
        all_jobs.extend(found);

        if !nav.has_next_page().await? {
            break;
        }
        if page_num >= config.max_listing_pages {
            log.warn(format!(
                "Reached the {} listing-page cap; stopping discovery",
                config.max_listing_pages
            ));
            break;
        }

        let moved = log.contain(
            nav.click_next_page().await,
            &format!("Could not move past listing page {page_num}; keeping jobs found so far"),
        )?;
        if moved.is_none() {
            break;
        }
        page_num += 1;
    }

    let unique = dedup_jobs(all_jobs);
    log.info(format!("Total unique jobs found: {}", unique.len()));
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str, text: &str) -> LinkInfo {
        LinkInfo {
            href: href.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn extracts_ids_and_falls_back_to_id_for_title() {
        let pattern = Regex::new(r"/hiring/(\w+)/applies").unwrap();
        let jobs = jobs_from_links(
            &[
                link("/hiring/J100/applies", "  Backend Engineer "),
                link("https://hiring.naukri.com/hiring/J200/applies?src=list", ""),
                link("/hiring/settings", "Settings"),
            ],
            &pattern,
        );
        assert_eq!(
            jobs,
            vec![Job::new("J100", "Backend Engineer"), Job::new("J200", "J200")]
        );
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let jobs = ["A", "B", "A", "C", "B"]
            .iter()
            .map(|id| Job::new(*id, format!("title-{id}")))
            .collect();
        let ids: Vec<String> = dedup_jobs(jobs).into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}
