use std::collections::HashSet;

use url::Url;

use crate::config::{PaginationConfig, TargetConfig};
use crate::error::AppError;
use crate::models::Record;
use crate::traits::{Extractor, Fetcher};

/// Records collected from one target, with the number of pages visited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectOutcome {
    pub records: Vec<Record>,
    pub pages: usize,
}

/// Scrapes HTML targets: fetch → extract → follow pagination.
///
/// Generic over the fetcher and extractor so tests run without HTTP.
pub struct StaticScraper<F, E>
where
    F: Fetcher,
    E: Extractor,
{
    fetcher: F,
    extractor: E,
}

impl<F, E> StaticScraper<F, E>
where
    F: Fetcher,
    E: Extractor,
{
    pub fn new(fetcher: F, extractor: E) -> Self {
        Self { fetcher, extractor }
    }

    /// Scrape every start path of `target`.
    ///
    /// Pages that cannot be fetched (network failure, robots.txt, HTTP error)
    /// are logged and skipped. Selector errors abort the target since every
    /// page would fail the same way.
    pub async fn scrape(&self, target: &TargetConfig) -> Result<CollectOutcome, AppError> {
        let base = Url::parse(&target.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid base_url '{}': {e}", target.base_url))
        })?;
        let max_pages = target.pagination.max_pages.max(1);
        let mut outcome = CollectOutcome::default();

        for path in &target.start_paths {
            let start = base.join(path).map_err(|e| {
                AppError::ConfigError(format!("Cannot resolve start path '{path}': {e}"))
            })?;

            let mut visited = HashSet::from([start.to_string()]);
            let mut next = Some(start.to_string());
            let mut page_no = 1;

            while let Some(url) = next.take() {
                tracing::info!(target_name = %target.name, %url, "Scraping");

                let html = match self.fetcher.fetch(&url).await {
                    Ok(html) => html,
                    Err(e) => {
                        tracing::error!(%url, error = %e, "Failed to scrape {}", url);
                        break;
                    }
                };

                let page =
                    self.extractor
                        .extract(&html, &url, &target.selectors, &target.pagination)?;
                outcome.pages += 1;
                tracing::debug!(%url, items = page.records.len(), "Extracted page");
                outcome.records.extend(page.records);

                let candidate = page
                    .next_url
                    .or_else(|| templated_next(&target.pagination, &base, page_no + 1));

                match candidate {
                    Some(link) if page_no < max_pages && visited.insert(link.clone()) => {
                        page_no += 1;
                        next = Some(link);
                    }
                    Some(link) => {
                        tracing::info!(next = %link, "Next page not followed");
                    }
                    None => {}
                }
            }
        }

        tracing::info!(
            target_name = %target.name,
            items = outcome.records.len(),
            pages = outcome.pages,
            "Scraped {} items from {}",
            outcome.records.len(),
            target.name
        );
        Ok(outcome)
    }
}

/// Fill `{page}` in the configured URL template and resolve it.
fn templated_next(pagination: &PaginationConfig, base: &Url, page: usize) -> Option<String> {
    let template = pagination.next_url_template.as_deref()?;
    let filled = template.replace("{page}", &page.to_string());
    base.join(&filled).ok().map(String::from)
}
