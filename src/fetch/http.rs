use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::{FetchError, PageContent, PageLocator, PageSource, Pagination};
use crate::extract::ExtractorKind;

/// Plain GET + HTML parse. Page N is addressed by URL, so seeking is free.
pub struct HttpSource {
    name: String,
    client: Client,
    first_url: String,
    /// URL template for pages after the first; `{page}` is replaced by the index.
    paged_url: Option<String>,
    pagination: Pagination,
    extractor: ExtractorKind,
}

impl HttpSource {
    pub fn new(
        name: &str,
        first_url: &str,
        paged_url: Option<&str>,
        pagination: Pagination,
        extractor: ExtractorKind,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            name: name.to_string(),
            client,
            first_url: first_url.to_string(),
            paged_url: paged_url.map(str::to_string),
            pagination,
            extractor,
        })
    }

    async fn get(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client.get(url).send().await?.error_for_status()?.text().await
    }
}

/// URL of page `index`: the first page keeps its own URL, later pages use the template.
pub fn page_url(first_url: &str, paged_url: Option<&str>, index: u32) -> String {
    match paged_url {
        Some(template) if index > 1 => template.replace("{page}", &index.to_string()),
        _ => first_url.to_string(),
    }
}

impl PageSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Vec<String> {
        self.extractor.default_header()
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn locate(&self, index: u32) -> PageLocator {
        PageLocator {
            index,
            url: page_url(&self.first_url, self.paged_url.as_deref(), index),
        }
    }

    async fn fetch_page(&mut self, locator: &PageLocator) -> Result<PageContent, FetchError> {
        debug!(url = %locator.url, "GET");
        let html = self.get(&locator.url).await.map_err(|source| FetchError::Http {
            url: locator.url.clone(),
            source,
        })?;

        let extraction = self.extractor.extract(&html);
        Ok(PageContent {
            index: locator.index,
            header: extraction.header,
            found_listings: extraction.rows.is_some(),
            rows: extraction.rows.unwrap_or_default(),
            has_next_control: extraction.has_next_control,
        })
    }
}
