//! Driven Chrome session for directories that paginate client-side.
//!
//! The page sequence only exists inside the session: page N is reached by
//! clicking "Next" N-1 times from the start URL. Logging in is the caller's
//! business; pass the DevTools websocket URL of an already-authenticated
//! Chrome and the source attaches to it instead of launching its own.

use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{FetchError, PageContent, PageLocator, PageSource, Pagination};
use crate::extract::ExtractorKind;

const CLICK_NEXT_JS: &str = r#"(() => {
    const span = [...document.querySelectorAll('span')].find(s => s.textContent.trim() === 'Next');
    const control = span && span.parentElement;
    if (!control || control.className.includes('disabled')) return false;
    control.scrollIntoView(true);
    control.click();
    return true;
})()"#;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BrowserSource {
    name: String,
    start_url: String,
    extractor: ExtractorKind,
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    /// Page the session is currently showing.
    current: u32,
    /// We launched the browser (as opposed to attaching to the user's).
    owned: bool,
    settle: Duration,
    wait_timeout: Duration,
}

fn cdp(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

impl BrowserSource {
    pub async fn open(
        name: &str,
        start_url: &str,
        extractor: ExtractorKind,
        ws_url: Option<&str>,
        settle: Duration,
        wait_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let (browser, mut handler) = match ws_url {
            Some(url) => {
                info!("Attaching to running browser at {}", url);
                Browser::connect(url).await.map_err(cdp)?
            }
            None => {
                let config = BrowserConfig::builder()
                    .with_head()
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-gpu")
                    .build()
                    .map_err(FetchError::Browser)?;
                Browser::launch(config).await.map_err(cdp)?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page(start_url).await.map_err(cdp)?;
        Ok(Self {
            name: name.to_string(),
            start_url: start_url.to_string(),
            extractor,
            browser,
            handler,
            page,
            current: 1,
            owned: ws_url.is_none(),
            settle,
            wait_timeout,
        })
    }

    /// Release the session. An attached browser only loses the tab we opened.
    pub async fn close(mut self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page: {}", e);
        }
        if self.owned {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
    }

    async fn click_next(&mut self) -> Result<bool, FetchError> {
        let clicked: bool = self
            .page
            .evaluate(CLICK_NEXT_JS)
            .await
            .map_err(cdp)?
            .into_value()
            .map_err(cdp)?;
        if clicked {
            self.current += 1;
            tokio::time::sleep(self.settle).await;
        }
        Ok(clicked)
    }

    /// Poll until listing elements appear; a timeout fails the page.
    async fn wait_for_listings(&self) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.wait_timeout;
        let selector = self.extractor.listing_selector();
        while Instant::now() < deadline {
            if let Ok(found) = self.page.find_elements(selector).await {
                if !found.is_empty() {
                    tokio::time::sleep(self.settle).await;
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        warn!("Timeout waiting for listings on page {}", self.current);
        Err(FetchError::RenderTimeout {
            page: self.current,
            waited_secs: self.wait_timeout.as_secs(),
        })
    }
}

impl PageSource for BrowserSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Vec<String> {
        self.extractor.default_header()
    }

    fn pagination(&self) -> Pagination {
        Pagination::NextControl
    }

    fn locate(&self, index: u32) -> PageLocator {
        PageLocator {
            index,
            url: self.start_url.clone(),
        }
    }

    async fn seek(&mut self, index: u32) -> Result<(), FetchError> {
        if index < self.current {
            self.page.goto(self.start_url.as_str()).await.map_err(cdp)?;
            self.current = 1;
        }
        while self.current < index {
            self.wait_for_listings().await?;
            debug!("Skipping ahead from page {}", self.current);
            if !self.click_next().await? {
                return Err(FetchError::SeekStalled {
                    target: index,
                    reached: self.current,
                });
            }
        }
        Ok(())
    }

    async fn fetch_page(&mut self, locator: &PageLocator) -> Result<PageContent, FetchError> {
        if locator.index == self.current + 1 {
            if !self.click_next().await? {
                return Err(FetchError::SeekStalled {
                    target: locator.index,
                    reached: self.current,
                });
            }
        } else if locator.index != self.current {
            self.seek(locator.index).await?;
        }

        self.wait_for_listings().await?;
        let html = self.page.content().await.map_err(cdp)?;
        let extraction = self.extractor.extract(&html);
        Ok(PageContent {
            index: self.current,
            header: extraction.header,
            found_listings: extraction.rows.is_some(),
            rows: extraction.rows.unwrap_or_default(),
            has_next_control: extraction.has_next_control,
        })
    }
}
