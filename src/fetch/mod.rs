#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

use thiserror::Error;

use crate::records::Row;

/// Where a page lives: its 1-based position in the pagination sequence and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocator {
    pub index: u32,
    pub url: String,
}

/// One fetched and extracted page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub index: u32,
    /// Header found on the page itself, if the layout carries one.
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    /// False when the page had no listing container at all.
    pub found_listings: bool,
    pub has_next_control: bool,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("browser session: {0}")]
    Browser(String),
    #[error("cannot reach page {target}: no next control after page {reached}")]
    SeekStalled { target: u32, reached: u32 },
    #[error("listings on page {page} did not render within {waited_secs}s")]
    RenderTimeout { page: u32, waited_secs: u64 },
}

/// How a source decides that another page follows the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Exactly one page; a fetch failure aborts the run.
    Single,
    /// Numbered pages up to a maximum, stopping early at the first page with no listings.
    Numbered { max_pages: u32 },
    /// Follow the page's own "Next" control until it is absent or disabled.
    NextControl,
}

impl Pagination {
    pub fn next_index(self, page: &PageContent) -> Option<u32> {
        match self {
            Pagination::Single => None,
            Pagination::Numbered { max_pages } => {
                (page.index < max_pages && !page.rows.is_empty()).then_some(page.index + 1)
            }
            Pagination::NextControl => page.has_next_control.then_some(page.index + 1),
        }
    }

    /// Page to try after `index` failed to load. Only numbered pages can be skipped.
    pub fn index_after_failure(self, index: u32) -> Option<u32> {
        match self {
            Pagination::Numbered { max_pages } if index < max_pages => Some(index + 1),
            _ => None,
        }
    }

    pub fn aborts_on_failure(self) -> bool {
        matches!(self, Pagination::Single)
    }
}

/// Capability to fetch pages of listings, independent of how they are retrieved.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    fn name(&self) -> &str;

    /// Header to use when a page does not carry its own.
    fn header(&self) -> Vec<String>;

    fn pagination(&self) -> Pagination;

    fn locate(&self, index: u32) -> PageLocator;

    /// Bring the source to page `index` before the first fetch of a resumed run.
    async fn seek(&mut self, _index: u32) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch_page(&mut self, locator: &PageLocator) -> Result<PageContent, FetchError>;

    fn next_page(&self, page: &PageContent) -> Option<PageLocator> {
        self.pagination().next_index(page).map(|i| self.locate(i))
    }
}
