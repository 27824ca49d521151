use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::fetch::{PageLocator, PageSource};
use crate::records;

pub struct ScrapeOptions {
    /// Save after this many new records, on top of the per-page save.
    pub checkpoint_batch: usize,
    /// Pause between pages.
    pub page_delay: Duration,
}

/// Scrape stats returned after completion.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub resumed_from: u32,
    pub pages: u32,
    pub failed_pages: u32,
    pub new_records: usize,
    pub total_records: usize,
    pub header: Vec<String>,
    /// Checkpoint writes, batch and page saves included.
    pub saves: u32,
    /// Pagination ran out (as opposed to stopping on a failure).
    pub completed: bool,
    /// A single-page source failed and nothing was written.
    pub aborted: bool,
}

/// Walk the source's pages from the last checkpoint, saving as we go.
///
/// Records already in the checkpoint are never fetched again: the source is
/// first moved to the saved page, and listings of a half-finished page are
/// skipped. A finished run drops the checkpoint so the next run starts over.
pub async fn run<S: PageSource>(
    source: &mut S,
    store: &CheckpointStore,
    opts: &ScrapeOptions,
) -> Result<ScrapeStats> {
    let mut cp = store.load();
    let mut stats = ScrapeStats {
        resumed_from: cp.page_num,
        header: source.header(),
        ..ScrapeStats::default()
    };
    info!(
        "[{}] Resuming from page {} with {} records already collected",
        source.name(),
        cp.page_num,
        cp.data.len()
    );

    if cp.page_num > 1 {
        source
            .seek(cp.page_num)
            .await
            .with_context(|| format!("Failed to return to page {}", cp.page_num))?;
    }

    let batch = opts.checkpoint_batch.max(1);
    let mut since_save = 0usize;
    let mut skip = cp.page_offset;
    let mut next: Option<PageLocator> = Some(source.locate(cp.page_num));

    while let Some(locator) = next.take() {
        info!("Processing page {}: {}", locator.index, locator.url);

        let page = match source.fetch_page(&locator).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Error fetching page {}: {}", locator.index, e);
                stats.failed_pages += 1;
                if source.pagination().aborts_on_failure() {
                    stats.aborted = true;
                    stats.total_records = cp.data.len();
                    return Ok(stats);
                }
                skip = 0;
                if let Some(index) = source.pagination().index_after_failure(locator.index) {
                    advance(&mut cp, index);
                    save(store, &cp, &mut stats)?;
                    since_save = 0;
                    next = Some(source.locate(index));
                }
                continue;
            }
        };
        stats.pages += 1;

        if !page.header.is_empty() {
            stats.header = page.header.clone();
        }
        if !page.found_listings {
            info!("No listings found on page {}", page.index);
        }

        let width = stats.header.len();
        let found = page.rows.len();
        let following = source.next_page(&page);
        for (idx, row) in page.rows.into_iter().enumerate().skip(skip) {
            cp.data.push(records::fit_width(row, width));
            cp.page_offset = idx + 1;
            stats.new_records += 1;
            since_save += 1;
            if since_save >= batch {
                save(store, &cp, &mut stats)?;
                since_save = 0;
            }
        }
        info!("Found {} records on page {}", found, page.index);
        skip = 0;

        match following {
            Some(locator) => {
                info!("Navigating to page {}", locator.index);
                advance(&mut cp, locator.index);
                save(store, &cp, &mut stats)?;
                since_save = 0;
                tokio::time::sleep(opts.page_delay).await;
                next = Some(locator);
            }
            None => {
                info!("Reached last page");
                stats.completed = true;
            }
        }
    }

    save(store, &cp, &mut stats)?;
    if stats.completed {
        store.clear()?;
    }
    stats.total_records = cp.data.len();
    Ok(stats)
}

fn save(store: &CheckpointStore, cp: &Checkpoint, stats: &mut ScrapeStats) -> Result<()> {
    store.save(&stats.header, cp)?;
    stats.saves += 1;
    Ok(())
}

/// Move the checkpoint to the start of page `index`. Never goes backwards.
fn advance(cp: &mut Checkpoint, index: u32) {
    if index > cp.page_num {
        cp.page_num = index;
        cp.page_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::fetch::{FetchError, PageContent, Pagination};
    use crate::records::Row;

    /// In-memory source serving canned pages; `None` simulates a network failure.
    struct ScriptedSource {
        pages: HashMap<u32, Option<Vec<Row>>>,
        pagination: Pagination,
        /// Pages whose listings never render.
        stalled: Vec<u32>,
        fetched: Vec<u32>,
        seeks: Vec<u32>,
    }

    impl ScriptedSource {
        fn new(pagination: Pagination, pages: Vec<(u32, Option<usize>)>) -> Self {
            let pages = pages
                .into_iter()
                .map(|(index, count)| (index, count.map(|n| rows_for(index, n))))
                .collect();
            Self {
                pages,
                pagination,
                stalled: Vec::new(),
                fetched: Vec::new(),
                seeks: Vec::new(),
            }
        }
    }

    fn rows_for(page: u32, n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| vec![Some(format!("p{}-r{}", page, i)), Some("2020".to_string())])
            .collect()
    }

    impl PageSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn header(&self) -> Vec<String> {
            vec!["Name".to_string(), "Founded".to_string()]
        }

        fn pagination(&self) -> Pagination {
            self.pagination
        }

        fn locate(&self, index: u32) -> PageLocator {
            PageLocator {
                index,
                url: format!("mem://page/{}", index),
            }
        }

        async fn seek(&mut self, index: u32) -> Result<(), FetchError> {
            self.seeks.push(index);
            Ok(())
        }

        async fn fetch_page(&mut self, locator: &PageLocator) -> Result<PageContent, FetchError> {
            self.fetched.push(locator.index);
            if self.stalled.contains(&locator.index) {
                return Err(FetchError::RenderTimeout {
                    page: locator.index,
                    waited_secs: 120,
                });
            }
            match self.pages.get(&locator.index) {
                Some(None) => Err(FetchError::Browser("connection reset".to_string())),
                Some(Some(rows)) => Ok(PageContent {
                    index: locator.index,
                    rows: rows.clone(),
                    found_listings: !rows.is_empty(),
                    has_next_control: self.pages.contains_key(&(locator.index + 1)),
                    ..PageContent::default()
                }),
                None => Ok(PageContent {
                    index: locator.index,
                    ..PageContent::default()
                }),
            }
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("progress.json"), dir.path().join("out.csv"))
    }

    fn opts(batch: usize) -> ScrapeOptions {
        ScrapeOptions {
            checkpoint_batch: batch,
            page_delay: Duration::ZERO,
        }
    }

    fn names(store: &CheckpointStore) -> Vec<String> {
        let mut reader = csv::Reader::from_path(store.csv_path()).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn empty_page_stops_numbered_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(
            Pagination::Numbered { max_pages: 3 },
            vec![(1, Some(4)), (2, Some(0)), (3, Some(4))],
        );

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert_eq!(source.fetched, vec![1, 2]);
        assert!(stats.completed);
        assert_eq!(stats.total_records, 4);
        assert_eq!(names(&store), vec!["p1-r0", "p1-r1", "p1-r2", "p1-r3"]);
    }

    #[tokio::test]
    async fn resumes_at_saved_page_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let earlier: Vec<Row> = (1..=3).flat_map(|p| rows_for(p, 4)).collect();
        store
            .save(
                &["Name".to_string(), "Founded".to_string()],
                &Checkpoint {
                    page_num: 4,
                    data: earlier.clone(),
                    page_offset: 0,
                },
            )
            .unwrap();

        let mut source = ScriptedSource::new(
            Pagination::NextControl,
            vec![(1, Some(4)), (2, Some(4)), (3, Some(4)), (4, Some(3))],
        );
        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert_eq!(source.seeks, vec![4]);
        assert_eq!(source.fetched, vec![4]);
        assert_eq!(stats.resumed_from, 4);
        assert_eq!(stats.new_records, 3);

        let all = names(&store);
        assert_eq!(all.len(), 15);
        let expected: Vec<String> = earlier.iter().map(|r| r[0].clone().unwrap()).collect();
        assert_eq!(all[..12], expected[..]);
        assert_eq!(&all[12..], &["p4-r0", "p4-r1", "p4-r2"]);
    }

    #[tokio::test]
    async fn mid_page_checkpoint_skips_saved_listings() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save(
                &["Name".to_string(), "Founded".to_string()],
                &Checkpoint {
                    page_num: 2,
                    data: rows_for(1, 2).into_iter().chain(rows_for(2, 2)).collect(),
                    page_offset: 2,
                },
            )
            .unwrap();

        let mut source = ScriptedSource::new(
            Pagination::Numbered { max_pages: 2 },
            vec![(1, Some(2)), (2, Some(3))],
        );
        run(&mut source, &store, &opts(5)).await.unwrap();

        assert_eq!(names(&store), vec!["p1-r0", "p1-r1", "p2-r0", "p2-r1", "p2-r2"]);
    }

    #[tokio::test]
    async fn lost_session_leaves_resumable_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(
            Pagination::NextControl,
            vec![(1, Some(7)), (2, None)],
        );

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert_eq!(stats.failed_pages, 1);
        assert!(!stats.completed);
        let cp = store.load();
        assert_eq!(cp.page_num, 2);
        assert_eq!(cp.page_offset, 0);
        assert_eq!(cp.data.len(), 7);
        assert_eq!(names(&store).len(), 7);
    }

    #[tokio::test]
    async fn render_timeout_keeps_checkpoint_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(
            Pagination::NextControl,
            vec![(1, Some(4)), (2, Some(4)), (3, Some(4))],
        );
        source.stalled.push(3);

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert!(!stats.completed);
        assert_eq!(stats.failed_pages, 1);
        assert!(dir.path().join("progress.json").exists());
        let cp = store.load();
        assert_eq!(cp.page_num, 3);
        assert_eq!(cp.data.len(), 8);

        source.stalled.clear();
        source.fetched.clear();
        let resumed = run(&mut source, &store, &opts(5)).await.unwrap();
        assert_eq!(source.seeks, vec![3]);
        assert_eq!(source.fetched, vec![3]);
        assert!(resumed.completed);
        assert_eq!(names(&store).len(), 12);
        assert_eq!(names(&store)[0], "p1-r0");
    }

    #[tokio::test]
    async fn saves_every_batch_within_a_long_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(Pagination::Single, vec![(1, Some(12))]);

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        // after records 5 and 10, then the final save
        assert_eq!(stats.saves, 3);

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(Pagination::Single, vec![(1, Some(4))]);
        let stats = run(&mut source, &store, &opts(5)).await.unwrap();
        assert_eq!(stats.saves, 1);
    }

    #[tokio::test]
    async fn failed_numbered_page_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(
            Pagination::Numbered { max_pages: 3 },
            vec![(1, Some(2)), (2, None), (3, Some(2))],
        );

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert_eq!(source.fetched, vec![1, 2, 3]);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(names(&store), vec!["p1-r0", "p1-r1", "p3-r0", "p3-r1"]);
    }

    #[tokio::test]
    async fn single_page_failure_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(Pagination::Single, vec![(1, None)]);

        let stats = run(&mut source, &store, &opts(5)).await.unwrap();

        assert!(stats.aborted);
        assert!(!store.csv_path().exists());
    }

    #[tokio::test]
    async fn finished_run_forgets_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut source = ScriptedSource::new(Pagination::Single, vec![(1, Some(3))]);

        let stats = run(&mut source, &store, &opts(2)).await.unwrap();

        assert!(stats.completed);
        assert_eq!(store.load(), Checkpoint::default());
        assert_eq!(names(&store).len(), 3);
    }
}
