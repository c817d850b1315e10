// Stract is an open source web search engine.
// Copyright (C) 2024 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Maintains the frontier, the visited set, and drives the worker pool to
//! quiescence. The one subsystem every other component reports back to.

mod processor;
mod scope;

pub use scope::ScopeMode;
use scope::ScopePredicate;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use hashbrown::HashSet;
use url::Url;

use crate::config::CrawlConfig;
use crate::error::Error;
use crate::fetcher::PageFetcher;
use crate::pool::WorkerPool;
use crate::store::PageStore;
use crate::url_ext::{self, UrlExt};

/// Path extensions whose URLs are discovered (and counted as visited) but
/// never fetched.
const SKIP_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".jpg", ".jpeg", ".jpe", ".gif", ".bmp", ".exe", ".avi", ".rmvb", ".mp4",
    ".mp3", ".wav",
];

#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub ext: String,
    pub depth: u32,
}

struct CoordinatorState {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    count: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

pub struct CrawlCoordinator {
    deep: u32,
    keyword: Option<String>,
    scope: ScopePredicate,
    skip_extensions: HashSet<&'static str>,
    netloc: String,
    pool: WorkerPool,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<PageStore>,
    state: Mutex<CoordinatorState>,
    interrupted: Arc<AtomicBool>,
}

impl CrawlCoordinator {
    pub fn new(
        config: &CrawlConfig,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<PageStore>,
    ) -> Result<Arc<Self>, Error> {
        let host = config
            .seed
            .host_str()
            .ok_or_else(|| Error::Argument("seed URL has no host".to_string()))?
            .to_string();
        let primary_domain = url_ext::primary_domain_of(&host);
        let netloc = config.seed.netloc();
        store.ensure_table(&netloc)?;

        let seed_entry = FrontierEntry {
            ext: config.seed.path_extension(),
            url: config.seed.clone(),
            depth: 0,
        };

        let mut seen = HashSet::new();
        seen.insert(seed_entry.url.as_str().to_string());

        let coordinator = Arc::new(Self {
            scope: ScopePredicate::new(config.scope_mode, &host, &primary_domain),
            deep: config.deep,
            keyword: config.keyword.clone(),
            skip_extensions: SKIP_EXTENSIONS.iter().copied().collect(),
            netloc,
            pool: WorkerPool::new(config.threads),
            fetcher,
            store,
            state: Mutex::new(CoordinatorState {
                queue: VecDeque::from([seed_entry]),
                seen,
                count: 0,
            }),
            interrupted: Arc::new(AtomicBool::new(false)),
        });

        Ok(coordinator)
    }

    /// Installs a SIGINT handler that flips the coordinator's interrupted
    /// flag. Best-effort: if a handler is already installed process-wide
    /// (e.g. a second coordinator in the same test binary), this is a
    /// no-op and cancellation must be driven by `request_interrupt`.
    pub fn install_interrupt_handler(self: &Arc<Self>) {
        let flag = Arc::clone(&self.interrupted);
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        });
    }

    pub fn request_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Drives the pool to quiescence per spec.md 4.F, or performs the
    /// cancellation sequence on interrupt.
    pub fn run(self: &Arc<Self>) -> RunOutcome {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                self.cancel();
                return RunOutcome::Interrupted;
            }

            let next = self.lock_state().queue.pop_front();

            if let Some(entry) = next {
                let coordinator = Arc::clone(self);
                let _ = self.pool.add(move || {
                    coordinator.process(entry);
                });
                continue;
            }

            if self.pool.running() == 0 {
                let state = self.lock_state();
                let quiescent =
                    state.queue.is_empty() && self.pool.pending_tasks() == 0 && self.pool.running() == 0;
                drop(state);

                if quiescent {
                    self.pool.close();
                    break;
                }
            }

            thread::yield_now();
        }

        self.pool.join();
        RunOutcome::Completed
    }

    fn cancel(&self) {
        {
            let state = self.lock_state();
            self.pool.close();
            self.pool.clear_tasks();
            self.pool.kill_all();
            drop(state);
        }

        while self.pool.running() > 0 {
            thread::sleep(Duration::from_millis(10));
        }
        self.pool.join();

        let mut state = self.lock_state();
        state.queue.clear();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchResponse;
    use std::path::Path;

    struct StubFetcher {
        pages: std::collections::HashMap<String, (String, Vec<u8>)>,
    }

    impl PageFetcher for StubFetcher {
        fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
            match self.pages.get(url.as_str()) {
                Some((mime, body)) => Ok(FetchResponse {
                    mime: Some(mime.clone()),
                    body: body.clone(),
                    charset: Some("utf-8".to_string()),
                }),
                None => Err(Error::transport(url.as_str(), "not found")),
            }
        }
    }

    fn config(seed: &str, deep: u32) -> CrawlConfig {
        CrawlConfig {
            seed: url_ext::normalize_seed(seed).unwrap(),
            deep,
            threads: 4,
            dbfile: Path::new(":memory:").to_path_buf(),
            keyword: None,
            scope_mode: ScopeMode::Subdomain,
            logfile: Path::new("spider.log").to_path_buf(),
            loglevel: 5,
        }
    }

    #[test]
    fn seed_only_persists_one_row_at_depth_zero() {
        let pages = maplit::hashmap! {
            "http://h.test/".to_string() => (
                "text/html".to_string(),
                br#"<html><a href="/a">x</a></html>"#.to_vec(),
            ),
        };
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher { pages });
        let store = Arc::new(PageStore::open(Path::new(":memory:")).unwrap());

        let cfg = config("http://h.test/", 0);
        let coordinator = CrawlCoordinator::new(&cfg, fetcher, Arc::clone(&store)).unwrap();
        let outcome = coordinator.run();
        assert_eq!(outcome, RunOutcome::Completed);

        let rows: i64 = store
            .conn_for_test()
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn depth_one_expansion_visits_seed_and_one_link() {
        let pages = maplit::hashmap! {
            "http://h.test/".to_string() => (
                "text/html".to_string(),
                br#"<html><a href="/a">x</a></html>"#.to_vec(),
            ),
            "http://h.test/a".to_string() => (
                "text/html".to_string(),
                b"<html></html>".to_vec(),
            ),
        };
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher { pages });
        let store = Arc::new(PageStore::open(Path::new(":memory:")).unwrap());

        let cfg = config("http://h.test/", 1);
        let coordinator = CrawlCoordinator::new(&cfg, fetcher, Arc::clone(&store)).unwrap();
        coordinator.run();

        let rows: i64 = store
            .conn_for_test()
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn extension_skip_is_visited_but_not_fetched() {
        let mut pages = std::collections::HashMap::new();
        pages.insert(
            "http://h.test/".to_string(),
            (
                "text/html".to_string(),
                br#"<html><a href="logo.css">x</a></html>"#.to_vec(),
            ),
        );
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher { pages });
        let store = Arc::new(PageStore::open(Path::new(":memory:")).unwrap());

        let cfg = config("http://h.test/", 2);
        let coordinator = CrawlCoordinator::new(&cfg, fetcher, Arc::clone(&store)).unwrap();
        coordinator.run();

        let rows: i64 = store
            .conn_for_test()
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn keyword_gating_drops_non_matching_page_but_still_enqueues_its_links() {
        let pages = maplit::hashmap! {
            "http://h.test/".to_string() => (
                "text/html".to_string(),
                br#"<html><a href="/a">x</a></html>"#.to_vec(),
            ),
            "http://h.test/a".to_string() => (
                "text/html".to_string(),
                br#"<html>nothing of interest here<a href="/b">y</a></html>"#.to_vec(),
            ),
            "http://h.test/b".to_string() => (
                "text/html".to_string(),
                b"<html>this page mentions foo</html>".to_vec(),
            ),
        };
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher { pages });
        let store = Arc::new(PageStore::open(Path::new(":memory:")).unwrap());

        let mut cfg = config("http://h.test/", 2);
        cfg.keyword = Some("foo".to_string());
        let coordinator = CrawlCoordinator::new(&cfg, fetcher, Arc::clone(&store)).unwrap();
        coordinator.run();

        let conn = store.conn_for_test();
        let mut stmt = conn
            .prepare("select url from \"_h.test\" order by id")
            .unwrap();
        let urls: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();

        // Seed is stored unconditionally regardless of the keyword; `/a`
        // lacks "foo" so it's dropped, but its link to `/b` is still
        // enqueued and `/b` does contain "foo" so it gets stored too.
        assert_eq!(
            urls,
            vec!["http://h.test/".to_string(), "http://h.test/b".to_string()]
        );
    }

    #[test]
    fn transport_failure_persists_nothing_and_completes_cleanly() {
        let pages = std::collections::HashMap::new();
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher { pages });
        let store = Arc::new(PageStore::open(Path::new(":memory:")).unwrap());

        let cfg = config("http://h.test/", 2);
        let coordinator = CrawlCoordinator::new(&cfg, fetcher, Arc::clone(&store)).unwrap();
        let outcome = coordinator.run();
        assert_eq!(outcome, RunOutcome::Completed);

        let rows: i64 = store
            .conn_for_test()
            .query_row("select count(*) from \"_h.test\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
