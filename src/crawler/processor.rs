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

//! Composes fetch -> keyword gate -> store -> anchor scan -> frontier
//! submission for a single frontier entry. Runs on a worker thread; any
//! failure is logged and the task returns, it never escapes to the pool.

use std::sync::Arc;

use encoding_rs::Encoding;
use hashbrown::HashSet;

use crate::anchor::{self, HtmlInput};
use crate::url_ext::{self, UrlExt};

use super::{CrawlCoordinator, FrontierEntry};

impl CrawlCoordinator {
    pub(crate) fn process(self: &Arc<Self>, entry: FrontierEntry) {
        let n = {
            let mut state = self.lock_state();
            state.count += 1;
            state.count
        };
        log::info!("No.{n} URL: {} starting to handle", entry.url);

        if self.skip_extensions.contains(entry.ext.as_str()) {
            log::debug!("No.{n} URL: {} skipping download", entry.url);
            return;
        }

        // Seed page is always stored regardless of keyword; every other
        // page is gated by the configured keyword.
        let keyword = if entry.depth > 0 {
            self.keyword.clone()
        } else {
            None
        };
        let stored_keyword = keyword.clone().unwrap_or_default();

        let response = match self.fetcher.fetch(&entry.url) {
            Ok(response) => response,
            Err(err) => {
                match err.as_status_line() {
                    Some(line) => log::warn!("{line}"),
                    None => log::warn!("{err}"),
                }
                return;
            }
        };

        let should_write = match &keyword {
            None => true,
            Some(kw) => {
                let encoding = response
                    .charset
                    .as_deref()
                    .and_then(Encoding::for_label)
                    .unwrap_or(encoding_rs::UTF_8);
                let (needle, _, _) = encoding.encode(kw);
                contains_subslice(&response.body, &needle)
            }
        };

        if should_write {
            let write_result = self
                .store
                .writer(&self.netloc, entry.url.as_str(), &stored_keyword)
                .and_then(|writer| writer.write(&response.body));

            if let Err(err) = write_result {
                log::error!("{err}");
                return;
            }
        }

        if entry.depth == self.deep {
            return;
        }

        if let Some(mime) = &response.mime {
            if !mime.starts_with("text/html") {
                return;
            }
        }

        let discovered = anchor::links(
            HtmlInput::Bytes(&response.body),
            Some(&entry.url),
            response.charset.as_deref(),
        );

        let unique: HashSet<String> = discovered.into_iter().collect();

        for link in unique {
            self.submit_discovered_link(&link, entry.depth + 1);
        }
    }

    fn submit_discovered_link(&self, link: &str, depth: u32) {
        let Some(parsed) = url_ext::normalize_discovered(link) else {
            return;
        };

        if link.starts_with("http") {
            let Some(candidate_host) = parsed.host_str() else {
                log::debug!("LINK: discarded link {link}");
                return;
            };
            if !self.scope.allows(candidate_host) {
                log::debug!("LINK: discarded link {link}");
                return;
            }
        }

        let ext = parsed.path_extension();
        let mut state = self.lock_state();
        if !state.seen.contains(parsed.as_str()) {
            state.seen.insert(parsed.as_str().to_string());
            log::debug!("LINK: found link {link}");
            state.queue.push_back(FrontierEntry {
                url: parsed,
                ext,
                depth,
            });
        }
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_substring_at_any_position() {
        assert!(contains_subslice(b"hello foo world", b"foo"));
        assert!(!contains_subslice(b"hello world", b"foo"));
    }

    #[test]
    fn empty_needle_always_matches() {
        assert!(contains_subslice(b"anything", b""));
    }

    #[test]
    fn needle_longer_than_haystack_never_matches() {
        assert!(!contains_subslice(b"hi", b"hello"));
    }
}
