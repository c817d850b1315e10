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

//! CLI surface and the runtime config assembled from it.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::crawler::ScopeMode;
use crate::error::Error;
use crate::url_ext;

#[derive(Parser, Debug)]
#[command(
    name = "spider",
    about = "A breadth-first web crawler that persists pages into a per-host SQLite table.",
    disable_version_flag = true
)]
pub struct Args {
    /// Crawl start address. Required.
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Crawl depth.
    #[arg(short = 'd', long = "deep", default_value_t = 7)]
    pub deep: u32,

    /// Log file path.
    #[arg(short = 'f', long = "logfile", default_value = "spider.log")]
    pub logfile: PathBuf,

    /// Log verbosity, 1 (CRITICAL) through 5 (DEBUG).
    #[arg(short = 'l', long = "loglevel", default_value_t = 5)]
    pub loglevel: u8,

    /// Worker thread pool size. `0` is coerced to `1`.
    #[arg(long = "thread", default_value_t = 20)]
    pub thread: usize,

    /// SQLite database file.
    #[arg(long = "dbfile", default_value = "data.db")]
    pub dbfile: PathBuf,

    /// Keyword a page's body must contain to be persisted.
    #[arg(long = "key")]
    pub key: Option<String>,

    /// Crawl only the seed's exact host; by default all subdomains of its
    /// primary domain are in scope too.
    #[arg(short = 'p', long = "pridomain", default_value_t = false)]
    pub pridomain: bool,

    /// Print a self-test marker and exit.
    #[arg(long = "testself", default_value_t = false)]
    pub testself: bool,
}

pub struct CrawlConfig {
    pub seed: Url,
    pub deep: u32,
    pub threads: usize,
    pub dbfile: PathBuf,
    pub keyword: Option<String>,
    pub scope_mode: ScopeMode,
    pub logfile: PathBuf,
    pub loglevel: u8,
}

impl CrawlConfig {
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let raw_url = args
            .url
            .ok_or_else(|| Error::Argument("option -u/--url must not be empty".to_string()))?;

        let seed = url_ext::normalize_seed(&raw_url)
            .map_err(|e| Error::Argument(format!("invalid URL \"{raw_url}\": {e}")))?;

        let scope_mode = if args.pridomain {
            ScopeMode::PrimaryDomain
        } else {
            ScopeMode::Subdomain
        };

        Ok(Self {
            seed,
            deep: args.deep,
            threads: args.thread.max(1),
            dbfile: args.dbfile,
            keyword: args.key,
            scope_mode,
            logfile: args.logfile,
            loglevel: args.loglevel,
        })
    }
}
