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

use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;

use spider::config::{Args, CrawlConfig};
use spider::crawler::{CrawlCoordinator, RunOutcome};
use spider::fetcher::HttpFetcher;
use spider::logging;
use spider::store::PageStore;

const SELFTEST_MARKER: &str = "...............ok.................";

fn main() -> ExitCode {
    // `try_parse` instead of `parse`: a malformed flag must surface through
    // this function's own stdout+exit-1 contract (spec.md 6/7), not clap's
    // default stderr+exit-2 behavior. `-h`/`--help` is the exception — it
    // still prints and exits 0 (there is no `--version` flag; see
    // `disable_version_flag` on `Args`).
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == ErrorKind::DisplayHelp {
                print!("{err}");
                return ExitCode::SUCCESS;
            }
            println!("{err} (see -h/--help)");
            return ExitCode::FAILURE;
        }
    };

    if args.testself {
        println!("{SELFTEST_MARKER}");
        return ExitCode::SUCCESS;
    }

    let config = match CrawlConfig::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            println!("{err} (see -h/--help)");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&config.logfile, config.loglevel) {
        eprintln!("could not open log file: {err}");
        return ExitCode::FAILURE;
    }

    match run(config) {
        Ok(RunOutcome::Completed) => ExitCode::SUCCESS,
        Ok(RunOutcome::Interrupted) => {
            log::warn!("*** ERROR: KeyboardInterrupt");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: CrawlConfig) -> Result<RunOutcome, spider::Error> {
    let fetcher: Arc<dyn spider::fetcher::PageFetcher> = Arc::new(HttpFetcher::new()?);
    let store = Arc::new(PageStore::open(&config.dbfile)?);

    let coordinator = CrawlCoordinator::new(&config, fetcher, store)?;
    coordinator.install_interrupt_handler();
    Ok(coordinator.run())
}
