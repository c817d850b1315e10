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

//! `YYYY-MM-DD HH:MM:SS <message>`, appended to the log file and mirrored
//! to stderr. The `-l` 1-5 scale maps onto `log::LevelFilter` with 5 the
//! most verbose, matching spec.md 6's CRITICAL..DEBUG ordering.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

pub fn level_filter_for(loglevel: u8) -> LevelFilter {
    match loglevel {
        0 | 1 => LevelFilter::Error, // CRITICAL has no direct `log` analogue
        2 => LevelFilter::Error,
        3 => LevelFilter::Warn,
        4 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

struct DualSinkLogger {
    file: Mutex<File>,
}

impl Log for DualSinkLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.args()
        );

        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
        eprintln!("{line}");
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Installs the dual-sink logger as the global `log` backend. Call once,
/// before any crawl state is constructed.
pub fn init(logfile: &Path, loglevel: u8) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(logfile)?;
    let logger = DualSinkLogger {
        file: Mutex::new(file),
    };

    log::set_max_level(level_filter_for(loglevel));
    // `set_boxed_logger` only fails if a logger was already installed,
    // which can't happen outside of tests that call `init` more than once.
    let _ = log::set_boxed_logger(Box::new(logger));

    Ok(())
}
