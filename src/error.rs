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

/// Crate-wide error type. Variants line up with the five error kinds the
/// crawl has to distinguish: a failed fetch, an undecodable body, a broken
/// anchor scan, a storage failure, and a bad CLI argument.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad URL \"{url}\": {reason}")]
    Transport { url: String, reason: String },

    #[error("could not decode body as any known charset")]
    Decode,

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("an error occurred: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Formats a transport failure the way the page processor logs it:
    /// `*** ERROR: bad URL "<url>": <reason>`.
    pub fn transport(url: &str, reason: impl std::fmt::Display) -> Self {
        Error::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn as_status_line(&self) -> Option<String> {
        match self {
            Error::Transport { url, reason } => {
                Some(format!("*** ERROR: bad URL \"{url}\": {reason}"))
            }
            _ => None,
        }
    }
}
