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

//! A breadth-first, single-host-scoped web crawler. See `crawler` for the
//! coordinator that drives the crawl and `config` for the CLI surface.

pub mod anchor;
pub mod charset;
pub mod config;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod pool;
pub mod store;
pub mod url_ext;

pub use error::Error;
