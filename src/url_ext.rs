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

//! URL normalization and the small set of host/path queries the crawler
//! needs: primary domain, netloc (for the per-host table name), and the
//! path extension used to drive the skip-extension set.

use percent_encoding::{utf8_percent_encode, CONTROLS};
use url::Url;

pub const DEFAULT_EXTENSION: &str = ".html";

/// Prepends `http://` when the scheme is missing, strips trailing slashes,
/// percent-encodes with the printable-ASCII allowlist, and parses the
/// result. Mirrors `original_source/spider.py`'s `Spider.__init__` prelude.
pub fn normalize_seed(raw: &str) -> Result<Url, url::ParseError> {
    let prefixed = ensure_scheme(raw);
    let trimmed = strip_trailing_slashes(&prefixed);
    let encoded = percent_encode(&trimmed);
    Url::parse(&encoded)
}

/// Same normalization, but for a URL already known to be well-formed
/// (anchor parser output). Trailing slashes are stripped repeatedly per
/// spec.md 4.B ("repeatedly strip a single trailing `/`"); re-parsing
/// keeps the result idempotent.
pub fn normalize_discovered(raw: &str) -> Option<Url> {
    let trimmed = strip_trailing_slashes(raw);
    Url::parse(&trimmed).ok()
}

fn ensure_scheme(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}

fn strip_trailing_slashes(raw: &str) -> String {
    let mut s = raw;
    while let Some(stripped) = s.strip_suffix('/') {
        s = stripped;
    }
    s.to_string()
}

fn percent_encode(raw: &str) -> String {
    utf8_percent_encode(raw, CONTROLS).to_string()
}

pub trait UrlExt {
    /// Host with port, verbatim, used only for the per-crawl table name.
    fn netloc(&self) -> String;

    /// The last two dot-separated labels of the host (the "primary
    /// domain" of spec.md's scope predicate).
    fn primary_domain(&self) -> Option<String>;

    /// Path extension, lowercased and including the leading dot, or
    /// `.html` when the path has none. Mirrors `os.path.splitext`'s
    /// treatment of leading dots (`.bashrc` has no extension).
    fn path_extension(&self) -> String;
}

impl UrlExt for Url {
    fn netloc(&self) -> String {
        let host = self.host_str().unwrap_or_default();
        match self.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn primary_domain(&self) -> Option<String> {
        let host = self.host_str()?;
        Some(primary_domain_of(host))
    }

    fn path_extension(&self) -> String {
        extension_of(self.path())
    }
}

pub fn primary_domain_of(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

pub fn extension_of(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or("");
    let trimmed = last.trim_start_matches('.');
    let offset = last.len() - trimmed.len();
    match trimmed.rfind('.') {
        Some(idx) => last[offset + idx..].to_ascii_lowercase(),
        None => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_missing_scheme() {
        let url = normalize_seed("example.com").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn keeps_https_scheme() {
        let url = normalize_seed("https://example.com/").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn strips_trailing_slashes_repeatedly() {
        let url = normalize_seed("http://h.test///").unwrap();
        assert_eq!(url.as_str(), "http://h.test/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_seed("http://h.test/a/").unwrap();
        let twice = normalize_discovered(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn primary_domain_is_last_two_labels() {
        assert_eq!(primary_domain_of("a.b.example.com"), "example.com");
        assert_eq!(primary_domain_of("example.com"), "example.com");
        assert_eq!(primary_domain_of("localhost"), "localhost");
    }

    #[test]
    fn extension_defaults_to_html() {
        assert_eq!(extension_of("/a/b"), ".html");
        assert_eq!(extension_of("/"), ".html");
        assert_eq!(extension_of("/.bashrc"), ".html");
    }

    #[test]
    fn extension_is_lowercased_last_segment_suffix() {
        assert_eq!(extension_of("/logo.CSS"), ".css");
        assert_eq!(extension_of("/a.tar.gz"), ".gz");
    }

    #[test]
    fn netloc_includes_port_but_not_userinfo() {
        let url = Url::parse("http://user:pw@h.test:8080/x").unwrap();
        assert_eq!(url.netloc(), "h.test:8080");
    }
}
