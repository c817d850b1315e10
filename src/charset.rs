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

//! Charset detection: a `<meta charset=...>` regex scan first, a
//! statistical sniff as fallback. Never raises — ambiguity just yields
//! `None`.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta.+['"]?.*;?\s*charset=['"]?([^'"\s>]+)['"]?"#)
        .expect("static meta-charset regex is valid")
});

/// Scans `payload` for a `<meta charset=...>` declaration; if absent, runs
/// a statistical byte-frequency sniff over the whole payload.
pub fn detect(payload: &[u8]) -> Option<String> {
    if let Some(captures) = META_CHARSET.captures(payload) {
        let raw = captures.get(1)?.as_bytes();
        if raw.is_ascii() {
            return Some(String::from_utf8_lossy(raw).to_string());
        }
    }
    sniff(payload)
}

/// Statistical sniff via `chardetng`, the maintained Rust port of the
/// detector the original crawler drove through Python's `chardet`.
fn sniff(payload: &[u8]) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(payload, true);
    let encoding = detector.guess(None, true);
    Some(encoding.name().to_string())
}
