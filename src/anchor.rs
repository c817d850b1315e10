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

//! Extracts absolute anchor links from an HTML payload. Tree walking is
//! done with `kuchiki` (html5ever under the hood); decoding policy and
//! href filtering follow spec.md 4.B exactly.

use encoding_rs::Encoding;
use kuchiki::traits::TendrilSink;
use url::Url;

use crate::charset;

pub enum HtmlInput<'a> {
    Bytes(&'a [u8]),
    Text(&'a str),
}

/// Extracts absolute link strings from `input`, resolved against
/// `base_url` when given. Never panics on malformed input; an undecodable
/// payload simply yields no links.
pub fn links(input: HtmlInput<'_>, base_url: Option<&Url>, charset_hint: Option<&str>) -> Vec<String> {
    let text = match input {
        HtmlInput::Text(s) => s.to_string(),
        HtmlInput::Bytes(bytes) => match decode(bytes, charset_hint) {
            Some(text) => text,
            None => return Vec::new(),
        },
    };

    let document = kuchiki::parse_html().one(text);

    let mut out = Vec::new();
    let Ok(anchors) = document.select("a") else {
        return out;
    };

    for anchor in anchors {
        let attrs = anchor.attributes.borrow();
        let Some(href) = attrs.get("href") else {
            continue;
        };

        if href.starts_with("mailto:") || href.starts_with("javascript:") {
            continue;
        }

        let mut link = match href.find('#') {
            Some(pos) => href[..pos].to_string(),
            None => href.to_string(),
        };

        if link.is_empty() {
            continue;
        }

        if let Some(base) = base_url {
            match base.join(&link) {
                Ok(joined) => link = joined.to_string(),
                Err(_) => continue,
            }
        }

        while let Some(stripped) = link.strip_suffix('/') {
            link = stripped.to_string();
        }

        out.push(link);
    }

    out
}

/// Decode policy: strict decode with `charset_hint` first, then fall back
/// to the charset detector with lossy (ignore-errors) decoding, then give
/// up and return `None`.
fn decode(bytes: &[u8], charset_hint: Option<&str>) -> Option<String> {
    if let Some(hint) = charset_hint {
        if let Some(encoding) = Encoding::for_label(hint.as_bytes()) {
            let (text, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return Some(text.into_owned());
            }
        }
    }

    let detected = charset::detect(bytes)?;
    let encoding = Encoding::for_label(detected.as_bytes())?;
    let (text, _, _) = encoding.decode(bytes);
    Some(text.into_owned())
}
