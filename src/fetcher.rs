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

//! Performs one HTTP(S) request per page. Gzip transport decoding is
//! handled transparently by reqwest's `gzip` feature. Never panics or
//! propagates a transport failure as anything but an `Error::Transport`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::charset;
use crate::error::Error;

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux i686) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/35.0.1916.153 Safari/537.36";
const ACCEPT_LANGUAGE_STRING: &str = "zh-CN,zh;q=0.8,en;q=0.6";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub mime: Option<String>,
    pub body: Vec<u8>,
    pub charset: Option<String>,
}

/// Seam allowing scenario tests to drive the page processor without real
/// sockets, grounded on the `DatumStream` trait seam the teacher uses for
/// the same reason.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, Error>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE_STRING),
        );

        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .default_headers(headers)
            .user_agent(USER_AGENT_STRING)
            .build()
            .map_err(|e| Error::Anyhow(anyhow::anyhow!(e)))?;

        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::transport(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(url.as_str(), format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (mime, charset_from_header) = split_content_type(content_type.as_deref());

        let body = response
            .bytes()
            .map_err(|e| Error::transport(url.as_str(), e))?
            .to_vec();

        let charset = charset_from_header.or_else(|| charset::detect(&body));

        Ok(FetchResponse { mime, body, charset })
    }
}

/// Parses the `Content-Type` header with the `mime` crate; falls back to a
/// bare `type/subtype` split when the header isn't strict RFC 7231 (some
/// servers emit a trailing `;` with no parameter, which `Mime::from_str`
/// rejects).
fn split_content_type(content_type: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(content_type) = content_type else {
        return (None, None);
    };

    match content_type.parse::<mime::Mime>() {
        Ok(parsed) => {
            let essence = format!("{}/{}", parsed.type_(), parsed.subtype());
            let charset = parsed.get_param(mime::CHARSET).map(|v| v.to_string());
            (Some(essence), charset)
        }
        Err(_) => {
            let essence = content_type.split(';').next().map(|s| s.trim().to_string());
            (essence, None)
        }
    }
}
