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

//! Decides whether a discovered off-site link is in-scope for the crawl.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// `--pridomain`: only the seed's exact host.
    PrimaryDomain,
    /// default: the seed host's primary domain and all its subdomains.
    Subdomain,
}

pub struct ScopePredicate {
    mode: ScopeMode,
    host: String,
    primary_domain: String,
}

impl ScopePredicate {
    pub fn new(mode: ScopeMode, host: &str, primary_domain: &str) -> Self {
        Self {
            mode,
            host: host.to_string(),
            primary_domain: primary_domain.to_string(),
        }
    }

    /// `candidate_host.ends_with(primary_domain)` with no label-boundary
    /// check, matching `original_source/spider.py`'s
    /// `host.endswith(self.dom)` literally.
    pub fn allows(&self, candidate_host: &str) -> bool {
        match self.mode {
            ScopeMode::PrimaryDomain => candidate_host == self.host,
            ScopeMode::Subdomain => candidate_host.ends_with(self.primary_domain.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pridomain_only_matches_exact_host() {
        let scope = ScopePredicate::new(ScopeMode::PrimaryDomain, "a.example.com", "example.com");
        assert!(scope.allows("a.example.com"));
        assert!(!scope.allows("b.example.com"));
        assert!(!scope.allows("evil.org"));
    }

    #[test]
    fn subdomain_mode_matches_any_subdomain() {
        let scope = ScopePredicate::new(ScopeMode::Subdomain, "a.example.com", "example.com");
        assert!(scope.allows("a.example.com"));
        assert!(scope.allows("b.example.com"));
        assert!(!scope.allows("evil.org"));
    }
}
