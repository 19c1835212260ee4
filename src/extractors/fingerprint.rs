//! Outbound request identities.
//!
//! Each attempt against the caption surface presents a different browser-like
//! identity so consecutive requests are harder to correlate. The fingerprint is
//! a pure function of its seed; callers draw seeds from their own RNG.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/117.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.5",
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en;q=0.9,en-US;q=0.7",
];

const ACCEPTS: &[&str] = &[
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    "*/*",
];

/// Optional headers a browser may or may not send
const OPTIONAL_HEADERS: &[(&str, &str)] = &[
    ("dnt", "1"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("cache-control", "no-cache"),
];

/// One request identity: user agent plus a header set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFingerprint {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub accept: &'static str,
    pub extra_headers: Vec<(&'static str, &'static str)>,
}

impl RequestFingerprint {
    /// Derive a fingerprint from a seed
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let user_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];
        let accept_language = ACCEPT_LANGUAGES[rng.gen_range(0..ACCEPT_LANGUAGES.len())];
        let accept = ACCEPTS[rng.gen_range(0..ACCEPTS.len())];

        let mut extra_headers: Vec<_> = OPTIONAL_HEADERS
            .iter()
            .copied()
            .filter(|_| rng.gen_bool(0.5))
            .collect();
        extra_headers.shuffle(&mut rng);

        Self {
            user_agent,
            accept_language,
            accept,
            extra_headers,
        }
    }

    /// Header map to attach to a single request
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(self.accept_language));
        headers.insert(ACCEPT, HeaderValue::from_static(self.accept));

        for (name, value) in &self.extra_headers {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        headers
    }
}
