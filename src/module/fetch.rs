//! Prologue readers.
//!
//! Local modules (or network modules the information tool already cached)
//! are read from disk. Anything else is fetched with a ranged request after
//! taking a token from the [`RateLimiter`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{RANGE, RETRY_AFTER};

use super::{Module, PROLOGUE_LEN, RateLimiter};
use crate::utils::path::{file_path, is_remote};

/// Source of module prologue bytes.
pub trait SourceReader: Send + Sync {
    /// First [`PROLOGUE_LEN`] bytes of the module (fewer for short modules).
    fn read_prologue(&self, module: &Module) -> io::Result<Vec<u8>>;
}

/// Where a prologue comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn of(module: &Module) -> Self {
        if module.local.is_some() || !is_remote(&module.specifier) {
            Self::Local
        } else {
            Self::Remote
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Default reader: local files first, rate-limited HTTP otherwise.
pub struct PrologueReader {
    limiter: Arc<RateLimiter>,
    client: OnceLock<Client>,
}

impl PrologueReader {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> io::Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(io::Error::other)?;
        Ok(self.client.get_or_init(|| client))
    }

    fn fetch_remote(&self, url: &str) -> io::Result<Vec<u8>> {
        self.limiter.acquire();
        let response = self
            .client()?
            .get(url)
            .header(RANGE, format!("bytes=0-{}", PROLOGUE_LEN - 1))
            .send()
            .map_err(io::Error::other)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            self.limiter.record_rate_limit(retry_after);
            return Err(io::Error::other(format!("{url}: rate limited")));
        }
        let response = response.error_for_status().map_err(io::Error::other)?;
        self.limiter.record_success();

        // Servers may ignore the range and send the whole body
        let mut prologue = Vec::with_capacity(PROLOGUE_LEN);
        response
            .take(PROLOGUE_LEN as u64)
            .read_to_end(&mut prologue)?;
        Ok(prologue)
    }
}

impl SourceReader for PrologueReader {
    fn read_prologue(&self, module: &Module) -> io::Result<Vec<u8>> {
        if let Some(local) = &module.local {
            return read_local(local);
        }
        if is_remote(&module.specifier) {
            return self.fetch_remote(&module.specifier);
        }
        match file_path(&module.specifier) {
            Some(path) => read_local(&path),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no source for `{}`", module.specifier),
            )),
        }
    }
}

fn read_local(path: &Path) -> io::Result<Vec<u8>> {
    let mut prologue = Vec::with_capacity(PROLOGUE_LEN);
    File::open(path)?
        .take(PROLOGUE_LEN as u64)
        .read_to_end(&mut prologue)?;
    Ok(prologue)
}
