//! Client builder.

use super::structure::VakSms;
use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, ResponseCache};
use crate::errors::{Result, VakSmsError};
use crate::transport::Transport;
use crate::transport::executor::Executor;
use crate::transport::mirrors::{BaseAddress, DEFAULT_MIRRORS, MirrorResolver, parse_base_url};
use crate::utils::clock::{SharedClock, TokioClock};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring a [`VakSms`] client.
///
/// # Example
///
/// ```rust,ignore
/// use vak_sms::VakSms;
/// use std::time::Duration;
///
/// let client = VakSms::builder()
///     .api_key("your_api_key")
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// ```
pub struct VakSmsBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    mirrors: Vec<String>,
    timeout: Duration,
    http_client: Option<ClientWithMiddleware>,
    cache: Option<ResponseCache>,
    cache_capacity: usize,
    cache_ttl: Duration,
    clock: Option<SharedClock>,
    soft_id: Option<String>,
}

impl Default for VakSmsBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http_client: None,
            cache: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            clock: None,
            soft_id: None,
        }
    }
}

impl VakSmsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key. An empty key counts as no key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    /// Use this base address for every request instead of discovering a
    /// mirror.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the mirror candidates tried during discovery, in order.
    pub fn mirrors<I, S>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirrors = mirrors.into_iter().map(Into::into).collect();
        self
    }

    /// Per-request timeout.
    ///
    /// Default: 10 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom HTTP client with middleware.
    pub fn http_client(mut self, client: ClientWithMiddleware) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Use an existing cache, shared with every client it is given to.
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Capacity of the client's own cache. Ignored when a cache is injected.
    ///
    /// Default: 100 entries
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// TTL of the client's own cache. Ignored when a cache is injected.
    ///
    /// Default: 1 hour
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Time source for cache expiry and SMS code polling.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Referral identifier sent as `softId` when buying or prolonging numbers.
    pub fn soft_id(mut self, soft_id: impl Into<String>) -> Self {
        self.soft_id = Some(soft_id.into());
        self
    }

    /// Build the [`VakSms`] client.
    pub fn build(self) -> Result<VakSms> {
        let base = match &self.base_url {
            Some(base_url) => BaseAddress::Explicit(parse_base_url(base_url)?),
            None => BaseAddress::Discover(MirrorResolver::new(
                self.mirrors
                    .iter()
                    .map(|mirror| parse_base_url(mirror))
                    .collect::<Result<Vec<_>>>()?,
            )),
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => {
                let client = reqwest::Client::builder()
                    .build()
                    .map_err(VakSmsError::BuildHttpClient)?;
                ClientBuilder::new(client).build()
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));
        let cache = self.cache.unwrap_or_else(|| {
            ResponseCache::with_clock(self.cache_capacity, self.cache_ttl, clock.clone())
        });

        let executor = Executor::new(
            http_client,
            self.api_key.map(SecretString::from),
            self.timeout,
        );

        Ok(VakSms::from_parts(
            Transport::new(executor, base),
            cache,
            clock,
            self.soft_id,
        ))
    }
}
