//! Mirror discovery and pinning.

use super::executor::Executor;
use super::{ApiRequest, Dispatched};
use crate::errors::{Result, VakSmsError};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

#[cfg(feature = "tracing")]
use tracing::{info, warn};

/// Mirror domains hosting the Vak-SMS API, tried in this order.
pub const DEFAULT_MIRRORS: [&str; 3] = [
    "https://vak-sms.com",
    "https://moresms.net",
    "https://vaksms.ru",
];

/// Parse a base address, making sure its path ends with '/' so that
/// operation paths are joined below it.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|source| VakSmsError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Where a session sends its requests.
#[derive(Debug, Clone)]
pub(crate) enum BaseAddress {
    /// Caller-supplied address; used unconditionally, never probed.
    Explicit(Url),
    /// Discover the first reachable mirror and pin it.
    Discover(MirrorResolver),
}

impl BaseAddress {
    pub async fn dispatch(&self, executor: &Executor, request: &ApiRequest) -> Result<Dispatched> {
        match self {
            Self::Explicit(base) => {
                let body = executor.execute(base, request).await?;
                Ok(Dispatched {
                    base_url: base.clone(),
                    body,
                })
            }
            Self::Discover(resolver) => resolver.dispatch(executor, request).await,
        }
    }

    pub fn current(&self) -> Option<Url> {
        match self {
            Self::Explicit(base) => Some(base.clone()),
            Self::Discover(resolver) => resolver.pinned(),
        }
    }
}

/// Tries candidate mirrors in order and pins the first one that answers
/// with JSON.
///
/// Clones share the pinned address. Discovery is serialized: concurrent
/// first calls wait for the one probing mirrors and then reuse its pin.
#[derive(Debug, Clone)]
pub(crate) struct MirrorResolver {
    candidates: Arc<[Url]>,
    pinned: Arc<OnceCell<Url>>,
    discovery: Arc<Mutex<()>>,
}

impl MirrorResolver {
    pub fn new(candidates: Vec<Url>) -> Self {
        Self {
            candidates: candidates.into(),
            pinned: Arc::new(OnceCell::new()),
            discovery: Arc::new(Mutex::new(())),
        }
    }

    pub fn pinned(&self) -> Option<Url> {
        self.pinned.get().cloned()
    }

    #[cfg(test)]
    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    async fn dispatch(&self, executor: &Executor, request: &ApiRequest) -> Result<Dispatched> {
        if let Some(base) = self.pinned.get() {
            return Self::execute_pinned(executor, base, request).await;
        }

        let _guard = self.discovery.lock().await;
        if let Some(base) = self.pinned.get() {
            return Self::execute_pinned(executor, base, request).await;
        }

        self.discover(executor, request).await
    }

    async fn execute_pinned(
        executor: &Executor,
        base: &Url,
        request: &ApiRequest,
    ) -> Result<Dispatched> {
        let body = executor.execute(base, request).await?;
        Ok(Dispatched {
            base_url: base.clone(),
            body,
        })
    }

    /// Use the current request as the trial request against each candidate.
    ///
    /// Any answer that is JSON, including a provider error, pins the
    /// candidate and is returned as is.
    async fn discover(&self, executor: &Executor, request: &ApiRequest) -> Result<Dispatched> {
        let mut attempted = Vec::with_capacity(self.candidates.len());

        for candidate in self.candidates.iter() {
            match executor.execute(candidate, request).await {
                Err(error) if error.is_connectivity() => {
                    #[cfg(feature = "tracing")]
                    warn!(
                        mirror = %candidate,
                        error = %error,
                        "Failed to connect to mirror, specify a working base url explicitly"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = error;

                    attempted.push(candidate.clone());
                }
                outcome => {
                    #[cfg(feature = "tracing")]
                    info!(mirror = %candidate, "Pinned Vak-SMS mirror");

                    let _ = self.pinned.set(candidate.clone());
                    return outcome.map(|body| Dispatched {
                        base_url: candidate.clone(),
                        body,
                    });
                }
            }
        }

        Err(VakSmsError::NoReachableMirror { attempted })
    }
}
