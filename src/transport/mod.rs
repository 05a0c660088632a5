//! Request dispatch: mirror resolution and request execution.

pub(crate) mod executor;
pub(crate) mod mirrors;

use crate::errors::Result;
use executor::Executor;
use mirrors::BaseAddress;
use serde_json::Value;
use url::Url;

/// One API call: operation path, query parameters and auth requirement.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    /// Operation name used in errors and logs (e.g. "getBalance").
    pub operation: &'static str,
    /// Path relative to the base address (e.g. "/api/getBalance").
    pub path: &'static str,
    /// Query parameters; `None` values are omitted.
    pub params: Vec<(&'static str, Option<String>)>,
    pub requires_key: bool,
}

impl ApiRequest {
    /// A request that needs an API key.
    pub fn new(operation: &'static str, path: &'static str) -> Self {
        Self {
            operation,
            path,
            params: Vec::new(),
            requires_key: true,
        }
    }

    /// Mark the request as usable without an API key.
    pub fn public(mut self) -> Self {
        self.requires_key = false;
        self
    }

    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, Some(value.into())));
        self
    }

    pub fn opt_param(mut self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        self.params.push((name, value.map(Into::into)));
        self
    }
}

/// Body of a successful call together with the base address that served it.
#[derive(Debug, Clone)]
pub(crate) struct Dispatched {
    pub base_url: Url,
    pub body: Value,
}

/// Sends requests against the session's base address.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    executor: Executor,
    base: BaseAddress,
}

impl Transport {
    pub fn new(executor: Executor, base: BaseAddress) -> Self {
        Self { executor, base }
    }

    /// Validate, resolve a base address if needed, and execute the request.
    pub async fn send(&self, request: &ApiRequest) -> Result<Dispatched> {
        self.executor.check_api_key(request)?;
        self.base.dispatch(&self.executor, request).await
    }

    /// The explicit base address, or the pinned mirror once discovered.
    pub fn base_url(&self) -> Option<Url> {
        self.base.current()
    }

    pub fn has_api_key(&self) -> bool {
        self.executor.has_api_key()
    }
}
