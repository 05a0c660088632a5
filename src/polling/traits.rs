//! Code source trait definition.

use crate::errors::Result;
use crate::types::{NumberId, SmsCodeField};
use std::future::Future;

/// Where the poller gets SMS codes from.
///
/// [`VakSms`](crate::VakSms) implements this against the provider API; tests
/// implement it in memory.
pub trait CodeSource: Send + Sync {
    /// Ask the provider to deliver an SMS to the number (status `send`).
    fn request_delivery(&self, number: &NumberId) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the codes received so far.
    fn check_code(&self, number: &NumberId) -> impl Future<Output = Result<SmsCodeField>> + Send;
}

impl<T: CodeSource> CodeSource for std::sync::Arc<T> {
    fn request_delivery(&self, number: &NumberId) -> impl Future<Output = Result<()>> + Send {
        (**self).request_delivery(number)
    }

    fn check_code(&self, number: &NumberId) -> impl Future<Output = Result<SmsCodeField>> + Send {
        (**self).check_code(number)
    }
}
