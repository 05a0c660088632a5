//! # Vak-SMS
//!
//! Async client for the [Vak-SMS](https://vak-sms.com) virtual number API.
//!
//! Lease a phone number for a service, wait for the verification code it
//! receives, and release or blacklist the number afterwards. The client
//! finds a reachable mirror domain on its own, caches read-mostly lookups
//! and exposes the code wait as a cancellable future.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vak_sms::{NumberRequest, NumberStatus, VakSms, WaitConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = VakSms::with_api_key("your_api_key")?;
//!
//!     println!("Balance: {}", client.get_balance().await?);
//!
//!     let purchase = client.get_number(&NumberRequest::new("tg")).await?;
//!     for number in purchase.numbers() {
//!         println!("Got number: {}", number.tel.with_plus_prefix());
//!
//!         match client.wait_sms_code(number, &WaitConfig::fast()).await? {
//!             Some(code) => println!("Got code: {code}"),
//!             None => {
//!                 client.set_status(number, NumberStatus::End).await?;
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! VakSms ──► ResponseCache  (country, count and service lookups)
//!    │
//!    ▼
//! Transport ──► MirrorResolver  (first reachable mirror, pinned)
//!    │
//!    ▼
//! Executor  (apiKey, timeout, error classification)
//!
//! SmsCodePoller<S: CodeSource>  (send, then poll until code or timeout)
//! ```
//!
//! ## Features
//!
//! - `tracing` - OpenTelemetry tracing instrumentation (enabled by default)

pub mod cache;
pub mod client;
pub mod errors;
pub mod polling;
pub mod response;
pub(crate) mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types at the crate root
pub use cache::{CacheKey, ResponseCache};
pub use client::{VakSms, VakSmsBuilder};
pub use errors::{ErrorKind, Result, VakSmsError, VakSmsServiceError};
pub use polling::{CodeSource, PollState, PollStrategy, SmsCodePoller, WaitConfig, WaitReport};
pub use tokio_util::sync::CancellationToken;
pub use transport::mirrors::DEFAULT_MIRRORS;
pub use types::{
    CountNumber, CountryOperators, LeasedNumber, NumberId, NumberPurchase, NumberRequest,
    NumberStatus, ServiceInfo, SetStatusResponse, SmsCode, SmsCodeField, Tel,
};
pub use utils::clock::{Clock, ManualClock, SharedClock, TokioClock};
