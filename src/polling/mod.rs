//! Waiting for SMS codes.

mod config;
mod structure;
mod traits;

pub use config::{PollStrategy, WaitConfig, WaitConfigBuilder};
pub use structure::{PollState, SmsCodePoller, WaitReport};
pub use traits::CodeSource;
