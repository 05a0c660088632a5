//! Vak-SMS client facade.

mod builder;
mod structure;

pub use builder::{DEFAULT_REQUEST_TIMEOUT, VakSmsBuilder};
pub use structure::{DEFAULT_LIST_COUNTRY, VakSms};
