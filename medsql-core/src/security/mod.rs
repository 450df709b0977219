//! Credential handling.
//!
//! Connection credentials and API keys are injected at runtime (flags,
//! environment, `.env`, interactive prompt) and held in `Zeroizing`
//! containers so they are cleared from memory when dropped.

mod credentials;

pub use credentials::Credentials;
