//! Utility modules: refresh backoff and timeouts.

pub mod backoff;
pub mod timeout;
