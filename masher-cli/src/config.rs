//! Configuration module
//!
//! Handles CLI configuration such as the daemon URL.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the masher daemon
    pub masher_url: String,
}
