//! Logging initialization module
//!
//! Provides a single initialization point for the logging facility.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log output format
pub const LOG_FORMAT_ENV: &str = "DCADMIN_LOG_FORMAT";

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str =
    "dcadmin_core=info,dcadmin_store=info,dcadmin_engine=info,dcadmin_cli=info";

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output
    Development,
    /// JSON structured output
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

impl Profile {
    /// Pick a profile from a `DCADMIN_LOG_FORMAT` value
    ///
    /// `json` selects [`Profile::Production`]; anything else, including an
    /// unset variable, selects [`Profile::Development`].
    pub fn from_format(format: Option<&str>) -> Self {
        match format.map(|f| f.trim().to_ascii_lowercase()) {
            Some(f) if f == "json" => Profile::Production,
            _ => Profile::Development,
        }
    }

    /// Pick a profile from the process environment
    pub fn from_env() -> Self {
        Self::from_format(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

static INIT_ONCE: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging facility
///
/// Call once at startup. Later calls are no-ops.
///
/// # Profiles
///
/// - **Development**: compact human-readable lines on stderr
/// - **Production**: JSON lines on stderr
/// - **Test**: bare registry; use `init_test_capture()` to record events
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_env_filter(env_filter())
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter())
                .init();
        }
        Profile::Test => {
            tracing_subscriber::registry().init();
        }
    });
}
