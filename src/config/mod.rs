//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DialerConfig (validated, immutable)
//!     → SecureDialer::reconfigure (atomic swap)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates the new config
//!     → skipped if equal to the installed config
//!     → SecureDialer::reconfigure
//!     → dials started afterwards observe the new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{DeadlineConfig, DialerConfig, ObservabilityConfig, TlsClientConfig};
