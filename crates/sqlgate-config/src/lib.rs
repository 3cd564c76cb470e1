// crates/sqlgate-config/src/lib.rs
// ============================================================================
// Module: sqlgate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for sqlgate.toml semantics.
// Dependencies: sqlgate-sqlite, sqlgate-worker, serde, toml
// ============================================================================

//! ## Overview
//! `sqlgate-config` defines the configuration model for the driver, the
//! worker thread, and telemetry, with strict fail-closed validation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::SqlGateConfig;
pub use config::TelemetryConfig;
pub use config::TelemetrySinkKind;
