//! Integration test suite for the updater
//!
//! End-to-end tests against a mocked update server. The remote API and the setup
//! downloads are served by `wiremock`, the binary is driven with `assert_cmd`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **fetch**: update info requests, headers, release filtering and merging
//! - **download**: downloads, Content-Disposition names, checksums and setup
//! - **cli**: command line parsing, the self-update hand-off and deployed runs

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli;
mod download;
mod fetch;
