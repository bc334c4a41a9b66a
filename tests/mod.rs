//! Integration tests for Subtle
//!
//! Tests are organized by component:
//! - hash_test: Content fingerprint golden values
//! - session_test: Handshake, login/logout, keep-alive, movie lookup
//! - search_test: Strategy fallback, language grouping and ranking
//! - download_test: Payload decoding and subtitle files on disk
//! - cli_test: Argument parsing, JSON output and command handlers
//!
//! Shared XML-RPC builders and mock setup live in `common/`.

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
