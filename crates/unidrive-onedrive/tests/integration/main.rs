//! Integration tests for the OneDrive adapter
//!
//! Runs the provider against a wiremock-based mock of the OneDrive REST
//! API: lazy listing refresh, file operations, streaming uploads, and a
//! cross-provider transfer against a mocked Dropbox backend.

mod common;
