//! Integration tests for the Dropbox adapter
//!
//! Runs the provider against a wiremock-based mock of the Dropbox REST
//! API: delta synchronization, navigation refresh, chunked resumable
//! uploads and the file operations.

mod test_sync;
