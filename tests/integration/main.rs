//! Integration tests for Asset-Mirror
//!
//! These tests use wiremock to stand up origin servers and exercise complete
//! mirrors end-to-end against a temporary destination directory.

mod batch_tests;
mod crawl_tests;
mod revalidation_tests;
