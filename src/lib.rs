pub mod canvas;
pub mod config;
pub mod domain;
pub mod services;

// Make test_helpers available for integration tests
pub mod test_helpers;
