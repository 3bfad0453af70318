pub mod task;
pub mod connection;
pub mod connection_validation;
pub mod dependency;
