pub mod clock;
pub mod config;
pub mod lease;
pub mod options;
pub mod validate;
