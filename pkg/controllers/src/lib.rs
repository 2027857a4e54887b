pub mod expiry;

pub use expiry::{ExpiryController, SweepReport};
