pub mod client;
pub mod lease_store;
pub mod memory;

pub use lease_store::{LeaseStore, SlateLeaseStore, StoreError};
pub use memory::MemoryLeaseStore;
