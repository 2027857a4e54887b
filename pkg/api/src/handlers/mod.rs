pub mod engine;
pub mod leases;
