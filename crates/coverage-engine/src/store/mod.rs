pub mod fs;
pub mod memory;
pub mod traits;

#[cfg(feature = "distributed-stores")]
pub mod scylla;
