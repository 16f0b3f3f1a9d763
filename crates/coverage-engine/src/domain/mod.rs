pub mod address;
pub mod types;
