pub mod orchestrator;
pub mod peak;
