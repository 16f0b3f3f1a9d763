pub mod prom;
pub mod sink;
