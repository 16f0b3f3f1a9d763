pub mod gap_filler;
pub mod timestamps;
