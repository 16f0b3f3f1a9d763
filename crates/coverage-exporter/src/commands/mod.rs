pub mod backfill;
pub mod history;
pub mod serve;
