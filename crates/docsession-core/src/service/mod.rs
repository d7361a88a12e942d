pub mod sweeper;

pub use sweeper::{GcSweeper, SweepReport};
