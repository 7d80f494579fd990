//! Sharing replay and allocation-weight optimization.

pub mod optimize;
pub mod simulate;

pub use optimize::{Algorithm, OptimizeConfig, Optimizer, OptimizerProgress, optimize};
pub use simulate::{SharingSimulation, simulate, simulate_total};
