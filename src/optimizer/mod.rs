// src/optimizer/mod.rs
//
// Evolutionary optimizers: a single-function parameter GA and the
// NSGA-II multi-objective optimizer.

pub mod nsga;
pub mod params;

pub use nsga::{
    ConvergencePoint, Direction, GenerationRecord, MultiObjectiveOptimizer, NsgaConfig, Objective,
    Solution,
};
pub use params::{GaConfig, ParameterGeneration, ParameterOptimizer};
