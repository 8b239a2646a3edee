//! Resource implementations.

pub mod simulated;

pub use simulated::SimulatedResource;
