//! Infrastructure adapters: concrete resources.

pub mod resource;
pub use resource::SimulatedResource;
