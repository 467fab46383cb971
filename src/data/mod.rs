pub mod compartment;
pub mod dataset;
pub use compartment::Compartment;
pub use dataset::Dataset;
