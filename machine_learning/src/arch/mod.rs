pub mod activations;
pub mod layers;
pub mod loss;
mod model;
mod sequential;
mod zoo;

pub use model::Model;
pub use sequential::Sequential;
pub use zoo::{ALEXNET_HIDDEN, alexnet};
