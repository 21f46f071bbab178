mod model_trainer;
mod param_manager;
mod stats;

pub use model_trainer::ModelTrainer;
pub use param_manager::{BackIter, FrontIter, ParamManager};
pub use stats::{BatchStats, EpochStats};
