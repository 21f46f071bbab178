//! Collective operations for data-parallel training.
//!
//! Workers form a ring: every rank reads from its left neighbour (`rank - 1`) and writes to its
//! right neighbour (`rank + 1`). All-reduce, broadcast and metric averaging are built on top of
//! that single pair of links.

mod bootstrap;
mod communicator;
mod compression;
mod error;
mod optimizer;
mod world;

pub use bootstrap::init;
pub use communicator::{Communicator, LocalCommunicator, ReduceOp, TcpCommunicator};
pub use compression::Compression;
pub use error::{CollectiveErr, Result};
pub use optimizer::{DistributedOptimizer, broadcast_optimizer_state, broadcast_parameters};
pub use world::{LOCAL_RANK_VAR, PEERS_VAR, RANK_VAR, WORLD_SIZE_VAR, WorldConfig};
