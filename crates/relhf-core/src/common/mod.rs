pub mod batch;
pub mod config;
pub mod constants;

pub use batch::{map_batch, try_map_batch};
pub use config::{ConfigError, GridConfig, HartreeFockSettings, NucleusConfig, RunConfig};
