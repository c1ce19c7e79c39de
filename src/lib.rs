pub mod assemble;
pub mod collate;
pub mod compress;
pub mod config;
pub mod cosmology;
pub mod derived;
pub mod enrich;
pub mod error;
pub mod json_source;
pub mod linker;
pub mod matcher;
pub mod particles;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod rank;
pub mod record;
pub mod sources;
pub mod store;
pub mod units;

pub use error::*;
