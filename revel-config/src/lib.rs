pub mod build;
pub mod error;
pub mod schema;

pub use build::{ReinforcerKind, build_reinforcer};
pub use error::ConfigError;
pub use schema::ModelConfig;
