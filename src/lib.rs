pub mod bootstrap;
pub mod config;
pub mod context;
pub mod csv_reader;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod significance;
pub mod statistics;
pub mod types;

pub use config::{RunConfig, VarianceModel};
pub use error::AssocError;
pub use orchestrator::run_tests;
