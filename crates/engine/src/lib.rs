#![forbid(unsafe_code)]

mod engine;
mod error;
pub mod payload;
mod store;
mod support;

pub use engine::{MutationEngine, TaskInit};
pub use error::EngineError;
pub use store::{RecordStore, StageDirectory};
