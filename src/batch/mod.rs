pub mod engine;

pub use engine::{BatchQueryEngine, ExistenceReport};
