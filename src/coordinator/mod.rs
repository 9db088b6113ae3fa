pub mod batch_search;
pub mod search;
pub mod validation;

pub use search::{CoordinatedSearchResult, SearchCoordinator};
