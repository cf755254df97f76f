//! Project index: typed model, loading and validation

mod loader;
mod types;
pub mod validation;

pub use loader::*;
pub use types::*;
pub use validation::build_index;
