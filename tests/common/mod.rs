mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from cvlab for tests
pub use cvlab::{History, Operation, OperatorSpec, Pipeline, Recipe};
