pub mod error;
pub mod history;
pub mod labels;
pub mod models;
pub mod operators;
pub mod pipeline;
pub mod recipe;
pub mod session;
pub mod shell;

pub use error::{CvError, Result};
pub use history::History;
pub use models::{ContourObject, Operation, Rect};
pub use operators::{FindContoursResult, OperatorResult};
pub use pipeline::{Pipeline, PipelineReport, PipelineStep, StepFailure};
pub use recipe::{OperatorSpec, Recipe};
