use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::history::History;
use crate::operators::OperatorResult;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
struct DebugConfig {
    /// Root directory for debug outputs
    output_dir: PathBuf,
}

/// Options shared by every run of a pipeline
#[derive(Clone, Debug, Default)]
struct PipelineContext {
    verbose: bool,
    keep_going: bool,
    debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Produce a new image from the history's current selection.
    /// Steps never modify the history themselves; the caller appends the result.
    fn process(&self, history: &History) -> crate::error::Result<OperatorResult>;

    /// Human-readable name for this step (used in logs and debug file names)
    fn name(&self) -> &str;
}

/// A step that failed while the pipeline kept going
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub index: usize,
    pub step: String,
    pub error: String,
}

/// What a pipeline run did to the history
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Names of the operations appended, in order
    pub applied: Vec<String>,
    pub failed: Vec<StepFailure>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Log failing steps and continue with the next one instead of aborting
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.context.keep_going = keep_going;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)
                .with_context(|| format!("Failed to read debug directory {}", output_dir.display()))?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create debug directory {}", output_dir.display()))?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn save_debug(&self, history: &History, file_name: &str) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };
        let Some(operation) = history.selected() else {
            return Ok(());
        };
        let output_path = debug_config.output_dir.join(file_name);
        operation
            .image()
            .save(&output_path)
            .with_context(|| format!("Failed to save debug image {}", output_path.display()))?;
        if self.context.verbose {
            tracing::info!("  Debug: saved {file_name}");
        }
        Ok(())
    }

    /// Apply every step in order, each to the result of the previous one.
    ///
    /// Without keep-going the first failing step aborts the run; the history
    /// still holds everything applied before it.
    pub fn run(&self, history: &mut History) -> Result<PipelineReport> {
        history
            .selected_input()
            .context("Pipeline needs a selected input image")?;
        self.save_debug(history, "00_input.png")?;

        let mut report = PipelineReport::default();
        for (step_idx, step) in self.steps.iter().enumerate() {
            if self.context.verbose {
                tracing::info!("Running step {}: {}", step_idx + 1, step.name());
            }

            match history.apply(step.as_ref()) {
                Ok(operation) => {
                    report.applied.push(operation.name().to_string());
                    if self.context.verbose {
                        tracing::info!("  → {}", operation.display_name());
                    }
                }
                Err(err) if self.context.keep_going => {
                    tracing::warn!(step = step.name(), error = %err, "step failed, continuing");
                    report.failed.push(StepFailure {
                        index: step_idx,
                        step: step.name().to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Step {} ({}) failed", step_idx + 1, step.name()));
                }
            }

            let file_name = format!(
                "{:02}_{}.png",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug(history, &file_name)?;
        }

        Ok(report)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Operation;
    use crate::operators::edges;
    use image::{DynamicImage, GrayImage, Luma};

    struct InvertStep;

    impl PipelineStep for InvertStep {
        fn process(&self, history: &History) -> crate::error::Result<OperatorResult> {
            edges::invert(history.selected_input()?.image())
        }

        fn name(&self) -> &str {
            "invert"
        }
    }

    struct BrokenStep;

    impl PipelineStep for BrokenStep {
        fn process(&self, _history: &History) -> crate::error::Result<OperatorResult> {
            Err(crate::error::CvError::invalid("k", "broken"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn history() -> History {
        let mut history = History::new();
        history.push(Operation::new(
            "in.png",
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([10]))),
        ));
        history
    }

    #[test]
    fn steps_chain_on_the_latest_result() {
        let mut history = history();
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .add_step(Arc::new(InvertStep));
        let report = pipeline.run(&mut history).unwrap();
        assert_eq!(report.applied, vec!["in.png_Invert", "in.png_Invert_Invert"]);
        assert!(report.is_clean());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn failure_aborts_unless_keep_going() {
        let mut history = history();
        let pipeline = Pipeline::new()
            .add_step(Arc::new(BrokenStep))
            .add_step(Arc::new(InvertStep));
        assert!(pipeline.run(&mut history).is_err());
        assert_eq!(history.len(), 1);

        let pipeline = pipeline.with_keep_going(true);
        let report = pipeline.run(&mut history).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].step, "broken");
        assert_eq!(report.applied, vec!["in.png_Invert"]);
    }

    #[test]
    fn empty_history_is_an_error() {
        let mut history = History::new();
        assert!(Pipeline::new().add_step(Arc::new(InvertStep)).run(&mut history).is_err());
    }
}
