//! The linear edit history: every loaded image and every operator result,
//! plus the currently selected entry.

use std::path::Path;

use image::ImageReader;
use uuid::Uuid;

use crate::error::{CvError, Result};
use crate::models::Operation;
use crate::operators::contours;
use crate::pipeline::PipelineStep;

#[derive(Debug, Clone, Default)]
pub struct History {
    operations: Vec<Operation>,
    selected: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from stored operations; an invalid selection is dropped
    pub(crate) fn restore(operations: Vec<Operation>, selected: Option<usize>) -> Self {
        let selected = selected.filter(|&i| i < operations.len());
        Self { operations, selected }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Operation> {
        self.selected.and_then(|i| self.operations.get(i))
    }

    /// Append an operation and make it the selection
    pub fn push(&mut self, operation: Operation) -> &Operation {
        tracing::debug!(name = operation.name(), "history push");
        self.operations.push(operation);
        let index = self.operations.len() - 1;
        self.selected = Some(index);
        &self.operations[index]
    }

    pub fn select(&mut self, index: usize) -> Result<&Operation> {
        if index >= self.operations.len() {
            return Err(CvError::IndexOutOfRange {
                index,
                len: self.operations.len(),
            });
        }
        self.selected = Some(index);
        Ok(&self.operations[index])
    }

    pub fn select_id(&mut self, id: Uuid) -> Result<&Operation> {
        let index = self
            .operations
            .iter()
            .position(|op| op.id() == id)
            .ok_or_else(|| CvError::invalid("id", format!("no operation with id {id}")))?;
        self.select(index)
    }

    /// Remove the selected operation; the selection moves to the last remaining one
    pub fn delete_selected(&mut self) -> Result<Operation> {
        let index = self.selected.ok_or(CvError::NothingSelected)?;
        let removed = self.operations.remove(index);
        self.selected = self.operations.len().checked_sub(1);
        tracing::debug!(name = removed.name(), "history delete");
        Ok(removed)
    }

    /// The selected operation, provided it carries a non-empty image
    pub fn selected_input(&self) -> Result<&Operation> {
        self.selected()
            .filter(|op| !op.is_empty())
            .ok_or(CvError::NothingSelected)
    }

    /// Run `step` against the selection and append its result.
    ///
    /// On failure nothing is appended and the selection is unchanged.
    pub fn apply(&mut self, step: &dyn PipelineStep) -> Result<&Operation> {
        let parent = self.selected_input()?;
        let parent_name = parent.name().to_string();
        let result = step.process(self)?;

        let name = format!("{parent_name}_{}", result.suffix);
        tracing::info!(step = step.name(), %name, "applied");
        let operation = Operation::new(name, result.image).with_contours(result.contours);
        Ok(self.push(operation))
    }

    /// Decode an image file and push it under its file name
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&Operation> {
        let path = path.as_ref();
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::info!(%name, width = image.width(), height = image.height(), "image loaded");
        Ok(self.push(Operation::new(name, image)))
    }

    pub fn save_selected(&self, path: impl AsRef<Path>) -> Result<()> {
        let operation = self.selected_input()?;
        operation.image().save(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "image saved");
        Ok(())
    }

    /// Draw the selected operation's contour boxes onto the image at `target_index`
    pub fn draw_bounding_rects(&mut self, target_index: usize) -> Result<&Operation> {
        let source = self.selected_input()?;
        let target = self.get(target_index).ok_or(CvError::IndexOutOfRange {
            index: target_index,
            len: self.len(),
        })?;
        let result = contours::draw_bounding_rects(target.image(), source.contours())?;
        let name = format!("{}_{}", source.name(), result.suffix);
        Ok(self.push(Operation::new(name, result.image)))
    }
}
