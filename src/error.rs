use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvError {
    #[error("Image is empty")]
    EmptyImage,

    #[error("{operator} requires a single-channel image, got {channels} channels")]
    NotSingleChannel { operator: &'static str, channels: u8 },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Image range is constant")]
    ConstantImage,

    #[error("No operation selected")]
    NothingSelected,

    #[error("Index {index} is out of range (history has {len} operations)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CvError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        CvError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CvError>;
