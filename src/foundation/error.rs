use crate::chain::StepHandle;

/// Result alias used throughout the crate.
pub type SketchResult<T> = Result<T, SketchError>;

#[derive(thiserror::Error, Debug)]
pub enum SketchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("render environment has been cleared")]
    EnvironmentCleared,

    #[error("step {handle} failed: {source}")]
    Step {
        handle: StepHandle,
        #[source]
        source: Box<SketchError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SketchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Strip [`SketchError::Step`] wrappers and return the error raised inside the step.
    pub fn root_cause(&self) -> &SketchError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
