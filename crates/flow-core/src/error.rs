use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Unexpected schema: {0}")]
    Schema(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl FlowError {
    /// True when the failure came from talking to the data source rather
    /// than from the request itself.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, FlowError::Api(_) | FlowError::Schema(_))
    }
}
