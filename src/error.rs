use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol failure: {0}")]
    Protocol(String),
    #[error("unrecognized operating mode '{0}'")]
    Policy(String),
}

pub type PanelResult<T> = Result<T, PanelError>;

impl From<reqwest::Error> for PanelError {
    fn from(err: reqwest::Error) -> Self {
        PanelError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        PanelError::Protocol(err.to_string())
    }
}
