use chromiumoxide::error::CdpError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("browser session closed")]
    SessionClosed,

    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl BrowserError {
    /// Whether the browser itself is unusable, as opposed to one page misbehaving.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailed(_) | Self::SessionClosed)
    }
}

impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                Self::SessionClosed
            }
            CdpError::Timeout => Self::Timeout("CDP command timed out".to_string()),
            CdpError::NotFound => Self::SelectorNotFound("element not found".to_string()),
            other => Self::ChromiumError(other.to_string()),
        }
    }
}
