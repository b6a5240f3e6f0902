use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    /// The current authorization attempt is dead: state mismatch, provider
    /// denial, or a failed code exchange. The user must pair again.
    AuthFlow(String),
    /// No usable access token, or the cloud rejected ours. The stored access
    /// token has been cleared; `TokenStore::is_authorized` tells whether a
    /// refresh can recover or a new pairing is needed.
    Unauthorized(String),
    /// Any other non-2xx from the cloud. Transient: skip the cycle, the next
    /// regular poll retries implicitly.
    Remote { status: u16, message: String },
    InvalidProperty { device: String, name: String, reason: String },
    UnknownDevice(String),
    /// Required configuration is missing or unusable at construction.
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::AuthFlow(msg) => write!(f, "authorization flow failed: {msg}"),
            Error::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Error::Remote { status, message } => {
                write!(f, "cloud API error {status}: {message}")
            }
            Error::InvalidProperty {
                device,
                name,
                reason,
            } => write!(f, "invalid property write {device}/{name}: {reason}"),
            Error::UnknownDevice(id) => write!(f, "unknown device: {id}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
