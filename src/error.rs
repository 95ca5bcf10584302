use std::io;
use thiserror::Error;

pub type DocplugResult<T> = Result<T, DocplugError>;

/// Error taxonomy for the crate. `TemplateSyntax` is fatal before any I/O;
/// `UnreachableStore`/`LostConnection` always cancel a run; `WriteConcernInvalid`
/// is logged and swallowed; a bare `InsertError` is fatal only when
/// `--stop-on-error` is set (see `pipeline::filter_ingest_error`).
#[derive(Error, Debug, Clone)]
pub enum DocplugError {
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),
    #[error("invalid {0} option")]
    InvalidArgs(String),
    #[error("IO error: {0}")]
    IOError(String),
    #[error("store is unreachable: {0}")]
    UnreachableStore(String),
    #[error("lost connection to store: {0}")]
    LostConnection(String),
    #[error("write concern rejected by store: {0}")]
    WriteConcernInvalid(String),
    #[error("insert error: {0}")]
    InsertError(String),
}

impl From<io::Error> for DocplugError {
    fn from(e: io::Error) -> Self {
        DocplugError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for DocplugError {
    fn from(e: serde_json::Error) -> Self {
        DocplugError::TemplateSyntax(e.to_string())
    }
}
