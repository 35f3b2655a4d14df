use thiserror::Error;

/// Any failure talking to the catalog service.
///
/// Callers that only need to know "the remote call failed" can treat every
/// variant the same way; the split exists for logging and for the HTTP
/// surface, which reports the upstream status when there is one.
#[derive(Debug, Error)]
pub enum RemoteFetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} -> HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url} rejected the request: {message}")]
    Rejected { url: String, message: String },
}

impl RemoteFetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteFetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] RemoteFetchError),

    #[error("no signed-in account, favorites are unavailable")]
    NoAccount,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
