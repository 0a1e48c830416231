// src/reactor/mod.rs
mod chain;
mod forward;
mod trade;

pub use chain::{ReactorChain, TradeReactor};
pub use forward::{http_client, BufferPolicy, ForwardReactor, HttpClient};
pub use trade::{Trade, MAX_RETAINED_SIZE};

use hyper::{Body, Response, StatusCode};

/// Hard failures of a forwarded exchange. Soft outcomes (no match, no active
/// target, upstream 404) never appear here; they are chain fallthrough.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream responded {0}")]
    UpstreamServerError(StatusCode),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream exchange failed: {0}")]
    Exchange(#[from] hyper::Error),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("invalid upstream uri {0}: {1}")]
    BadTarget(String, String),
}

// Map hard relay failures onto gateway responses for the original caller.
impl From<RelayError> for Response<Body> {
    fn from(err: RelayError) -> Self {
        let message = match err {
            RelayError::UpstreamServerError(_) => "upstream server error",
            RelayError::UpstreamUnreachable(_) => "upstream unreachable",
            RelayError::Exchange(_) => "upstream exchange failed",
            RelayError::Request(_) | RelayError::BadTarget(..) => "bad upstream target",
        };

        Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Body::from(message))
            .unwrap()
    }
}
