use http::StatusCode;
use thiserror::Error;

use crate::{action::Action, http_utils::ParseError, Context};

/// Errors produced while dispatching, rendering and serving requests.
#[derive(Debug, Error)]
pub enum Error {
    /// A payload could not be serialized by a renderer.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    /// A request body could not be decoded.
    #[error("failed to decode request body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),

    /// A route pattern was rejected by the path matcher.
    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The status a handler returning this error responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Decode(_) => StatusCode::BAD_REQUEST,
            Error::Parse(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Action for Error {
    fn apply(self, ctx: &mut Context<'_>) {
        let status = self.status();

        if let Err(e) = ctx.render(status, &self.to_string()) {
            ctx.fail(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_client_errors() {
        let inner = serde_json::from_str::<u32>("nope").unwrap_err();

        assert_eq!(Error::Decode(inner).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "gone")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
