//! The writer primitive a `Context` writes its response through.

use http::{HeaderMap, StatusCode, Version};

use crate::Response;

/// The underlying response writer handed to [`Router::dispatch`](crate::Router::dispatch).
///
/// Headers may be modified until `write_header` is called. Implementations only record what
/// they are told; status bookkeeping lives in the `Context`.
pub trait ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

/// A `ResponseWriter` buffering the whole response in memory.
///
/// The transport writes one of these to the connection once the middleware chain returns. It
/// is also the writer used in tests.
#[derive(Debug, Default)]
pub struct Recorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The written status, `200 OK` when nothing was written at all.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as utf-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.body);

        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.version_mut() = Version::HTTP_11;
        *response.headers_mut() = self.headers;

        response
    }
}

impl ResponseWriter for Recorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);

        self.body.extend_from_slice(buf);

        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_is_kept() {
        let mut recorder = Recorder::new();

        recorder.write_header(StatusCode::CREATED);
        recorder.write_header(StatusCode::IM_A_TEAPOT);
        recorder.write(b"hi").unwrap();

        let response = recorder.into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body(), b"hi");
    }
}
