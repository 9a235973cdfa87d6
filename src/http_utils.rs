//! This module provides http utility traits and functions for parsing requests from and writing
//! responses to a connection

use std::io::{BufRead, ErrorKind, Read, Write};

use http::{header::CONTENT_LENGTH, StatusCode, Version};
use thiserror::Error;

use crate::{Request, Response};

/// Errors while parsing requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The peer closed the connection before sending a request line.
    #[error("connection closed")]
    Closed,

    #[error("malformed request")]
    MalformedRequest,

    #[error("read error")]
    ReadError,

    #[error("invalid protocol")]
    InvalidProtocolVer,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl ParseError {
    /// The status answered before the connection is closed.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// `Version` Extension trait
pub trait VersionExt: Sized {
    /// Parse `Version` from a `&str`. Returns `Err` if the `&str` isn't a valid version of the HTTP protocol
    fn parse_version(s: &str) -> Result<Self, ParseError>;

    /// Convert a `Version` to a `&str`
    fn as_str(&self) -> &'static str;
}

impl VersionExt for Version {
    fn parse_version(s: &str) -> Result<Version, ParseError> {
        Ok(match s {
            "HTTP/0.9" => Version::HTTP_09,
            "HTTP/1.0" => Version::HTTP_10,
            "HTTP/1.1" => Version::HTTP_11,
            _ => return Err(ParseError::InvalidProtocolVer),
        })
    }

    fn as_str(&self) -> &'static str {
        match *self {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }
}

fn read_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<usize, ParseError> {
    line.clear();

    let n = reader
        .read_line(line)
        .map_err(|_| ParseError::ReadError)?;

    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }

    Ok(n)
}

/// Reads the request line. A connection that goes idle or drops before its first byte is
/// closed rather than malformed.
fn read_request_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<(), ParseError> {
    line.clear();

    match reader.read_line(line) {
        Ok(0) => Err(ParseError::Closed),
        Ok(_) => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }

            Ok(())
        }
        Err(e) if line.is_empty() && is_idle(e.kind()) => Err(ParseError::Closed),
        Err(_) => Err(ParseError::ReadError),
    }
}

fn is_idle(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}

/// Read one request, head and `Content-Length` body, from a source.
///
/// Leaves the source positioned at the start of the next request so the same reader can be
/// used for every request of a kept alive connection. Bodies longer than `max_body` bytes are
/// refused before any of them is read.
pub fn take_request<R>(reader: &mut R, max_body: usize) -> Result<Request, ParseError>
where
    R: BufRead,
{
    let mut line = String::new();

    read_request_line(reader, &mut line)?;

    let mut parts = line.split(' ');

    let method = parts.next().ok_or(ParseError::MalformedRequest)?;
    let uri = parts.next().ok_or(ParseError::MalformedRequest)?;
    let version = parts.next().ok_or(ParseError::MalformedRequest)?;

    let mut req = http::Request::builder()
        .method(method)
        .uri(uri)
        .version(Version::parse_version(version)?);

    loop {
        if read_line(reader, &mut line)? == 0 {
            return Err(ParseError::MalformedRequest);
        }

        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or(ParseError::MalformedRequest)?;

        req = req.header(name.trim(), value.trim());
    }

    let len = match req.headers_ref().and_then(|h| h.get(CONTENT_LENGTH)) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(ParseError::InvalidContentLength)?,
        None => 0,
    };

    if len > max_body {
        return Err(ParseError::PayloadTooLarge { limit: max_body });
    }

    let mut body = Vec::with_capacity(len);

    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut body)
        .map_err(|_| ParseError::ReadError)?;

    if body.len() != len {
        return Err(ParseError::ReadError);
    }

    req.body(body).map_err(|_| ParseError::MalformedRequest)
}

fn write_head_into_buf(buf: &mut Vec<u8>, response: &Response) -> Result<(), std::io::Error> {
    write!(buf, "{} {}\r\n", response.version().as_str(), response.status())?;

    for (key, value) in response.headers() {
        buf.write_all(key.as_str().as_bytes())?;

        write!(buf, ": ")?;

        buf.write_all(value.as_bytes())?;

        write!(buf, "\r\n")?;
    }

    write!(buf, "\r\n")?;

    Ok(())
}

pub trait IntoRawBytes {
    fn into_raw_bytes(self) -> Vec<u8>;
}

impl IntoRawBytes for Response {
    fn into_raw_bytes(self) -> Vec<u8> {
        let mut buf = vec![];

        // Writing into a Vec cannot fail
        let _ = write_head_into_buf(&mut buf, &self);

        buf.extend_from_slice(self.body());

        buf
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufReader, Cursor};

    use http::Method;

    use super::*;

    #[test]
    fn joined_requests() {
        let data = "POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /b HTTP/1.1\r\nHost: x\r\n\r\n";

        let mut reader = BufReader::new(Cursor::new(data));

        let first = take_request(&mut reader, 64).unwrap();
        assert_eq!(first.method(), Method::POST);
        assert_eq!(first.uri().path(), "/a");
        assert_eq!(first.body(), b"hi");

        let second = take_request(&mut reader, 64).unwrap();
        assert_eq!(second.method(), Method::GET);
        assert_eq!(second.headers()["host"], "x");
        assert!(second.body().is_empty());

        assert_eq!(take_request(&mut reader, 64).unwrap_err(), ParseError::Closed);
    }

    #[test]
    fn rejects_bad_requests() {
        let parse = |s: &'static str| take_request(&mut BufReader::new(Cursor::new(s)), 64);

        assert_eq!(parse("GET /\r\n\r\n").unwrap_err(), ParseError::MalformedRequest);
        assert_eq!(
            parse("GET / HTTP/9\r\n\r\n").unwrap_err(),
            ParseError::InvalidProtocolVer
        );
        assert_eq!(
            parse("GET / HTTP/1.1\r\nbroken\r\n\r\n").unwrap_err(),
            ParseError::MalformedRequest
        );
        assert_eq!(
            parse("GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n").unwrap_err(),
            ParseError::InvalidContentLength
        );
        assert_eq!(
            parse("GET / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort").unwrap_err(),
            ParseError::ReadError
        );
    }

    #[test]
    fn oversized_bodies_are_refused() {
        let data = "POST / HTTP/1.1\r\nContent-Length: 900000000000000\r\n\r\nx";

        assert_eq!(
            take_request(&mut BufReader::new(Cursor::new(data)), 1024).unwrap_err(),
            ParseError::PayloadTooLarge { limit: 1024 }
        );

        let data = "POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody";

        assert_eq!(
            take_request(&mut BufReader::new(Cursor::new(data)), 4)
                .unwrap()
                .body(),
            b"body"
        );
    }

    /// A source that has nothing to read before its timeout fires.
    struct Idle;

    impl Read for Idle {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "timed out"))
        }
    }

    #[test]
    fn idle_connections_close_quietly() {
        assert_eq!(
            take_request(&mut BufReader::new(Idle), 64).unwrap_err(),
            ParseError::Closed
        );

        let partial = Cursor::new("GET / HT").chain(Idle);

        assert_eq!(
            take_request(&mut BufReader::new(partial), 64).unwrap_err(),
            ParseError::ReadError
        );
    }

    #[test]
    fn response_bytes() {
        let mut response = Response::new(b"{}".to_vec());
        *response.status_mut() = StatusCode::CREATED;
        response
            .headers_mut()
            .insert("content-type", "application/json".parse().unwrap());

        let bytes = response.into_raw_bytes();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\n\r\n{}"
        );
    }
}
