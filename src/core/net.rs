// src/core/net.rs

// HTTP/1.0 over TCP (std-only). The server closes the connection at the
// end, so no chunked transfer to deal with.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Result, ScrapeError};
use crate::params::{TIMEOUT_SECS, USER_AGENT};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One outgoing request. `path` is path + query, starting with `/`.
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Request { method: Method::Get, path: s!(path), headers: Vec::new(), body: None }
    }

    pub fn post_form(path: &str, form: &[(String, String)]) -> Self {
        let body = form_urlencode(form).into_bytes();
        Request {
            method: Method::Post,
            path: s!(path),
            headers: vec![(s!("Content-Type"), s!("application/x-www-form-urlencoded"))],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((s!(name), s!(value)));
        self
    }
}

pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First header with this name, ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All `Set-Cookie` values.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// The HTTP fetch capability the session machine drives. Production code
/// uses `TcpTransport`; tests script responses.
pub trait Transport {
    fn fetch(&mut self, req: &Request) -> Result<Response>;
}

/// Plain-TCP blocking transport against one host.
pub struct TcpTransport {
    pub host: String,
    pub port: u16,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        TcpTransport { host: s!(host), port }
    }
}

impl Transport for TcpTransport {
    fn fetch(&mut self, req: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(Duration::from_secs(TIMEOUT_SECS)))?;
        stream.set_write_timeout(Some(Duration::from_secs(TIMEOUT_SECS)))?;

        let mut head = format!(
            "{} {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n",
            req.method.as_str(),
            req.path,
            self.host,
            USER_AGENT
        );
        for (name, value) in &req.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if let Some(body) = &req.body {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        stream.write_all(head.as_bytes())?;
        if let Some(body) = &req.body {
            stream.write_all(body)?;
        }
        stream.flush()?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        parse_response(&buf)
    }
}

/// Split a raw HTTP/1.0 response into status, headers and body.
fn parse_response(raw: &[u8]) -> Result<Response> {
    let split = find_header_end(raw)
        .ok_or_else(|| ScrapeError::TransientFetch(s!("malformed HTTP response")))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    // "HTTP/1.0 200 OK"
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| ScrapeError::TransientFetch(format!("bad status line: {status_line}")))?;

    let mut headers = Vec::new();
    for line in lines {
        if let Some(colon) = line.find(':') {
            headers.push((s!(line[..colon].trim()), s!(line[colon + 1..].trim())));
        }
    }
    Ok(Response { status, headers, body })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

/// application/x-www-form-urlencoded encoding of key/value pairs.
pub fn form_urlencode(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (k, v)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        percent_encode_into(&mut out, k);
        out.push('=');
        percent_encode_into(&mut out, v);
    }
    out
}

fn percent_encode_into(out: &mut String, s: &str) {
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_splits_status_headers_body() {
        let raw = b"HTTP/1.0 302 Found\r\nLocation: /home\r\nSet-Cookie: sid=abc; Path=/\r\n\r\nhello";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status, 302);
        assert_eq!(resp.header("location"), Some("/home"));
        assert_eq!(resp.set_cookies(), vec!["sid=abc; Path=/"]);
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn parse_response_rejects_garbage() {
        assert!(parse_response(b"not http at all").is_err());
    }

    #[test]
    fn form_urlencode_escapes() {
        let pairs = vec![(s!("user"), s!("a b")), (s!("code"), s!("1&2=3"))];
        assert_eq!(form_urlencode(&pairs), "user=a+b&code=1%262%3D3");
    }
}
