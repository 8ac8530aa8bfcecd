use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

pub const MAX_HEADER_BYTES: usize = 16_384;
pub const MAX_BODY_BYTES: usize = 1_048_576;
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("request body exceeds the size limit")]
    BodyTooLarge,
    #[error("request did not complete in time")]
    Incomplete,
    #[error("malformed request")]
    InvalidRequest,
}

#[derive(Debug)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Reads one HTTP/1.1 request off `stream`, enforcing the header, body and
/// deadline bounds. A peer that trickles bytes past `REQUEST_DEADLINE` or
/// oversteps either size limit gets a parse error, never an unbounded read.
pub async fn read_request<S>(stream: &mut S) -> Result<ParsedRequest, ParseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    match timeout(REQUEST_DEADLINE, read_request_inner(stream)).await {
        Ok(result) => result,
        Err(_) => Err(ParseError::Incomplete),
    }
}

async fn read_request_inner<S>(stream: &mut S) -> Result<ParsedRequest, ParseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end;
    loop {
        let n = stream.read(&mut chunk).await.map_err(|_| ParseError::InvalidRequest)?;
        if n == 0 {
            return Err(ParseError::InvalidRequest);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_terminator(&buf) {
            if end > MAX_HEADER_BYTES {
                return Err(ParseError::BodyTooLarge);
            }
            header_end = end;
            break;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(ParseError::BodyTooLarge);
        }
    }

    let header_text =
        std::str::from_utf8(&buf[..header_end]).map_err(|_| ParseError::InvalidRequest)?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(ParseError::InvalidRequest)?.to_string();
    let path = parts.next().ok_or(ParseError::InvalidRequest)?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidRequest)?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length: usize = match headers.get("content-length") {
        Some(v) => v.parse().map_err(|_| ParseError::InvalidRequest)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(ParseError::BodyTooLarge);
    }

    let body_start = header_end + 4;
    let mut body = buf[body_start.min(buf.len())..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.map_err(|_| ParseError::InvalidRequest)?;
        if n == 0 {
            return Err(ParseError::InvalidRequest);
        }
        body.extend_from_slice(&chunk[..n]);
        if body.len() > MAX_BODY_BYTES {
            return Err(ParseError::BodyTooLarge);
        }
    }
    body.truncate(content_length);

    Ok(ParsedRequest { method, path, headers, body })
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn parses_method_path_and_headers() {
        let raw = b"GET /api/v1/status HTTP/1.1\r\nAuthorization: Bearer abc\r\nContent-Length: 0\r\n\r\n";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor).await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/v1/status");
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn reads_body_up_to_content_length() {
        let raw = b"POST /api/v1/pair HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor).await.unwrap();
        assert_eq!(req.body, b"hello");
    }

    #[tokio::test]
    async fn oversized_content_length_is_rejected() {
        let raw = format!(
            "POST /api/v1/pair HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let mut cursor = Cursor::new(raw.into_bytes());
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ParseError::BodyTooLarge));
    }

    #[tokio::test]
    async fn oversized_headers_are_rejected_even_when_terminator_arrives_in_one_chunk() {
        // A single final read can carry both the bytes that push the running
        // total past MAX_HEADER_BYTES and the "\r\n\r\n" terminator; the
        // terminator-found branch must not short-circuit the size check.
        let filler = "X-Pad: ".to_string() + &"a".repeat(MAX_HEADER_BYTES + 100) + "\r\n";
        let raw = format!("GET /api/v1/status HTTP/1.1\r\n{filler}\r\n");
        let mut cursor = Cursor::new(raw.into_bytes());
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ParseError::BodyTooLarge));
    }
}
