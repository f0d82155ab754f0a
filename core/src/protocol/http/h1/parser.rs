/*
 * parser.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client engine.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length, chunked or
//! read-until-close). Interim 1xx responses are skipped, except 101 which ends parsing.

use bytes::{Buf, Bytes, BytesMut};
use std::io;

use crate::protocol::http::headers::Headers;

/// Longest status or header line accepted.
const MAX_LINE: usize = 16 * 1024;

/// Callback for HTTP/1.1 response events.
pub trait H1ResponseHandler {
    /// Status line and header block of a final (or 101) response.
    fn head(&mut self, code: u16, reason: Option<&str>, headers: Headers);
    fn body_chunk(&mut self, data: Bytes);
    fn trailer(&mut self, _name: &str, _value: &str) {}
    /// End of the message.
    fn complete(&mut self);
    /// Peer closed the connection between messages.
    fn closed(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Between messages, or reading a status line.
    StatusLine,
    Headers,
    /// Content-Length body, or read-until-close.
    Body,
    ChunkSize,
    ChunkData,
    /// CRLF after chunk data.
    ChunkEnd,
    ChunkTrailer,
    /// 101 received; remaining bytes belong to the new protocol.
    Upgraded,
    /// End of stream seen, or a parse error.
    Closed,
}

/// Push parser for HTTP/1.1 responses. Feed bytes via `receive`; the handler is invoked as
/// complete tokens are parsed. Partial data stays in the buffer.
pub struct ResponseParser {
    state: ParseState,
    head_request: bool,
    status: u16,
    reason: Option<String>,
    headers: Headers,
    http10: bool,
    /// Bytes left of a Content-Length body or of the current chunk.
    remaining: u64,
    close_delimited: bool,
    keep_alive: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            head_request: false,
            status: 0,
            reason: None,
            headers: Headers::new(),
            http10: false,
            remaining: 0,
            close_delimited: false,
            keep_alive: true,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The next response answers a HEAD request (no body whatever the headers say).
    pub fn expect_head(&mut self, head: bool) {
        self.head_request = head;
    }

    /// True if another message can follow on this connection.
    pub fn is_reusable(&self) -> bool {
        self.keep_alive && self.state == ParseState::StatusLine
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    fn invalid(&mut self, message: &str) -> io::Error {
        self.state = ParseState::Closed;
        self.keep_alive = false;
        io::Error::new(io::ErrorKind::InvalidData, message.to_string())
    }

    /// Next CRLF-terminated line as text, without the CRLF. None until a full line is buffered.
    fn take_line(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        let Some(end) = Self::find_crlf(buf) else {
            if buf.len() > MAX_LINE {
                return Err(self.invalid("response line too long"));
            }
            return Ok(None);
        };
        let line = buf.split_to(end + 2);
        match std::str::from_utf8(&line[..end]) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => Err(self.invalid("response line is not UTF-8")),
        }
    }

    /// Consume and parse as much as possible from buf.
    pub fn receive<H: H1ResponseHandler>(&mut self, buf: &mut BytesMut, handler: &mut H) -> io::Result<()> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        // Tolerate stray CRLF between messages.
                        continue;
                    }
                    self.status_line(&line)?;
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.end_of_headers(handler)?;
                        continue;
                    }
                    if let Some(colon) = line.find(':') {
                        let name = line[..colon].trim();
                        let value = line[colon + 1..].trim();
                        self.headers.append(name, value);
                    }
                }
                ParseState::Body => {
                    if self.close_delimited {
                        let chunk = buf.split_to(buf.len()).freeze();
                        handler.body_chunk(chunk);
                        return Ok(());
                    }
                    let n = (self.remaining.min(buf.len() as u64)) as usize;
                    handler.body_chunk(buf.split_to(n).freeze());
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.end_of_message(handler);
                    }
                }
                ParseState::ChunkSize => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(());
                    };
                    let hex = line.split(';').next().unwrap_or("").trim();
                    self.remaining = match u64::from_str_radix(hex, 16) {
                        Ok(n) => n,
                        Err(_) => return Err(self.invalid("invalid chunk size")),
                    };
                    self.state = if self.remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let n = (self.remaining.min(buf.len() as u64)) as usize;
                    handler.body_chunk(buf.split_to(n).freeze());
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.state = ParseState::ChunkEnd;
                    }
                }
                ParseState::ChunkEnd => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(self.invalid("missing CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.end_of_message(handler);
                    } else if let Some(colon) = line.find(':') {
                        handler.trailer(line[..colon].trim(), line[colon + 1..].trim());
                    }
                }
                ParseState::Upgraded | ParseState::Closed => return Ok(()),
            }
        }
        Ok(())
    }

    /// The peer closed its side. Ends a read-until-close body; anywhere else inside a
    /// message it is an unexpected EOF.
    pub fn eof<H: H1ResponseHandler>(&mut self, buf: &BytesMut, handler: &mut H) -> io::Result<()> {
        match self.state {
            ParseState::Body if self.close_delimited => {
                self.keep_alive = false;
                self.end_of_message(handler);
                self.state = ParseState::Closed;
                Ok(())
            }
            ParseState::StatusLine if buf.is_empty() => {
                self.state = ParseState::Closed;
                self.keep_alive = false;
                handler.closed();
                Ok(())
            }
            ParseState::Closed | ParseState::Upgraded => {
                handler.closed();
                Ok(())
            }
            _ => {
                self.state = ParseState::Closed;
                self.keep_alive = false;
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-response",
                ))
            }
        }
    }

    fn status_line(&mut self, line: &str) -> io::Result<()> {
        // HTTP/1.1 200 OK, or HTTP/1.1 200
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/") {
            return Err(self.invalid("invalid status line"));
        }
        let code = match parts.next().map(str::parse::<u16>) {
            Some(Ok(code)) if (100..1000).contains(&code) => code,
            _ => return Err(self.invalid("invalid status code")),
        };
        self.http10 = version == "HTTP/1.0";
        self.close_delimited = false;
        self.status = code;
        self.reason = parts.next().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        self.headers = Headers::new();
        Ok(())
    }

    fn end_of_headers<H: H1ResponseHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        let code = self.status;
        if (100..200).contains(&code) && code != 101 {
            self.state = ParseState::StatusLine;
            return Ok(());
        }
        self.keep_alive = if self.http10 {
            self.headers.contains_token("Connection", "keep-alive")
        } else {
            !self.headers.contains_token("Connection", "close")
        };
        let chunked = self.headers.contains_token("Transfer-Encoding", "chunked");
        let content_length = match self.headers.get("Content-Length") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => return Err(self.invalid("invalid Content-Length")),
            },
            None => None,
        };
        let headers = std::mem::take(&mut self.headers);
        handler.head(code, self.reason.as_deref(), headers);

        if code == 101 {
            handler.complete();
            self.state = ParseState::Upgraded;
            return Ok(());
        }
        if self.head_request || code == 204 || code == 304 {
            self.end_of_message(handler);
        } else if chunked {
            self.state = ParseState::ChunkSize;
        } else if let Some(n) = content_length {
            self.remaining = n;
            if n == 0 {
                self.end_of_message(handler);
            } else {
                self.state = ParseState::Body;
            }
        } else {
            self.close_delimited = true;
            self.keep_alive = false;
            self.state = ParseState::Body;
        }
        Ok(())
    }

    fn end_of_message<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        handler.complete();
        self.head_request = false;
        self.remaining = 0;
        self.reason = None;
        self.state = if self.keep_alive {
            ParseState::StatusLine
        } else {
            ParseState::Closed
        };
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl H1ResponseHandler for Recorder {
        fn head(&mut self, code: u16, reason: Option<&str>, headers: Headers) {
            self.events.push(format!("status {} {}", code, reason.unwrap_or("-")));
            for (name, value) in headers.iter() {
                self.events.push(format!("header {}={}", name, value));
            }
        }

        fn body_chunk(&mut self, data: Bytes) {
            self.events.push(format!("body {}", String::from_utf8_lossy(&data)));
        }

        fn trailer(&mut self, name: &str, value: &str) {
            self.events.push(format!("trailer {}={}", name, value));
        }

        fn complete(&mut self) {
            self.events.push("end".into());
        }

        fn closed(&mut self) {
            self.events.push("closed".into());
        }
    }

    fn feed(parser: &mut ResponseParser, rec: &mut Recorder, parts: &[&str]) -> io::Result<BytesMut> {
        let mut buf = BytesMut::new();
        for part in parts {
            buf.extend_from_slice(part.as_bytes());
            parser.receive(&mut buf, rec)?;
        }
        Ok(buf)
    }

    #[test]
    fn content_length_body_split_across_reads() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut p, &mut rec, &["HTTP/1.1 200 OK\r\nContent-Le", "ngth: 5\r\n\r\nhe", "llo"]).unwrap();
        assert_eq!(rec.events, ["status 200 OK", "header Content-Length=5", "body he", "body llo", "end"]);
        assert!(p.is_reusable());
    }

    #[test]
    fn chunked_body_with_extension_and_trailer() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut p,
            &mut rec,
            &["HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;x=y\r\nWiki\r\n", "0\r\nX-Sum: 1\r\n\r\n"],
        )
        .unwrap();
        assert_eq!(&rec.events[2..], ["body Wiki", "trailer X-Sum=1", "end"]);
        assert_eq!(p.state(), ParseState::StatusLine);
    }

    #[test]
    fn head_response_has_no_body_and_interim_responses_are_skipped() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        p.expect_head(true);
        feed(&mut p, &mut rec, &["HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"]).unwrap();
        assert_eq!(rec.events.last().map(String::as_str), Some("end"));

        rec.events.clear();
        feed(&mut p, &mut rec, &["HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n"]).unwrap();
        assert_eq!(rec.events, ["status 204 No Content", "end"]);
    }

    #[test]
    fn switching_protocols_leaves_remaining_bytes() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let buf = feed(&mut p, &mut rec, &["HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x01\x02hi"]).unwrap();
        assert_eq!(p.state(), ParseState::Upgraded);
        assert_eq!(&buf[..], b"\x01\x02hi");
        assert_eq!(rec.events.last().map(String::as_str), Some("end"));
        assert!(!p.is_reusable());
    }

    #[test]
    fn read_until_close() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let buf = feed(&mut p, &mut rec, &["HTTP/1.0 200 OK\r\n\r\nabc"]).unwrap();
        p.eof(&buf, &mut rec).unwrap();
        assert_eq!(&rec.events[1..], ["body abc", "end"]);
        assert!(!p.is_reusable());
    }

    #[test]
    fn eof_mid_body_is_unexpected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let buf = feed(&mut p, &mut rec, &["HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nabc"]).unwrap();
        let err = p.eof(&buf, &mut rec).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn eof_between_messages_is_a_close() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        p.eof(&BytesMut::new(), &mut rec).unwrap();
        assert_eq!(rec.events, ["closed"]);
    }

    #[test]
    fn malformed_status_line() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let err = feed(&mut p, &mut rec, &["HTTP/1.1 abc OK\r\n"]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let mut p = ResponseParser::new();
        let err = feed(&mut p, &mut rec, &["SSH-2.0-OpenSSH\r\n"]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn connection_close_is_not_reusable() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut p, &mut rec, &["HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"]).unwrap();
        assert!(!p.is_reusable());
    }
}
