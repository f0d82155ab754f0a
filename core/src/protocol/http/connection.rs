/*
 * connection.rs
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

//! Tokio transport: DNS, TCP, optional TLS, and an HTTP/1.1 channel over the stream.
//!
//! `TcpChannel` drives the h1 push parser and queues the decoded events; the execution
//! pulls them one at a time with `next_event`.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, trace};

use crate::error::{ConnectError, ConnectFailure};
use crate::net::{http_connector, server_name, HttpStream};
use crate::protocol::http::h1::{H1ResponseHandler, ParseState, ResponseParser};
use crate::protocol::http::headers::Headers;
use crate::protocol::http::key::EndpointKey;
use crate::protocol::http::request::Method;
use crate::protocol::http::transport::{Channel, ChannelEvent, ConnectObserver, Transport};

const READ_BUFFER: usize = 8192;

/// Connects over tokio TCP, with rustls for https/wss endpoints.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    _private: (),
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for TcpTransport {
    type Channel = TcpChannel;

    fn connect<'a>(
        &'a self,
        key: &'a EndpointKey,
        observer: &'a mut dyn ConnectObserver,
    ) -> impl Future<Output = Result<TcpChannel, ConnectError>> + Send + 'a {
        async move {
            if key.is_secure() && key.proxy().is_some() {
                return Err(ConnectError::new(
                    ConnectFailure::Other,
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        "https through a proxy needs CONNECT tunnelling",
                    ),
                ));
            }
            let (host, port) = key.connect_address();
            observer.hostname_resolution(host);
            let addresses: Vec<SocketAddr> = lookup_host((host, port))
                .await
                .map_err(|e| ConnectError::new(ConnectFailure::Dns, e))?
                .collect();
            if addresses.is_empty() {
                return Err(ConnectError::new(
                    ConnectFailure::Dns,
                    io::Error::new(io::ErrorKind::NotFound, format!("{} has no addresses", host)),
                ));
            }
            observer.hostname_resolved(&addresses);

            let mut last_error = None;
            let mut tcp = None;
            for address in &addresses {
                observer.connection_open(*address);
                match TcpStream::connect(address).await {
                    Ok(stream) => {
                        tcp = Some(stream);
                        break;
                    }
                    Err(e) => {
                        debug!(%address, error = %e, "connect attempt failed");
                        last_error = Some(e);
                    }
                }
            }
            let tcp = match tcp {
                Some(stream) => stream,
                None => {
                    let e = last_error.unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::ConnectionRefused, "no address accepted the connection")
                    });
                    let kind = match e.kind() {
                        io::ErrorKind::ConnectionRefused => ConnectFailure::Refused,
                        _ => ConnectFailure::Other,
                    };
                    return Err(ConnectError::new(kind, e));
                }
            };
            let _ = tcp.set_nodelay(true);

            let stream = if key.is_secure() {
                observer.tls_handshake();
                let name = server_name(key.host()).map_err(|e| ConnectError::new(ConnectFailure::Tls, e))?;
                let tls = http_connector()
                    .connect(name, tcp)
                    .await
                    .map_err(|e| ConnectError::new(ConnectFailure::Tls, e))?;
                HttpStream::Tls(Box::new(tls))
            } else {
                HttpStream::Plain(tcp)
            };
            Ok(TcpChannel::new(stream))
        }
    }
}

/// Queues parser output as channel events.
impl H1ResponseHandler for VecDeque<ChannelEvent> {
    fn head(&mut self, code: u16, reason: Option<&str>, headers: Headers) {
        self.push_back(ChannelEvent::Status {
            code,
            reason: reason.map(str::to_string),
        });
        self.push_back(ChannelEvent::Headers(headers));
    }

    fn body_chunk(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.push_back(ChannelEvent::BodyChunk(data));
        }
    }

    fn complete(&mut self) {
        self.push_back(ChannelEvent::End);
    }

    fn closed(&mut self) {
        self.push_back(ChannelEvent::Closed);
    }
}

/// HTTP/1.1 connection over a plain or TLS stream.
pub struct TcpChannel {
    stream: HttpStream,
    buf: BytesMut,
    parser: ResponseParser,
    events: VecDeque<ChannelEvent>,
    /// Bytes arrived since the last `expect_response`.
    received: bool,
    eof: bool,
    closed: bool,
}

impl TcpChannel {
    pub fn new(stream: HttpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_BUFFER),
            parser: ResponseParser::new(),
            events: VecDeque::new(),
            received: false,
            eof: false,
            closed: false,
        }
    }

    /// The raw stream and any bytes read past the end of the last response (after a 101,
    /// the first bytes of the new protocol).
    pub fn into_parts(self) -> (HttpStream, Bytes) {
        (self.stream, self.buf.freeze())
    }
}

impl Channel for TcpChannel {
    fn write(&mut self, data: Bytes) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            self.stream.write_all(&data).await?;
            self.stream.flush().await
        }
    }

    fn next_event(&mut self) -> impl Future<Output = io::Result<ChannelEvent>> + Send {
        async move {
            loop {
                if let Some(event) = self.events.pop_front() {
                    return Ok(event);
                }
                if self.eof || self.parser.state() == ParseState::Upgraded {
                    return Ok(ChannelEvent::Closed);
                }
                self.buf.reserve(READ_BUFFER);
                let n = self.stream.read_buf(&mut self.buf).await?;
                if n == 0 {
                    trace!("peer closed connection");
                    self.eof = true;
                    self.parser.eof(&self.buf, &mut self.events)?;
                } else {
                    self.received = true;
                    self.parser.receive(&mut self.buf, &mut self.events)?;
                }
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            match self.stream.shutdown().await {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
                _ => Ok(()),
            }
        }
    }

    fn expect_response(&mut self, method: Method) {
        self.received = !self.buf.is_empty();
        self.parser.expect_head(method == Method::Head);
    }

    fn is_reusable(&self) -> bool {
        !self.closed && !self.eof && self.buf.is_empty() && self.events.is_empty() && self.parser.is_reusable()
    }

    fn response_started(&self) -> bool {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::key::Scheme;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Recorder(Vec<String>);

    impl ConnectObserver for Recorder {
        fn hostname_resolution(&mut self, host: &str) {
            self.0.push(format!("resolve {}", host));
        }

        fn connection_open(&mut self, _address: SocketAddr) {
            self.0.push("open".into());
        }
    }

    async fn serve_once(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 1024];
            let n = socket.read(&mut request).await.unwrap();
            request.truncate(n);
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (port, server)
    }

    #[tokio::test]
    async fn exchange_over_loopback() {
        let (port, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi").await;
        let key = EndpointKey::new(Scheme::Http, "127.0.0.1", port);
        let mut observer = Recorder(Vec::new());
        let mut channel = TcpTransport::new().connect(&key, &mut observer).await.unwrap();
        assert_eq!(observer.0, ["resolve 127.0.0.1", "open"]);

        channel.expect_response(Method::Get);
        channel
            .write(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await
            .unwrap();
        assert_eq!(
            channel.next_event().await.unwrap(),
            ChannelEvent::Status { code: 200, reason: Some("OK".into()) }
        );
        assert!(matches!(channel.next_event().await.unwrap(), ChannelEvent::Headers(_)));
        assert_eq!(channel.next_event().await.unwrap(), ChannelEvent::BodyChunk(Bytes::from_static(b"hi")));
        assert_eq!(channel.next_event().await.unwrap(), ChannelEvent::End);
        assert!(channel.is_reusable());
        assert_eq!(channel.next_event().await.unwrap(), ChannelEvent::Closed);
        assert!(!channel.is_reusable());
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(server.await.unwrap().starts_with(b"GET / HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn partial_head_marks_response_started() {
        let (port, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Len").await;
        let key = EndpointKey::new(Scheme::Http, "127.0.0.1", port);
        let mut observer = Recorder(Vec::new());
        let mut channel = TcpTransport::new().connect(&key, &mut observer).await.unwrap();

        channel.expect_response(Method::Get);
        assert!(!channel.response_started());
        channel
            .write(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await
            .unwrap();
        let err = channel.next_event().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(channel.response_started());
        assert!(!channel.is_reusable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_close_does_not_mark_response_started() {
        let (port, server) = serve_once(b"").await;
        let key = EndpointKey::new(Scheme::Http, "127.0.0.1", port);
        let mut observer = Recorder(Vec::new());
        let mut channel = TcpTransport::new().connect(&key, &mut observer).await.unwrap();

        channel.expect_response(Method::Get);
        channel
            .write(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await
            .unwrap();
        assert_eq!(channel.next_event().await.unwrap(), ChannelEvent::Closed);
        assert!(!channel.response_started());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let key = EndpointKey::new(Scheme::Http, "127.0.0.1", port);
        let mut observer = Recorder(Vec::new());
        let err = TcpTransport::new().connect(&key, &mut observer).await.err().unwrap();
        assert_eq!(err.kind, ConnectFailure::Refused);
    }

    #[tokio::test]
    async fn https_through_proxy_is_rejected() {
        let key = EndpointKey::new(Scheme::Https, "example.org", 443)
            .with_proxy(Some(crate::protocol::http::request::Proxy::new("127.0.0.1", 3128)));
        let mut observer = Recorder(Vec::new());
        let err = TcpTransport::new().connect(&key, &mut observer).await.err().unwrap();
        assert_eq!(err.kind, ConnectFailure::Other);
        assert!(observer.0.is_empty());
    }
}
