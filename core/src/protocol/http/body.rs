/*
 * body.rs
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

//! Request bodies: empty, in-memory bytes, or a lazily produced byte sequence.
//!
//! A produced body is stored as a factory so every attempt (retry, 307/308 redirect)
//! starts a fresh producer and sends the same bytes again.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

pub type ChunkFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Option<Bytes>>> + Send + 'a>>;

/// Lazy source of request body bytes.
pub trait BodyProducer: Send {
    /// Total length if known up front. `None` means the body is sent chunked.
    fn declared_length(&self) -> Option<u64>;

    /// Next chunk, or `None` at the end. Empty chunks are skipped by the writer.
    fn next_chunk(&mut self) -> ChunkFuture<'_>;
}

type ProducerFactory = Arc<dyn Fn() -> Box<dyn BodyProducer> + Send + Sync>;

/// Request body.
#[derive(Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Producer(ProducerFactory),
}

impl Body {
    /// Body produced by a fresh `P` for every attempt.
    pub fn from_producer<F, P>(factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: BodyProducer + 'static,
    {
        Body::Producer(Arc::new(move || Box::new(factory()) as Box<dyn BodyProducer>))
    }

    /// Body streamed from a fixed list of chunks. With `length == None` it goes out chunked.
    pub fn from_chunks(chunks: Vec<Bytes>, length: Option<u64>) -> Self {
        Body::from_producer(move || ChunkProducer::new(chunks.clone(), length))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(b) => b.is_empty(),
            Body::Producer(_) => false,
        }
    }

    /// Start a producer for one attempt.
    pub fn open(&self) -> Box<dyn BodyProducer> {
        match self {
            Body::Empty => Box::new(ChunkProducer::new(Vec::new(), Some(0))),
            Body::Full(b) => {
                let len = b.len() as u64;
                Box::new(ChunkProducer::new(vec![b.clone()], Some(len)))
            }
            Body::Producer(factory) => factory(),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(b) => write!(f, "Body::Full({} bytes)", b.len()),
            Body::Producer(_) => f.write_str("Body::Producer"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Full(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Full(Bytes::from(v))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

/// Producer over an in-memory list of chunks.
pub struct ChunkProducer {
    chunks: VecDeque<Bytes>,
    length: Option<u64>,
}

impl ChunkProducer {
    pub fn new(chunks: Vec<Bytes>, length: Option<u64>) -> Self {
        Self {
            chunks: chunks.into(),
            length,
        }
    }
}

impl BodyProducer for ChunkProducer {
    fn declared_length(&self) -> Option<u64> {
        self.length
    }

    fn next_chunk(&mut self) -> ChunkFuture<'_> {
        let next = self.chunks.pop_front();
        Box::pin(async move { Ok(next) })
    }
}
