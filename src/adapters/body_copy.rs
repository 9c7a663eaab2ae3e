//! Streaming copy of upstream response bodies.
//!
//! Every proxied response gets its own task that re-frames the upstream body
//! through a fixed-size buffer and feeds the downstream body through a small
//! channel. With a flush interval, data is coalesced in the buffer and
//! released when it fills, on every tick and at the end; without one, every
//! upstream frame is released as soon as it has been copied. Trailers always
//! come last.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{BoxError, body::Body};
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body as HttpBody, Frame};
use tokio::{
    sync::mpsc,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tokio_stream::wrappers::ReceiverStream;

use crate::core::context::RequestContext;

/// Size of the buffer each copy re-frames through.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

const MAX_POOLED_BUFFERS: usize = 64;

type FrameResult = Result<Frame<Bytes>, BoxError>;

/// Source of copy buffers.
pub trait BufferPool: Send + Sync + 'static {
    fn get(&self) -> BytesMut;
    fn put(&self, buffer: BytesMut);
}

/// A bounded free list of [`COPY_BUFFER_SIZE`] buffers.
#[derive(Default)]
pub struct SharedBufferPool {
    buffers: Mutex<Vec<BytesMut>>,
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferPool for SharedBufferPool {
    fn get(&self) -> BytesMut {
        self.buffers
            .lock()
            .ok()
            .and_then(|mut buffers| buffers.pop())
            .unwrap_or_else(|| BytesMut::with_capacity(COPY_BUFFER_SIZE))
    }

    fn put(&self, mut buffer: BytesMut) {
        if buffer.capacity() < COPY_BUFFER_SIZE {
            return;
        }
        buffer.clear();
        if let Ok(mut buffers) = self.buffers.lock() {
            if buffers.len() < MAX_POOLED_BUFFERS {
                buffers.push(buffer);
            }
        }
    }
}

/// Settings shared by every copy a backend spawns.
#[derive(Clone, Default)]
pub struct BodyCopy {
    pub flush_interval: Option<Duration>,
    pub pool: Option<Arc<dyn BufferPool>>,
}

impl BodyCopy {
    /// Spawn the copy of `upstream` and return the downstream body. The copy
    /// stops when `context` is done or the downstream body is dropped.
    pub fn spawn<B>(&self, upstream: B, context: RequestContext) -> Body
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let (tx, rx) = mpsc::channel::<FrameResult>(4);
        let copy = self.clone();
        tokio::spawn(async move { copy.run(upstream, tx, context).await });
        Body::new(StreamBody::new(ReceiverStream::new(rx)))
    }

    async fn run<B>(self, mut upstream: B, tx: mpsc::Sender<FrameResult>, context: RequestContext)
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let mut buffer = match &self.pool {
            Some(pool) => pool.get(),
            None => BytesMut::with_capacity(COPY_BUFFER_SIZE),
        };
        let mut ticker = self.flush_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            let frame = tokio::select! {
                _ = context.done() => {
                    tracing::debug!("Body copy stopped, request context finished");
                    let _ = tx.send(Err("request context finished".into())).await;
                    break;
                }
                _ = tx.closed() => {
                    tracing::debug!("Body copy stopped, client went away");
                    break;
                }
                _ = tick(&mut ticker) => {
                    if !flush(&mut buffer, &tx).await {
                        break;
                    }
                    continue;
                }
                frame = upstream.frame() => frame,
            };

            match frame {
                None => {
                    flush(&mut buffer, &tx).await;
                    break;
                }
                Some(Err(e)) => {
                    let error: BoxError = e.into();
                    tracing::warn!(error = %error, "Upstream body failed mid-stream");
                    if flush(&mut buffer, &tx).await {
                        let _ = tx.send(Err(error)).await;
                    }
                    break;
                }
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        if !self.copy_data(&data, &mut buffer, &tx).await {
                            break;
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            if !flush(&mut buffer, &tx).await {
                                break;
                            }
                            if tx.send(Ok(Frame::trailers(trailers))).await.is_err() {
                                break;
                            }
                        }
                    }
                },
            }
        }

        if let Some(pool) = &self.pool {
            pool.put(buffer);
        }
    }

    /// Copy `data` through `buffer`; false once the downstream is gone.
    async fn copy_data(&self, mut data: &[u8], buffer: &mut BytesMut, tx: &mpsc::Sender<FrameResult>) -> bool {
        while !data.is_empty() {
            let room = COPY_BUFFER_SIZE.saturating_sub(buffer.len()).max(1);
            let (chunk, rest) = data.split_at(room.min(data.len()));
            buffer.extend_from_slice(chunk);
            data = rest;
            if buffer.len() >= COPY_BUFFER_SIZE && !flush(buffer, tx).await {
                return false;
            }
        }

        if self.flush_interval.is_none() {
            return flush(buffer, tx).await;
        }
        true
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Release buffered bytes downstream; false once the downstream is gone.
async fn flush(buffer: &mut BytesMut, tx: &mpsc::Sender<FrameResult>) -> bool {
    if buffer.is_empty() {
        return true;
    }
    let data = Bytes::copy_from_slice(buffer);
    buffer.clear();
    tx.send(Ok(Frame::data(data))).await.is_ok()
}
