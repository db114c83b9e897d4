//! Units of traffic and where they go next.

use std::time::SystemTime;

use bytes::Bytes;

/// Opaque unit of traffic. Filters only look at its size.
pub trait Chunk: Send + 'static {
    /// Size in bytes.
    fn len(&self) -> usize;

    fn user_data(&self) -> &[u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bits, as the token bucket counts it.
    fn bits(&self) -> u64 {
        self.len() as u64 * 8
    }
}

/// Datagram with a zero-copy payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Bytes,
    pub created_at: SystemTime,
}

impl Datagram {
    pub fn new(payload: impl Into<Bytes>, created_at: SystemTime) -> Self {
        Self {
            payload: payload.into(),
            created_at,
        }
    }
}

impl Chunk for Datagram {
    fn len(&self) -> usize {
        self.payload.len()
    }

    fn user_data(&self) -> &[u8] {
        &self.payload
    }
}

/// Downstream consumer of filtered chunks.
pub trait Forward<C>: Send + Sync {
    fn forward(&self, chunk: C);
}

impl<C, F> Forward<C> for F
where
    F: Fn(C) + Send + Sync,
{
    fn forward(&self, chunk: C) {
        self(chunk)
    }
}
