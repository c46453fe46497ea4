//! Requests carried by handle queues

use std::fmt;

use bytes::Bytes;

use peerhub_core::PeerResult;

/// Completion callback, fired exactly once per request
pub type Callback = Box<dyn FnOnce(PeerResult<()>) + Send + 'static>;

fn noop() -> Callback {
    Box::new(|_| {})
}

/// A write request: data plus the callback that reports its outcome
pub struct WritePayload {
    data: Bytes,
    callback: Callback,
}

impl WritePayload {
    pub fn new(
        data: impl Into<Bytes>,
        callback: impl FnOnce(PeerResult<()>) + Send + 'static,
    ) -> Self {
        WritePayload {
            data: data.into(),
            callback: Box::new(callback),
        }
    }

    /// Write request whose outcome nobody observes
    pub fn detached(data: impl Into<Bytes>) -> Self {
        WritePayload {
            data: data.into(),
            callback: noop(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Report the outcome and consume the request
    pub fn complete(self, result: PeerResult<()>) {
        (self.callback)(result)
    }

    /// Split into data and callback, for consumers that finish asynchronously
    pub fn into_parts(self) -> (Bytes, Callback) {
        (self.data, self.callback)
    }
}

impl fmt::Debug for WritePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePayload")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// The terminal request of a consumer
pub struct StopPayload {
    callback: Callback,
}

impl StopPayload {
    pub fn new(callback: impl FnOnce(PeerResult<()>) + Send + 'static) -> Self {
        StopPayload {
            callback: Box::new(callback),
        }
    }

    pub fn detached() -> Self {
        StopPayload { callback: noop() }
    }

    pub fn complete(self, result: PeerResult<()>) {
        (self.callback)(result)
    }
}

impl fmt::Debug for StopPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopPayload").finish_non_exhaustive()
    }
}
