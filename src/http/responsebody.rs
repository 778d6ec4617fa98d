//! Response body streaming.
//! Mirrors Chromium's HttpStream::ReadResponseBody, as a blocking `Read`.

use crate::base::context::{io_to_net_error, net_to_io_error};
use crate::base::neterror::NetError;
use bytes::Bytes;
use std::fmt;
use std::io::{self, Cursor, Read};

enum Inner {
    Bytes(Cursor<Bytes>),
    Stream(Box<dyn Read + Send>),
    /// Placeholder for a body that was already handed out elsewhere.
    Unreadable,
}

/// Response body. Reading it to the end, or dropping it, releases the
/// exchange that produced it.
pub struct ResponseBody {
    inner: Inner,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Inner::Bytes(c) => format!("bytes({})", c.get_ref().len()),
            Inner::Stream(_) => "stream".to_string(),
            Inner::Unreadable => "unreadable".to_string(),
        };
        f.debug_struct("ResponseBody").field("kind", &kind).finish()
    }
}

impl ResponseBody {
    /// A body held fully in memory.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            inner: Inner::Bytes(Cursor::new(bytes)),
            on_release: None,
        }
    }

    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A streamed body.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            inner: Inner::Stream(reader),
            on_release: None,
        }
    }

    /// A body that fails every read.
    pub fn unreadable() -> Self {
        Self {
            inner: Inner::Unreadable,
            on_release: None,
        }
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self.inner, Inner::Unreadable)
    }

    /// Run `hook` once, at end of stream or on drop, whichever comes first.
    pub(crate) fn with_release_hook(mut self, hook: Box<dyn FnOnce() + Send>) -> Self {
        self.on_release = Some(hook);
        self
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }

    /// Read entire body as bytes.
    pub fn bytes(mut self) -> Result<Bytes, NetError> {
        if let Inner::Bytes(cursor) = &mut self.inner {
            let pos = cursor.position() as usize;
            let all = cursor.get_ref().slice(pos..);
            cursor.set_position(cursor.get_ref().len() as u64);
            self.release();
            return Ok(all);
        }
        let mut out = Vec::new();
        self.read_to_end(&mut out).map_err(|e| io_to_net_error(&e))?;
        Ok(Bytes::from(out))
    }

    /// Read body as UTF-8 string.
    pub fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read body as JSON, deserializing to type T.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.inner {
            Inner::Bytes(cursor) => cursor.read(buf)?,
            Inner::Stream(reader) => reader.read(buf)?,
            Inner::Unreadable => return Err(net_to_io_error(NetError::IllegalState)),
        };
        if n == 0 && !buf.is_empty() {
            self.release();
        }
        Ok(n)
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.release();
    }
}
