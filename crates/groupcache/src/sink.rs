// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Destinations that receive a cached or freshly loaded value.
//!
//! A group writes exactly one value into the caller's sink per `get`. Value producers write
//! into the sink they are handed, and the group then reads it back through [`Sink::view`] to
//! populate its cache.

use crate::{ByteView, Error, Result};

const UNPOPULATED: &str = "sink was not populated";

/// Receives a value in whichever representation the caller prefers.
pub trait Sink: Send {
    /// Stores a value given as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot represent the value.
    fn set_string(&mut self, value: String) -> Result<()>;

    /// Stores a value given as bytes. The sink copies what it keeps.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot represent the value.
    fn set_bytes(&mut self, value: &[u8]) -> Result<()>;

    /// Stores a value given as a shared view.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot represent the value.
    fn set_view(&mut self, value: ByteView) -> Result<()>;

    /// Returns the complete value last stored in the sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] if nothing was stored yet.
    fn view(&self) -> Result<ByteView>;
}

fn populated(view: Option<&ByteView>) -> Result<ByteView> {
    view.cloned().ok_or_else(|| Error::Sink(UNPOPULATED.to_owned()))
}

/// Sink that stores the value as a `String`.
///
/// Bytes that are not valid UTF-8 are replaced when the value is read as text.
#[derive(Debug, Default, Clone)]
pub struct StringSink {
    view: Option<ByteView>,
}

impl StringSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value as text, if any.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.view.as_ref().map(|view| view.to_string_lossy().into_owned())
    }
}

impl Sink for StringSink {
    fn set_string(&mut self, value: String) -> Result<()> {
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.view = Some(ByteView::copy_from_slice(value));
        Ok(())
    }

    fn set_view(&mut self, value: ByteView) -> Result<()> {
        self.view = Some(value);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        populated(self.view.as_ref())
    }
}

/// Sink that keeps the shared view itself, without copying.
#[derive(Debug, Default, Clone)]
pub struct ByteViewSink {
    view: Option<ByteView>,
}

impl ByteViewSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the sink, returning the stored view if any.
    #[must_use]
    pub fn into_view(self) -> Option<ByteView> {
        self.view
    }
}

impl Sink for ByteViewSink {
    fn set_string(&mut self, value: String) -> Result<()> {
        self.set_view(ByteView::from(value))
    }

    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.set_view(ByteView::copy_from_slice(value))
    }

    fn set_view(&mut self, value: ByteView) -> Result<()> {
        self.view = Some(value);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        populated(self.view.as_ref())
    }
}

/// Sink that copies the value into an owned, mutable buffer.
///
/// The buffer never aliases the cache, so callers may modify it freely.
#[derive(Debug, Default, Clone)]
pub struct AllocatingByteSink {
    bytes: Option<Vec<u8>>,
    view: Option<ByteView>,
}

impl AllocatingByteSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the copied bytes, if any.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    /// Consumes the sink, returning the copied bytes if any.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl Sink for AllocatingByteSink {
    fn set_string(&mut self, value: String) -> Result<()> {
        self.bytes = Some(value.as_bytes().to_vec());
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.bytes = Some(value.to_vec());
        self.view = Some(ByteView::copy_from_slice(value));
        Ok(())
    }

    fn set_view(&mut self, value: ByteView) -> Result<()> {
        self.bytes = Some(value.to_vec());
        self.view = Some(value);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        populated(self.view.as_ref())
    }
}

/// Sink that fills a caller-provided buffer, dropping whatever does not fit.
///
/// [`Sink::view`] still returns the complete value.
///
/// ```
/// use groupcache::{Sink, TruncatingByteSink};
///
/// let mut buf = [0_u8; 4];
/// let mut sink = TruncatingByteSink::new(&mut buf);
/// sink.set_string("truncated".to_string())?;
///
/// assert_eq!(sink.written(), 4);
/// assert_eq!(sink.view()?.len(), 9);
/// assert_eq!(&buf, b"trun");
/// # Ok::<(), groupcache::Error>(())
/// ```
#[derive(Debug)]
pub struct TruncatingByteSink<'a> {
    buf: &'a mut [u8],
    written: usize,
    view: Option<ByteView>,
}

impl<'a> TruncatingByteSink<'a> {
    /// Creates a sink writing into `buf`.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            written: 0,
            view: None,
        }
    }

    /// Returns how many bytes of the last value were copied into the buffer.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Sink for TruncatingByteSink<'_> {
    fn set_string(&mut self, value: String) -> Result<()> {
        self.set_view(ByteView::from(value))
    }

    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.set_view(ByteView::copy_from_slice(value))
    }

    fn set_view(&mut self, value: ByteView) -> Result<()> {
        self.written = value.copy_to(self.buf);
        self.view = Some(value);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        populated(self.view.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpopulated_sinks_report_an_error() {
        let mut buf = [0_u8; 1];
        let sinks: [&dyn Sink; 4] = [
            &StringSink::new(),
            &ByteViewSink::new(),
            &AllocatingByteSink::new(),
            &TruncatingByteSink::new(&mut buf),
        ];

        for sink in sinks {
            let err = sink.view().expect_err("nothing was stored");
            assert!(matches!(err, Error::Sink(ref message) if message == UNPOPULATED));
        }
    }

    #[test]
    fn string_sink_reads_back_text() {
        let mut sink = StringSink::new();
        sink.set_bytes(b"value").expect("infallible");

        assert_eq!(sink.value().as_deref(), Some("value"));
        assert_eq!(sink.view().expect("populated"), "value");
    }

    #[test]
    fn byte_view_sink_shares_the_buffer() {
        let view = ByteView::from(vec![1_u8, 2, 3]);
        let mut sink = ByteViewSink::new();
        sink.set_view(view.clone()).expect("infallible");

        let stored = sink.into_view().expect("populated");
        assert_eq!(stored.as_bytes().as_ptr(), view.as_bytes().as_ptr());
    }

    #[test]
    fn allocating_sink_copies() {
        let view = ByteView::from("shared");
        let mut sink = AllocatingByteSink::new();
        sink.set_view(view.clone()).expect("infallible");

        let bytes = sink.bytes().expect("populated");
        assert_eq!(bytes, b"shared");
        assert_ne!(bytes.as_ptr(), view.as_bytes().as_ptr());
    }

    #[test]
    fn truncating_sink_fits_the_buffer() {
        let mut buf = [0_u8; 8];
        let mut sink = TruncatingByteSink::new(&mut buf);
        sink.set_string("short".to_string()).expect("infallible");
        assert_eq!(sink.written(), 5);

        sink.set_bytes(b"0123456789").expect("infallible");
        assert_eq!(sink.written(), 8);
        assert_eq!(sink.view().expect("populated").len(), 10);
        assert_eq!(&buf, b"01234567");
    }
}
