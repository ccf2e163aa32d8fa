// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::io::{self, Cursor, Write};

use bytes::Bytes;

/// Errors produced when a [`ByteView`] is sliced with an invalid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ByteViewError {
    /// The start offset lies past the end of the view.
    #[error("offset {offset} is past the end of a {len}-byte view")]
    InvalidOffset {
        /// Requested start offset.
        offset: usize,
        /// Length of the view.
        len: usize,
    },

    /// The range is reversed or extends past the end of the view.
    #[error("range {from}..{to} is out of bounds for a {len}-byte view")]
    OutOfRange {
        /// Requested start offset.
        from: usize,
        /// Requested end offset.
        to: usize,
        /// Length of the view.
        len: usize,
    },
}

/// An immutable view over cached bytes.
///
/// Cloning is cheap: all clones share one reference-counted buffer. Values built from a
/// `String` or `Vec<u8>` take ownership of the allocation without copying.
///
/// # Examples
///
/// ```
/// use groupcache::ByteView;
///
/// let view = ByteView::from("hello, world");
/// let hello = view.slice(0, 5)?;
///
/// assert_eq!(hello, "hello");
/// assert_eq!(view.len(), 12);
/// # Ok::<(), groupcache::ByteViewError>(())
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteView(Bytes);

impl ByteView {
    /// Creates a view by copying `data`.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Returns the number of bytes in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the view holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the bytes of the view.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Borrows the view as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Returns the view as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Copies the bytes into a new vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Returns the underlying shared buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Copies as many bytes as fit into `dest`, returning the count.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.0.len());
        dest[..n].copy_from_slice(&self.0[..n]);
        n
    }

    /// Returns the sub-view `from..to`.
    ///
    /// # Errors
    ///
    /// Returns [`ByteViewError::OutOfRange`] if `from > to` or `to` exceeds the length.
    pub fn slice(&self, from: usize, to: usize) -> Result<Self, ByteViewError> {
        if from > to || to > self.len() {
            return Err(ByteViewError::OutOfRange { from, to, len: self.len() });
        }
        Ok(Self(self.0.slice(from..to)))
    }

    /// Returns the sub-view from `from` to the end.
    ///
    /// # Errors
    ///
    /// Returns [`ByteViewError::InvalidOffset`] if `from` exceeds the length.
    pub fn slice_from(&self, from: usize) -> Result<Self, ByteViewError> {
        if from > self.len() {
            return Err(ByteViewError::InvalidOffset {
                offset: from,
                len: self.len(),
            });
        }
        Ok(Self(self.0.slice(from..)))
    }

    /// Returns a seekable reader over the view.
    #[must_use]
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.0.clone())
    }

    /// Writes the whole view to `writer` in a single write call.
    ///
    /// # Errors
    ///
    /// Propagates the writer's error, or returns [`io::ErrorKind::WriteZero`] when the writer
    /// accepted fewer bytes than the view holds.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<u64> {
        let written = writer.write(&self.0)?;
        if written < self.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {} bytes", self.len()),
            ));
        }
        Ok(written as u64)
    }

    /// Reads bytes starting at `offset` into `buf`, returning how many were copied.
    ///
    /// Like positional file reads, the count may be smaller than `buf` when the view ends
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] for a negative offset and
    /// [`io::ErrorKind::UnexpectedEof`] when `offset` is at or past the end of the view.
    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> io::Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative offset"));
        };
        if offset >= self.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("offset {offset} is at or past the end of a {}-byte view", self.len()),
            ));
        }

        let available = &self.0[offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    /// Returns `true` if the view holds exactly `other`.
    #[must_use]
    pub fn equal_bytes(&self, other: &[u8]) -> bool {
        self.0 == other
    }

    /// Returns `true` if the view holds exactly the UTF-8 bytes of `other`.
    #[must_use]
    pub fn equal_str(&self, other: &str) -> bool {
        self.equal_bytes(other.as_bytes())
    }
}

impl Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView").field(&self.to_string_lossy()).finish()
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<ByteView> for Bytes {
    fn from(view: ByteView) -> Self {
        view.0
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for ByteView {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&'static str> for ByteView {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for ByteView {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl PartialEq<[u8]> for ByteView {
    fn eq(&self, other: &[u8]) -> bool {
        self.equal_bytes(other)
    }
}

impl PartialEq<str> for ByteView {
    fn eq(&self, other: &str) -> bool {
        self.equal_str(other)
    }
}

impl PartialEq<&str> for ByteView {
    fn eq(&self, other: &&str) -> bool {
        self.equal_str(other)
    }
}
