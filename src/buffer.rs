//! Buffer type passed between pads.

use crate::clock::ClockTime;
use crate::metadata::Metadata;
use bytes::Bytes;

/// A chunk of media data plus its metadata.
///
/// The payload is a reference-counted [`Bytes`], so cloning a buffer (for
/// example in a tee) never copies the data.
///
/// ```rust
/// use padflow::buffer::Buffer;
/// use padflow::clock::ClockTime;
///
/// let buffer = Buffer::from_slice(b"abcd").with_pts(ClockTime::SECOND);
/// let copy = buffer.clone();
/// assert_eq!(copy.as_bytes().as_ptr(), buffer.as_bytes().as_ptr());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Buffer {
    data: Bytes,
    metadata: Metadata,
}

impl Buffer {
    /// Create a buffer from data and metadata.
    pub fn new(data: impl Into<Bytes>, metadata: Metadata) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Create a buffer by copying a slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data), Metadata::new())
    }

    /// Create a zero-filled buffer of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self::new(vec![0u8; size], Metadata::new())
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.metadata.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.metadata.duration = Some(duration);
        self
    }

    /// Buffer metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable buffer metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Option<ClockTime> {
        self.metadata.pts
    }

    /// Duration.
    pub fn duration(&self) -> Option<ClockTime> {
        self.metadata.duration
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload as a shared [`Bytes`] handle.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A view into part of this buffer sharing the same memory.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len()`.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        Buffer {
            data: self.data.slice(offset..offset + len),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_slice_shares_memory() {
        let buffer = Buffer::from_slice(&[1, 2, 3, 4, 5]);
        let sub = buffer.slice(1, 3);
        assert_eq!(sub.as_bytes(), &[2, 3, 4]);
        assert_eq!(sub.as_bytes().as_ptr(), buffer.as_bytes()[1..].as_ptr());
    }

    #[test]
    fn test_buffer_timestamps() {
        let buffer = Buffer::with_size(16)
            .with_pts(ClockTime::from_mseconds(40))
            .with_duration(ClockTime::from_mseconds(20));
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.pts(), Some(ClockTime::from_mseconds(40)));
        assert_eq!(
            buffer.metadata().end_time(),
            Some(ClockTime::from_mseconds(60))
        );
    }

    #[test]
    #[should_panic]
    fn test_slice_out_of_bounds() {
        let _ = Buffer::with_size(4).slice(2, 4);
    }
}
