//! Buffer metadata types.

use crate::clock::ClockTime;

/// Flags describing buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// First buffer after a gap in the stream (seek, drop by a leaky queue).
    pub discont: bool,
    /// Buffer carries no meaningful data, only timing.
    pub gap: bool,
    /// Buffer cannot be decoded independently.
    pub delta_unit: bool,
    /// Buffer is corrupted or incomplete.
    pub corrupted: bool,
}

/// Metadata associated with a buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Presentation timestamp, in running time.
    pub pts: Option<ClockTime>,
    /// Decode timestamp.
    pub dts: Option<ClockTime>,
    /// Duration of the buffer's content.
    pub duration: Option<ClockTime>,
    /// Media-specific offset (sample index for audio).
    pub offset: Option<u64>,
    /// Media-specific end offset.
    pub offset_end: Option<u64>,
    /// Monotonic sequence number within a stream.
    pub sequence: u64,
    /// Stream identifier used for demultiplexing.
    pub stream_id: Option<u64>,
    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Metadata {
    /// Create metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the sample offsets.
    pub fn with_offsets(mut self, offset: u64, offset_end: u64) -> Self {
        self.offset = Some(offset);
        self.offset_end = Some(offset_end);
        self
    }

    /// Set the stream id.
    pub fn with_stream_id(mut self, stream_id: u64) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// End timestamp (`pts + duration`) if both are known.
    pub fn end_time(&self) -> Option<ClockTime> {
        Some(self.pts? + self.duration?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_end_time() {
        let meta = Metadata::with_sequence(7)
            .with_pts(ClockTime::SECOND)
            .with_duration(ClockTime::from_mseconds(20))
            .with_stream_id(3);
        assert_eq!(meta.sequence, 7);
        assert_eq!(meta.stream_id, Some(3));
        assert_eq!(meta.end_time(), Some(ClockTime::from_mseconds(1020)));
        assert_eq!(Metadata::new().end_time(), None);
    }
}
