//! Error types for buffer operations.

use thiserror::Error;

/// Buffer operation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The requested offset does not address a slot of the buffer.
    ///
    /// This is a caller bug, not a transient condition: the offset is never
    /// clamped or wrapped into range.
    #[error("buffer: offset {offset} out of range for capacity {capacity}")]
    OutOfRange { offset: usize, capacity: usize },

    /// The background ingestion task panicked or could not be joined.
    #[error("buffer: ingestion failed: {0}")]
    Ingest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_display() {
        let err = BufferError::OutOfRange {
            offset: 3,
            capacity: 3,
        };
        assert_eq!(
            err.to_string(),
            "buffer: offset 3 out of range for capacity 3"
        );
    }

    #[test]
    fn test_ingest_display() {
        let err = BufferError::Ingest("task panicked".into());
        assert_eq!(err.to_string(), "buffer: ingestion failed: task panicked");
    }
}
