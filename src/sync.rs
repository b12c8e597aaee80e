/// The raw marker the host repeats until we answer with `SyncObserved`.
pub const SYNC_SEQ: [u8; 4] = [0xC4, 0x55, 0x7E, 0x10];

/// A four byte shift register over the incoming stream.
///
/// Nothing but the last four bytes is remembered, and every byte is consumed
/// exactly once.
pub struct SyncDetector {
    window: [u8; SYNC_SEQ.len()],
}

impl SyncDetector {
    pub const fn new() -> Self {
        Self {
            window: [0u8; SYNC_SEQ.len()],
        }
    }

    /// Shift `byte` in, returning true when the window now holds the marker.
    pub fn push(&mut self, byte: u8) -> bool {
        self.window.rotate_left(1);
        self.window[SYNC_SEQ.len() - 1] = byte;
        self.window == SYNC_SEQ
    }
}

impl Default for SyncDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(stream: &[u8]) -> heapless::Vec<usize, 32> {
        let mut det = SyncDetector::new();
        stream
            .iter()
            .enumerate()
            .filter_map(|(i, b)| if det.push(*b) { Some(i) } else { None })
            .collect()
    }

    #[test]
    fn detects_marker_once_after_last_byte() {
        let hits = matches(&[0x00, 0xC4, 0x55, 0x7E, 0x10, 0x00]);
        assert_eq!(&hits[..], &[4]);
    }

    #[test]
    fn marker_must_be_contiguous() {
        assert!(matches(&[0xC4, 0x55, 0x00, 0x7E, 0x10]).is_empty());
        assert!(matches(&[0xC4, 0x55, 0x7E]).is_empty());
        assert!(matches(&[0x10, 0x7E, 0x55, 0xC4]).is_empty());
    }

    #[test]
    fn restarts_after_partial_match() {
        // A broken first attempt directly followed by a good one
        let hits = matches(&[0xC4, 0x55, 0xC4, 0x55, 0x7E, 0x10]);
        assert_eq!(&hits[..], &[5]);
    }

    #[test]
    fn repeated_markers_each_match() {
        let mut stream = [0u8; 8];
        stream[..4].copy_from_slice(&SYNC_SEQ);
        stream[4..].copy_from_slice(&SYNC_SEQ);
        let hits = matches(&stream);
        assert_eq!(&hits[..], &[3, 7]);
    }
}
