//! Outbound frame rechunking
//!
//! The gateway contract: outbound frames are 3200-byte chunks (100 ms at
//! 8 kHz / 16-bit), and a flushed stream must end on a 320-byte boundary
//! (zero-padded). Sequence numbers are monotonic per call.

use outdial_core::audio::{FRAME_PAD_BOUNDARY, OUTBOUND_FRAME_BYTES};

/// One framed outbound chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub sequence: u64,
    pub pcm: Vec<u8>,
}

/// Rebuffers arbitrary provider chunk sizes into gateway frames
#[derive(Debug, Default)]
pub struct FrameRechunker {
    buffer: Vec<u8>,
    sequence: u64,
}

impl FrameRechunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed provider audio; returns any full frames now available
    pub fn push(&mut self, pcm: &[u8]) -> Vec<OutboundFrame> {
        self.buffer.extend_from_slice(pcm);

        let mut frames = Vec::new();
        while self.buffer.len() >= OUTBOUND_FRAME_BYTES {
            let chunk: Vec<u8> = self.buffer.drain(..OUTBOUND_FRAME_BYTES).collect();
            frames.push(self.next_frame(chunk));
        }
        frames
    }

    /// Flush the remainder, zero-padded to the 320-byte boundary
    pub fn flush(&mut self) -> Option<OutboundFrame> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut chunk = std::mem::take(&mut self.buffer);
        let remainder = chunk.len() % FRAME_PAD_BOUNDARY;
        if remainder != 0 {
            chunk.resize(chunk.len() + FRAME_PAD_BOUNDARY - remainder, 0);
        }
        Some(self.next_frame(chunk))
    }

    /// Drop buffered audio without emitting (barge-in / teardown)
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn next_frame(&mut self, pcm: Vec<u8>) -> OutboundFrame {
        let frame = OutboundFrame {
            sequence: self.sequence,
            pcm,
        };
        self.sequence += 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_frames() {
        let mut rechunker = FrameRechunker::new();
        let frames = rechunker.push(&vec![1u8; OUTBOUND_FRAME_BYTES * 2]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pcm.len(), OUTBOUND_FRAME_BYTES);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert!(rechunker.flush().is_none());
    }

    #[test]
    fn test_variable_chunks_rebuffered() {
        let mut rechunker = FrameRechunker::new();
        // Provider sends odd-sized chunks
        assert!(rechunker.push(&vec![0u8; 1000]).is_empty());
        assert!(rechunker.push(&vec![0u8; 2000]).is_empty());
        let frames = rechunker.push(&vec![0u8; 500]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_flush_pads_to_boundary() {
        let mut rechunker = FrameRechunker::new();
        rechunker.push(&vec![7u8; 100]);
        let frame = rechunker.flush().unwrap();
        assert_eq!(frame.pcm.len(), FRAME_PAD_BOUNDARY);
        assert_eq!(&frame.pcm[..100], &[7u8; 100][..]);
        assert!(frame.pcm[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flush_on_boundary_not_padded() {
        let mut rechunker = FrameRechunker::new();
        rechunker.push(&vec![1u8; FRAME_PAD_BOUNDARY * 3]);
        let frame = rechunker.flush().unwrap();
        assert_eq!(frame.pcm.len(), FRAME_PAD_BOUNDARY * 3);
    }

    #[test]
    fn test_sequence_strictly_increasing_across_sentences() {
        let mut rechunker = FrameRechunker::new();
        let first = rechunker.push(&vec![0u8; OUTBOUND_FRAME_BYTES]);
        rechunker.push(&vec![0u8; 10]);
        let flushed = rechunker.flush().unwrap();
        let second = rechunker.push(&vec![0u8; OUTBOUND_FRAME_BYTES]);

        assert_eq!(first[0].sequence, 0);
        assert_eq!(flushed.sequence, 1);
        assert_eq!(second[0].sequence, 2);
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut rechunker = FrameRechunker::new();
        rechunker.push(&vec![0u8; 100]);
        rechunker.clear();
        assert!(rechunker.flush().is_none());
    }

    #[test]
    fn test_all_frames_multiple_of_boundary() {
        let mut rechunker = FrameRechunker::new();
        let mut frames = rechunker.push(&vec![0u8; 5000]);
        frames.extend(rechunker.flush());
        for frame in frames {
            assert_eq!(frame.pcm.len() % FRAME_PAD_BOUNDARY, 0);
        }
    }
}
