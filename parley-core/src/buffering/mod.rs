//! Frame assembly for hosts that receive audio in arbitrary-sized buffers.
//!
//! The engine only accepts frames of exactly [`FRAME_LENGTH`] samples.
//! `FrameAssembler` sits between a capture callback or file decoder and the
//! session: it queues samples in a `ringbuf::HeapRb<i16>` and hands out full
//! frames as they become available.
//!
//! [`FRAME_LENGTH`]: crate::FRAME_LENGTH

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::FRAME_LENGTH;

/// Frames of headroom held by the ring.
pub const ASSEMBLER_FRAMES: usize = 64;

pub struct FrameAssembler {
    producer: HeapProd<i16>,
    consumer: HeapCons<i16>,
    frame: Vec<i16>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        let (producer, consumer) = HeapRb::<i16>::new(FRAME_LENGTH * ASSEMBLER_FRAMES).split();
        Self {
            producer,
            consumer,
            frame: vec![0; FRAME_LENGTH],
        }
    }

    /// Queue as many samples as fit. Returns how many were accepted; the
    /// caller drains frames with [`next_frame`](Self::next_frame) and pushes
    /// the rest.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Pop the next complete frame, if one is queued.
    pub fn next_frame(&mut self) -> Option<&[i16]> {
        if self.consumer.occupied_len() < FRAME_LENGTH {
            return None;
        }
        let n = self.consumer.pop_slice(&mut self.frame);
        debug_assert_eq!(n, FRAME_LENGTH);
        Some(&self.frame)
    }

    /// Pop whatever is left as one zero-padded frame.
    pub fn flush_padded(&mut self) -> Option<&[i16]> {
        let pending = self.consumer.occupied_len();
        if pending == 0 {
            return None;
        }
        let take = pending.min(FRAME_LENGTH);
        let n = self.consumer.pop_slice(&mut self.frame[..take]);
        self.frame[n..].fill(0);
        Some(&self.frame)
    }

    /// Samples queued but not yet handed out.
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        while self.consumer.pop_slice(&mut self.frame) > 0 {}
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
