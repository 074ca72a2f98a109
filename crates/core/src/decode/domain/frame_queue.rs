use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::decode::domain::decoded_frame::DecodedFrame;

/// Returned by [`FrameQueue::push`] when the queue has already been drained.
/// Carries the rejected frame back to the caller.
#[derive(Debug)]
pub struct QueueClosed(pub DecodedFrame);

/// Decoded frames waiting to be popped, ordered by ascending PTS.
///
/// Frames with equal PTS come out in the order they were pushed: each entry
/// is keyed by `(pts, sequence)` where `sequence` only ever grows.
///
/// All state sits behind one mutex. Critical sections only move entries in
/// and out of the map; frames are never released while the lock is held.
pub struct FrameQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    frames: BTreeMap<(i64, u64), DecodedFrame>,
    next_sequence: u64,
    closed: bool,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Inserts `frame` after every queued frame whose PTS is less than or
    /// equal to its own.
    pub fn push(&self, frame: DecodedFrame) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed(frame));
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.frames.insert((frame.pts(), sequence), frame);
        Ok(())
    }

    /// Removes and returns the frame with the smallest PTS, or `None` if the
    /// queue is empty. Never waits.
    pub fn pop(&self) -> Option<DecodedFrame> {
        self.lock().frames.pop_first().map(|(_, frame)| frame)
    }

    /// Detaches every queued frame and closes the queue to further pushes.
    ///
    /// The detached frames are released after the lock is dropped. Returns
    /// how many were released.
    pub fn drain(&self) -> usize {
        let detached = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.frames)
        };
        let released = detached.len();
        drop(detached);
        released
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// PTS of the frame the next `pop` would return.
    pub fn peek_pts(&self) -> Option<i64> {
        self.lock()
            .frames
            .first_key_value()
            .map(|((pts, _), _)| *pts)
    }

    // Every mutation completes before its guard drops, so a panic elsewhere
    // cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::domain::image_buffer::ImageBuffer;
    use crate::shared::pixel_format::FourCc;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Buffer that counts its own releases and remembers which push it was.
    struct CountingBuffer {
        label: usize,
        released: Arc<AtomicUsize>,
    }

    impl Drop for CountingBuffer {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ImageBuffer for CountingBuffer {
        fn pixel_format(&self) -> FourCc {
            FourCc::from_bytes(*b"2vuy")
        }
        fn width(&self) -> u32 {
            self.label as u32
        }
        fn height(&self) -> u32 {
            1
        }
        fn plane_count(&self) -> usize {
            0
        }
        fn plane(&self, _index: usize) -> Option<&[u8]> {
            None
        }
        fn stride(&self, _index: usize) -> Option<usize> {
            None
        }
    }

    fn frame(pts: i64, label: usize, released: &Arc<AtomicUsize>) -> DecodedFrame {
        let buffer = CountingBuffer {
            label,
            released: Arc::clone(released),
        };
        DecodedFrame::new(Arc::new(buffer), pts)
    }

    fn drain_pts(queue: &FrameQueue) -> Vec<i64> {
        std::iter::from_fn(|| queue.pop()).map(|f| f.pts()).collect()
    }

    #[test]
    fn test_out_of_order_pushes_pop_in_pts_order() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        for (i, pts) in [30, 10, 20].into_iter().enumerate() {
            queue.push(frame(pts, i, &released)).unwrap();
        }

        assert_eq!(queue.pop().map(|f| f.pts()), Some(10));
        assert_eq!(queue.pop().map(|f| f.pts()), Some(20));
        assert_eq!(queue.pop().map(|f| f.pts()), Some(30));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_equal_pts_keeps_push_order() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        queue.push(frame(15, 0, &released)).unwrap();
        queue.push(frame(15, 1, &released)).unwrap();

        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        assert_eq!(first.buffer().width(), 0);
        assert_eq!(second.buffer().width(), 1);
    }

    #[test]
    fn test_equal_pts_inserted_after_existing_run() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        queue.push(frame(20, 0, &released)).unwrap();
        queue.push(frame(10, 1, &released)).unwrap();
        queue.push(frame(20, 2, &released)).unwrap();
        queue.push(frame(10, 3, &released)).unwrap();
        queue.push(frame(30, 4, &released)).unwrap();

        let labels: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|f| f.buffer().width())
            .collect();
        assert_eq!(labels, vec![1, 3, 0, 2, 4]);
    }

    #[rstest]
    #[case::ascending(vec![1, 2, 3, 4])]
    #[case::descending(vec![4, 3, 2, 1])]
    #[case::negative(vec![0, -5, 5, -10])]
    #[case::duplicates(vec![7, 3, 7, 3, 7])]
    #[case::extremes(vec![i64::MAX, i64::MIN, 0])]
    fn test_pops_are_non_decreasing(#[case] input: Vec<i64>) {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        for (i, pts) in input.iter().enumerate() {
            queue.push(frame(*pts, i, &released)).unwrap();
        }

        let mut expected = input.clone();
        expected.sort();
        assert_eq!(drain_pts(&queue), expected);
    }

    #[test]
    fn test_pop_on_empty_is_repeatable() {
        let queue = FrameQueue::new();
        for _ in 0..3 {
            assert!(queue.pop().is_none());
        }
        assert!(queue.is_empty());
        assert_eq!(queue.peek_pts(), None);
    }

    #[test]
    fn test_len_and_peek_track_contents() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        queue.push(frame(50, 0, &released)).unwrap();
        queue.push(frame(40, 1, &released)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek_pts(), Some(40));
    }

    #[test]
    fn test_drain_releases_each_frame_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        for i in 0..5 {
            queue.push(frame(i as i64, i, &released)).unwrap();
        }

        assert_eq!(queue.drain(), 5);
        assert_eq!(released.load(Ordering::SeqCst), 5);
        assert!(queue.is_empty());

        assert_eq!(queue.drain(), 0);
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_popped_frame_released_by_consumer() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        queue.push(frame(1, 0, &released)).unwrap();
        queue.push(frame(2, 1, &released)).unwrap();

        let popped = queue.pop().unwrap();
        assert_eq!(queue.drain(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        drop(popped);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_push_after_drain_is_rejected() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        queue.drain();
        assert!(queue.is_closed());

        let QueueClosed(rejected) = queue.push(frame(9, 0, &released)).unwrap_err();
        assert_eq!(rejected.pts(), 9);
        assert!(queue.is_empty());

        drop(rejected);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_pushers_and_poppers_observe_order() {
        const PREFILL: usize = 500;
        const PUSHERS: usize = 4;
        const PER_PUSHER: usize = 250;
        const LATE_FLOOR: i64 = 10_000;

        let released = Arc::new(AtomicUsize::new(0));
        let queue = FrameQueue::new();
        for i in 0..PREFILL {
            let pts = ((i * 7919) % PREFILL) as i64;
            queue.push(frame(pts, i, &released)).unwrap();
        }

        let observed: Vec<Vec<i64>> = std::thread::scope(|scope| {
            for p in 0..PUSHERS {
                let queue = &queue;
                let released = &released;
                scope.spawn(move || {
                    for i in 0..PER_PUSHER {
                        let pts = LATE_FLOOR + ((i * 104_729 + p * 31) % 5000) as i64;
                        queue.push(frame(pts, i, released)).unwrap();
                    }
                });
            }

            let poppers: Vec<_> = (0..3)
                .map(|_| {
                    let queue = &queue;
                    scope.spawn(move || {
                        let mut seen = Vec::new();
                        for _ in 0..400 {
                            if let Some(popped) = queue.pop() {
                                seen.push(popped.pts());
                            }
                        }
                        seen
                    })
                })
                .collect();

            poppers.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for seen in &observed {
            // Prefilled frames were all queued before any pop began, so each
            // popper sees them in order and never after a late frame.
            let prefilled: Vec<i64> = seen.iter().copied().filter(|p| *p < LATE_FLOOR).collect();
            assert!(prefilled.windows(2).all(|w| w[0] <= w[1]));
            if let Some(first_late) = seen.iter().position(|p| *p >= LATE_FLOOR) {
                assert!(seen[first_late..].iter().all(|p| *p >= LATE_FLOOR));
            }
        }

        let remaining = drain_pts(&queue);
        assert!(remaining.windows(2).all(|w| w[0] <= w[1]));

        let popped: usize = observed.iter().map(Vec::len).sum();
        assert_eq!(popped + remaining.len(), PREFILL + PUSHERS * PER_PUSHER);
        assert_eq!(released.load(Ordering::SeqCst), PREFILL + PUSHERS * PER_PUSHER);
    }
}
