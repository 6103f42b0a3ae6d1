//! Overwriting history ring buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::BufferError;

/// A thread-safe, fixed-capacity history window.
///
/// `RingBuffer<T>` keeps the `capacity` most recently pushed values. Once the
/// buffer is full every push overwrites the oldest value and hands it back to
/// the caller. Reads never consume data: values stay in the window until they
/// are overwritten.
///
/// # Semantics
///
/// - **Push**: Never blocks (beyond the internal lock), returns the evicted value
/// - **Read**: Indexed from the newest value backwards, never blocks for data
/// - **Clear**: Forgets live values without touching storage or the write cursor
///
/// Cloning a `RingBuffer` is cheap and shares the underlying storage, so one
/// clone can be handed to a producer thread while another is read elsewhere.
///
/// # Example
///
/// ```
/// use history_buffer::RingBuffer;
///
/// let buf = RingBuffer::<i32>::new(3);
/// for v in [10, 20, 30] {
///     assert_eq!(buf.push(v), 0);
/// }
/// assert!(buf.is_full());
///
/// // Full: the oldest value is evicted and returned.
/// assert_eq!(buf.push(40), 10);
/// assert_eq!(buf.read_from_end(0).unwrap(), 40);
/// assert_eq!(buf.read_from_end(2).unwrap(), 20);
/// assert!(buf.read_from_end(3).is_err());
/// ```
pub struct RingBuffer<T> {
    inner: Arc<RingBufferInner<T>>,
}

struct RingBufferInner<T> {
    capacity: usize,
    state: Mutex<RingBufferState<T>>,
    // Written outside `state`. Readers may briefly see a stale value after the
    // ingestion task has drained its source.
    finished: AtomicBool,
}

struct RingBufferState<T> {
    buf: Vec<T>,
    size: usize, // live values, 0..=capacity
    at: usize,   // slot of the next write, 0..capacity
}

impl<T> Clone for RingBuffer<T> {
    fn clone(&self) -> Self {
        RingBuffer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> RingBuffer<T> {
    /// Creates a new RingBuffer holding at most `capacity` values.
    ///
    /// Every slot starts out as `T::default()`. A capacity of zero is allowed:
    /// such a buffer is always both full and empty, drops every pushed value
    /// and rejects every read.
    pub fn new(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, T::default);

        RingBuffer {
            inner: Arc::new(RingBufferInner {
                capacity,
                state: Mutex::new(RingBufferState { buf, size: 0, at: 0 }),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Pushes a value as the newest element of the window.
    ///
    /// Returns the value that was overwritten when the buffer was already
    /// full, or `T::default()` while the buffer is still filling up.
    pub fn push(&self, value: T) -> T {
        let capacity = self.inner.capacity;
        if capacity == 0 {
            return T::default();
        }

        let mut state = self.lock();
        let at = state.at;
        let evicted = std::mem::replace(&mut state.buf[at], value);

        let result = if state.size < capacity {
            state.size += 1;
            T::default()
        } else {
            evicted
        };

        state.at = if at + 1 < capacity { at + 1 } else { 0 };
        result
    }
}

impl<T: Clone + Default> RingBuffer<T> {
    /// Returns the value `offset` pushes back from the newest one.
    ///
    /// `0` is the most recently pushed value and `len() - 1` the oldest live
    /// one. Offsets inside the capacity that have not been written yet read
    /// as `T::default()`. Offsets at or past the capacity fail with
    /// [`BufferError::OutOfRange`].
    pub fn read_from_end(&self, offset: usize) -> Result<T, BufferError> {
        let capacity = self.inner.capacity;
        if offset >= capacity {
            return Err(BufferError::OutOfRange { offset, capacity });
        }

        let state = self.lock();
        if offset >= state.size {
            // Within range, just not filled yet.
            return Ok(T::default());
        }

        let idx = (state.at + capacity - 1 - offset) % capacity;
        Ok(state.buf[idx].clone())
    }

    /// Returns the most recently pushed value, if any.
    pub fn latest(&self) -> Option<T> {
        let capacity = self.inner.capacity;
        let state = self.lock();
        if state.size == 0 {
            return None;
        }
        let idx = (state.at + capacity - 1) % capacity;
        Some(state.buf[idx].clone())
    }

    /// Returns a copy of all live values, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.len());
        self.for_each(|_, v| result.push(v.clone()));
        result
    }
}

impl<T> RingBuffer<T> {
    /// Returns the buffer capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of live values.
    pub fn len(&self) -> usize {
        self.lock().size
    }

    /// Returns true if the buffer holds no live values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the next push will overwrite the oldest value.
    pub fn is_full(&self) -> bool {
        self.len() == self.inner.capacity
    }

    /// Returns true once an ingestion task has drained its source.
    ///
    /// The flag is updated without taking the buffer lock, so it is a hint
    /// rather than a synchronization point: shortly after the source runs dry
    /// this may still report `false`. Join the ingestion handle to wait for
    /// completion.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Relaxed)
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.inner.finished.store(finished, Ordering::Relaxed);
    }

    /// Forgets all live values.
    ///
    /// Stored values and the write cursor are left as they are; later pushes
    /// start filling the window again from the current cursor.
    pub fn clear(&self) {
        self.lock().size = 0;
    }

    /// Calls `f` with every live value, oldest first.
    ///
    /// The first argument is the logical index, running from `0` (oldest) to
    /// `len() - 1` (newest). The buffer stays locked for the whole traversal:
    /// `f` must not call back into this buffer or any of its clones.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, &T),
    {
        let capacity = self.inner.capacity;
        let state = self.lock();
        if state.size == 0 {
            return;
        }

        // Oldest live slot. Without an intervening clear this is 0 while the
        // buffer fills and `at` once it is full.
        let start = (state.at + capacity - state.size) % capacity;
        for i in 0..state.size {
            f(i, &state.buf[(start + i) % capacity]);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingBufferState<T>> {
        // Critical sections never leave the state half-updated, so a panic in
        // a `for_each` visitor does not invalidate it.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_and_read_scenario() {
        let buf = RingBuffer::<i32>::new(3);

        assert_eq!(buf.push(10), 0);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.push(20), 0);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.push(30), 0);
        assert_eq!(buf.len(), 3);
        assert!(buf.is_full());

        assert_eq!(buf.push(40), 10);
        assert_eq!(buf.read_from_end(0).unwrap(), 40);
        assert_eq!(buf.read_from_end(1).unwrap(), 30);
        assert_eq!(buf.read_from_end(2).unwrap(), 20);
        assert_eq!(
            buf.read_from_end(3),
            Err(BufferError::OutOfRange {
                offset: 3,
                capacity: 3
            })
        );
    }

    #[test]
    fn test_capacity_bound() {
        for capacity in 1..6 {
            for n in 0..12 {
                let buf = RingBuffer::<usize>::new(capacity);
                for i in 0..n {
                    buf.push(i);
                }
                assert_eq!(buf.len(), n.min(capacity));
                assert_eq!(buf.is_full(), n >= capacity);
            }
        }
    }

    #[test]
    fn test_overwrite_returns_value_from_capacity_pushes_ago() {
        let buf = RingBuffer::<i32>::new(4);
        for i in 1..=4 {
            assert_eq!(buf.push(i), 0);
        }
        for i in 5..=20 {
            assert_eq!(buf.push(i), i - 4);
        }
    }

    #[test]
    fn test_recency_ordering() {
        let buf = RingBuffer::<String>::new(5);
        let values = ["a", "b", "c", "d"];
        for v in values {
            buf.push(v.to_string());
        }
        for (offset, expected) in values.iter().rev().enumerate() {
            assert_eq!(buf.read_from_end(offset).unwrap(), *expected);
        }
    }

    #[test]
    fn test_unpopulated_slot_reads_default() {
        let buf = RingBuffer::<f64>::new(4);
        buf.push(1.5);

        assert_eq!(buf.read_from_end(0).unwrap(), 1.5);
        assert_eq!(buf.read_from_end(1).unwrap(), 0.0);
        assert_eq!(buf.read_from_end(3).unwrap(), 0.0);
        assert!(buf.read_from_end(4).is_err());
    }

    #[test]
    fn test_for_each_not_full() {
        let buf = RingBuffer::<i32>::new(5);
        buf.push(1);
        buf.push(2);
        buf.push(3);

        let mut seen = Vec::new();
        buf.for_each(|i, v| seen.push((i, *v)));
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_for_each_matches_reversed_recency_when_full() {
        let buf = RingBuffer::<i32>::new(4);
        for i in 0..11 {
            buf.push(i);
        }

        let mut visited = Vec::new();
        buf.for_each(|_, v| visited.push(*v));

        let expected: Vec<i32> = (0..buf.len())
            .rev()
            .map(|offset| buf.read_from_end(offset).unwrap())
            .collect();
        assert_eq!(visited, expected);
        assert_eq!(visited, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_clear_resets_count_not_storage() {
        let buf = RingBuffer::<i32>::new(3);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        buf.push(4);

        buf.clear();
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
        assert!(!buf.is_full());
        assert_eq!(buf.read_from_end(0).unwrap(), 0);

        // Behaves like a fresh buffer even though old values are still stored.
        assert_eq!(buf.push(5), 0);
        assert_eq!(buf.read_from_end(0).unwrap(), 5);
        assert_eq!(buf.to_vec(), vec![5]);
    }

    #[test]
    fn test_clear_then_refill_iterates_from_cursor() {
        let buf = RingBuffer::<i32>::new(4);
        buf.push(1);
        buf.push(2);
        buf.clear();

        buf.push(3);
        buf.push(4);
        buf.push(5);
        assert_eq!(buf.to_vec(), vec![3, 4, 5]);

        assert_eq!(buf.push(6), 0);
        assert!(buf.is_full());
        assert_eq!(buf.push(7), 3);
        assert_eq!(buf.to_vec(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_zero_capacity() {
        let buf = RingBuffer::<i32>::new(0);
        assert!(buf.is_full());
        assert!(buf.is_empty());
        assert_eq!(buf.push(1), 0);
        assert_eq!(buf.len(), 0);
        assert!(buf.read_from_end(0).is_err());
        assert_eq!(buf.latest(), None);
        assert!(buf.to_vec().is_empty());

        buf.clear();
        assert!(buf.is_full());
    }

    #[test]
    fn test_latest() {
        let buf = RingBuffer::<i32>::new(2);
        assert_eq!(buf.latest(), None);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        assert_eq!(buf.latest(), Some(3));
    }

    #[test]
    fn test_finished_flag_starts_false() {
        let buf = RingBuffer::<i32>::new(2);
        assert!(!buf.is_finished());
    }

    #[test]
    fn test_concurrent_pushes() {
        let buf = RingBuffer::<usize>::new(64);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buf = buf.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        buf.push(t * 1000 + i + 1);
                    }
                })
            })
            .collect();

        let reader = {
            let buf = buf.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = buf.to_vec();
                    assert!(snapshot.len() <= 64);
                }
            })
        };

        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();

        assert!(buf.is_full());
        let snapshot = buf.to_vec();
        assert_eq!(snapshot.len(), 64);
        assert!(snapshot.iter().all(|&v| v > 0));
    }

    #[test]
    fn test_panicking_visitor_does_not_wedge_buffer() {
        let buf = RingBuffer::<i32>::new(2);
        buf.push(1);

        let visitor_buf = buf.clone();
        let result = thread::spawn(move || {
            visitor_buf.for_each(|_, _| panic!("visitor failed"));
        })
        .join();
        assert!(result.is_err());

        assert_eq!(buf.push(2), 0);
        assert_eq!(buf.to_vec(), vec![1, 2]);
    }
}
