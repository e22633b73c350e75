// Lock-free SPSC ring buffer - one producer thread, one consumer thread,
// fixed power-of-two capacity, wait-free write/read. Ported from the shape
// of PortAudio's pa_ringbuffer (the original So-Fi implementation's backing
// store) onto atomic head/tail cursors instead of a C library binding.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Shared<T> {
    // `data.len()` is always a power of two; indices below are unmasked
    // monotonic counters, masked with `mask` on access, matching the
    // classic lock-free ring buffer trick (head/tail never compared
    // directly to `data.len()`, only their wrapped difference is).
    data: Box<[std::cell::UnsafeCell<T>]>,
    mask: usize,
    head: AtomicUsize, // next slot to write (producer-owned)
    tail: AtomicUsize, // next slot to read (consumer-owned)
}

// SAFETY: `Shared<T>` is accessed through non-overlapping `Producer`/
// `Consumer` handles that only ever touch disjoint slot ranges (the
// producer writes `[tail.load()+occupied, head)`-complement slots, the
// consumer reads `[tail, head)`), synchronized by the acquire/release
// fences on `head`/`tail` below.
unsafe impl<T: Send> Sync for Shared<T> {}

/// Create a new SPSC ring buffer of the given power-of-two `capacity`,
/// returning its producer and consumer halves.
pub fn channel<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity.is_power_of_two() && capacity > 0,
        "ring buffer capacity must be a nonzero power of two"
    );
    let data: Box<[std::cell::UnsafeCell<T>]> = (0..capacity)
        .map(|_| std::cell::UnsafeCell::new(T::default()))
        .collect();
    let shared = Arc::new(Shared {
        data,
        mask: capacity - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// The write half of an SPSC ring buffer. `!Sync`-by-convention: only one
/// thread should ever hold and use a given `Producer`.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// The read half of an SPSC ring buffer. `!Sync`-by-convention: only one
/// thread should ever hold and use a given `Consumer`.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

// Each handle is used by exactly one thread at a time in this crate, but
// the handle itself must be movable into that thread (e.g. into a cpal
// audio callback closure or a std::thread spawn).
unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T: Copy> Producer<T> {
    /// Capacity minus the number of elements currently queued for the
    /// reader.
    pub fn write_available(&self) -> usize {
        self.shared.data.len() - self.occupied()
    }

    fn occupied(&self) -> usize {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Write as many elements of `src` as fit, returning the count written.
    pub fn write(&mut self, src: &[T]) -> usize {
        let n = src.len().min(self.write_available());
        let head = self.shared.head.load(Ordering::Relaxed);
        for (i, &value) in src.iter().take(n).enumerate() {
            let idx = (head.wrapping_add(i)) & self.shared.mask;
            // SAFETY: this slot is not in `[tail, head)`, so the consumer
            // is not reading it; the producer is the sole writer.
            unsafe { *self.shared.data[idx].get() = value };
        }
        self.shared.head.store(head.wrapping_add(n), Ordering::Release);
        n
    }

    /// Write exactly one element, returning `false` if the ring is full.
    pub fn try_push(&mut self, value: T) -> bool {
        self.write(std::slice::from_ref(&value)) == 1
    }
}

impl<T: Copy> Consumer<T> {
    /// Number of elements currently queued for reading.
    pub fn read_available(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        let tail = self.shared.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    /// Read up to `dst.len()` queued elements into `dst`, returning the
    /// count read. Advances the read cursor (unlike `peek_regions`).
    pub fn read(&mut self, dst: &mut [T]) -> usize {
        let n = dst.len().min(self.read_available());
        let tail = self.shared.tail.load(Ordering::Relaxed);
        for (i, slot) in dst.iter_mut().take(n).enumerate() {
            let idx = (tail.wrapping_add(i)) & self.shared.mask;
            // SAFETY: this slot is within `[tail, head)`; the producer
            // will not touch it until `advance_read`/`read` releases it.
            *slot = unsafe { *self.shared.data[idx].get() };
        }
        self.shared.tail.store(tail.wrapping_add(n), Ordering::Release);
        n
    }

    /// Read exactly one element without a caller-supplied buffer.
    pub fn try_pop(&mut self) -> Option<T>
    where
        T: Default,
    {
        let mut slot = [T::default()];
        if self.read(&mut slot) == 1 {
            Some(slot[0])
        } else {
            None
        }
    }

    /// Up to two contiguous spans covering `min(n, read_available())`
    /// queued elements, without advancing the read cursor — for in-place,
    /// zero-copy consumption across the buffer wrap. Pair with
    /// `advance_read` once the caller is done with the data.
    pub fn peek_regions(&self, n: usize) -> (&[T], &[T]) {
        let head = self.shared.head.load(Ordering::Acquire);
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let available = head.wrapping_sub(tail).min(n);
        let start = tail & self.shared.mask;
        let cap = self.shared.data.len();
        let first_len = available.min(cap - start);
        let second_len = available - first_len;

        // SAFETY: `[start, start+first_len)` and `[0, second_len)` lie
        // entirely within `[tail, head)` (mod cap), which the producer
        // will not write into until the corresponding `advance_read`.
        unsafe {
            let base = self.shared.data.as_ptr();
            let first = std::slice::from_raw_parts(
                (base.add(start)) as *const T,
                first_len,
            );
            let second = std::slice::from_raw_parts(base as *const T, second_len);
            (first, second)
        }
    }

    /// Release `n` elements previously observed via `peek_regions` back to
    /// the producer.
    pub fn advance_read(&mut self, n: usize) {
        let n = n.min(self.read_available());
        let tail = self.shared.tail.load(Ordering::Relaxed);
        self.shared.tail.store(tail.wrapping_add(n), Ordering::Release);
    }
}
