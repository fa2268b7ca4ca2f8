//! Hand configuration objects to a real-time thread.
//!
//! The control thread builds a new configuration (allocating as much as it
//! likes) and [`push`](ConfigWriter::push)es it. The real-time thread calls
//! [`poll`](ConfigReader::poll) once per block and gets a reference to the
//! newest configuration. The reader never allocates, frees or blocks: nodes it
//! has moved past are flagged as abandoned, and the writer frees them on its
//! next push.
//!
//! ```
//! use puffer::ConfigQueue;
//!
//! let (mut writer, mut reader) = ConfigQueue::new();
//! assert_eq!(reader.poll(), None);
//!
//! writer.push(vec![0.5f32; 4]);
//! writer.push(vec![0.25f32; 4]);
//! assert_eq!(reader.poll().map(|gains| gains[0]), Some(0.25));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::trace;

struct Node<T> {
    payload: T,
    /// Next newer node, null for the newest.
    next: AtomicPtr<Node<T>>,
    /// Set by the reader once it has moved past this node.
    abandoned: AtomicBool,
}

struct Shared<T> {
    /// Oldest node still allocated. Only the writer (or teardown) moves it.
    root: AtomicPtr<Node<T>>,
    _owns: PhantomData<Box<Node<T>>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut node = *self.root.get_mut();
        while !node.is_null() {
            // SAFETY: both handles are gone, so nothing else references the
            // list, and every node was created by `Box::into_raw` in `push`.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
        }
    }
}

// SAFETY: payloads are created on the writer thread, read on the reader
// thread and freed on whichever thread drops last, so `T: Send` is required.
// A payload is only ever borrowed by the reader, and only freed after the
// reader has published (release) that it no longer uses it.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Constructor for a connected [`ConfigWriter`] / [`ConfigReader`] pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigQueue;

impl ConfigQueue {
    /// Create an empty queue.
    ///
    /// Returns the `(writer, reader)` pair; move the reader to the real-time
    /// thread.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T: Send>() -> (ConfigWriter<T>, ConfigReader<T>) {
        let shared = Arc::new(Shared {
            root: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        });

        let writer = ConfigWriter {
            shared: Arc::clone(&shared),
            tail: ptr::null_mut(),
            _unsync: PhantomData,
        };
        let reader = ConfigReader {
            shared,
            current: ptr::null_mut(),
            _unsync: PhantomData,
        };
        (writer, reader)
    }
}

/// Control-thread end of a [`ConfigQueue`]. Allocates and frees.
pub struct ConfigWriter<T> {
    shared: Arc<Shared<T>>,
    /// Newest node, null before the first push.
    tail: *mut Node<T>,
    _unsync: PhantomUnsync,
}

// SAFETY: `tail` points into the list owned by `shared`; moving the handle to
// another thread moves sole write access with it.
unsafe impl<T: Send> Send for ConfigWriter<T> {}

impl<T: Send> ConfigWriter<T> {
    /// Append `payload` as the newest configuration, then free every node the
    /// reader has abandoned.
    pub fn push(&mut self, payload: T) {
        let node = Box::into_raw(Box::new(Node {
            payload,
            next: AtomicPtr::new(ptr::null_mut()),
            abandoned: AtomicBool::new(false),
        }));

        if self.tail.is_null() {
            self.shared.root.store(node, Ordering::Release);
        } else {
            // SAFETY: the tail has no successor, so the reader cannot have
            // abandoned it and it is still allocated.
            unsafe { (*self.tail).next.store(node, Ordering::Release) };
        }
        self.tail = node;

        self.reclaim();
    }

    /// Number of configurations still allocated, including the one the
    /// reader is using.
    pub fn retained(&self) -> usize {
        let mut count = 0;
        let mut node = self.shared.root.load(Ordering::Relaxed);
        while !node.is_null() {
            count += 1;
            // SAFETY: only this handle frees nodes.
            node = unsafe { (*node).next.load(Ordering::Acquire) };
        }
        count
    }

    fn reclaim(&mut self) {
        let mut freed = 0usize;
        loop {
            let root = self.shared.root.load(Ordering::Relaxed);
            if root.is_null() {
                break;
            }
            // SAFETY: `root` is allocated; only this handle frees nodes.
            let node = unsafe { &*root };
            // Pairs with the release-store in `ConfigReader::step`.
            if !node.abandoned.load(Ordering::Acquire) {
                break;
            }
            // An abandoned node always has a successor.
            let next = node.next.load(Ordering::Relaxed);
            self.shared.root.store(next, Ordering::Relaxed);
            // SAFETY: the reader has moved past this node and never goes
            // back, and the root pointer no longer reaches it.
            drop(unsafe { Box::from_raw(root) });
            freed += 1;
        }
        if freed > 0 {
            trace!(freed, "reclaimed abandoned configurations");
        }
    }
}

/// Real-time end of a [`ConfigQueue`]. Never allocates, frees or blocks.
pub struct ConfigReader<T> {
    shared: Arc<Shared<T>>,
    /// Node most recently returned, null before the first successful poll.
    current: *mut Node<T>,
    _unsync: PhantomUnsync,
}

// SAFETY: see `ConfigWriter`.
unsafe impl<T: Send> Send for ConfigReader<T> {}

impl<T: Send> ConfigReader<T> {
    /// The newest configuration, skipping any pushed in between.
    ///
    /// Returns the same configuration as last time if nothing new was pushed,
    /// and `None` only if nothing was ever pushed.
    pub fn poll(&mut self) -> Option<&T> {
        self.start();
        while self.step() {}
        self.payload()
    }

    /// The configuration after the one returned last, or the same one if
    /// there is no newer configuration.
    pub fn poll_1(&mut self) -> Option<&T> {
        if !self.start() {
            self.step();
        }
        self.payload()
    }

    /// Point `current` at the oldest node if it is unset. Returns whether it
    /// was set by this call.
    fn start(&mut self) -> bool {
        if !self.current.is_null() {
            return false;
        }
        // Nothing is abandoned before the reader starts, so the root has not
        // moved since the first push.
        self.current = self.shared.root.load(Ordering::Acquire);
        true
    }

    /// Move to the next newer node, abandoning the current one.
    fn step(&mut self) -> bool {
        if self.current.is_null() {
            return false;
        }
        // SAFETY: `current` is never abandoned, so the writer keeps it alive.
        let node = unsafe { &*self.current };
        let next = node.next.load(Ordering::Acquire);
        if next.is_null() {
            return false;
        }
        self.current = next;
        node.abandoned.store(true, Ordering::Release);
        true
    }

    fn payload(&self) -> Option<&T> {
        // SAFETY: as in `step`. The borrow ends before `current` can move.
        unsafe { self.current.as_ref() }.map(|node| &node.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_polls_none() {
        let (_writer, mut reader) = ConfigQueue::new::<u32>();
        assert_eq!(reader.poll(), None);
        assert_eq!(reader.poll_1(), None);
    }

    #[test]
    fn poll_skips_to_newest() {
        let (mut writer, mut reader) = ConfigQueue::new();
        writer.push('A');
        writer.push('B');
        writer.push('C');

        assert_eq!(reader.poll(), Some(&'C'));
        assert_eq!(reader.poll_1(), Some(&'C'));

        writer.push('D');
        assert_eq!(reader.poll_1(), Some(&'D'));
        assert_eq!(reader.poll(), Some(&'D'));
    }

    #[test]
    fn first_poll_returns_newest() {
        let (mut writer, mut reader) = ConfigQueue::new();
        writer.push('A');
        writer.push('B');
        writer.push('C');
        assert_eq!(reader.poll(), Some(&'C'));

        // A and B were passed over and go on the next push.
        writer.push('D');
        assert_eq!(writer.retained(), 2);
    }

    #[test]
    fn poll_1_steps_one_at_a_time() {
        let (mut writer, mut reader) = ConfigQueue::new();
        for n in 1..=3 {
            writer.push(n);
        }
        assert_eq!(reader.poll_1(), Some(&1));
        assert_eq!(reader.poll_1(), Some(&2));
        assert_eq!(reader.poll_1(), Some(&3));
        assert_eq!(reader.poll_1(), Some(&3));
    }

    #[test]
    fn push_frees_only_abandoned_nodes() {
        let (mut writer, mut reader) = ConfigQueue::new();
        writer.push("a");
        writer.push("b");
        writer.push("c");
        assert_eq!(writer.retained(), 3);

        assert_eq!(reader.poll(), Some(&"c"));
        // Reclamation happens on the writer's next push.
        assert_eq!(writer.retained(), 3);

        writer.push("d");
        assert_eq!(writer.retained(), 2);
        assert_eq!(reader.poll_1(), Some(&"d"));

        writer.push("e");
        assert_eq!(writer.retained(), 2);
    }

    #[test]
    fn nothing_is_freed_before_the_reader_starts() {
        let (mut writer, mut reader) = ConfigQueue::new();
        for n in 0..10 {
            writer.push(n);
        }
        assert_eq!(writer.retained(), 10);
        assert_eq!(reader.poll_1(), Some(&0));
    }

    #[test]
    fn dropping_both_ends_frees_payloads() {
        let payload = Arc::new(());
        let (mut writer, mut reader) = ConfigQueue::new();
        for _ in 0..4 {
            writer.push(Arc::clone(&payload));
        }
        reader.poll();
        writer.push(Arc::clone(&payload));
        assert_eq!(Arc::strong_count(&payload), 1 + writer.retained());

        drop(writer);
        assert!(reader.poll().is_some());
        drop(reader);
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
