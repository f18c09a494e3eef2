//! Wait-free enqueue, adaptively-blocking dequeue FIFO queue.
//!
//! A singly linked list with a sentinel `head` node and an atomic `tail`
//! pointer. Producers splice onto the tail in two stores and never
//! retry; the consumer side advances through `head.next`, waiting out
//! the transient window between a producer's two stores when it must.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::backoff::{AdaptiveWait, BackoffConfig};
use crate::node::{link_to_node, node_to_link, Link, Node};
use crate::WouldBlock;
use std::ptr::NonNull;

/// Wait for `link.next` to stop being null, spinning then sleeping per
/// `backoff`. Used whenever the caller knows (from `tail.p != node`)
/// that a follow-on store must eventually land.
fn sync_next_blocking(link: &Link, backoff: &BackoffConfig) -> *mut Link {
    let mut wait = AdaptiveWait::new(*backoff);
    loop {
        let next = link.next.load(Ordering::Acquire);
        if !next.is_null() {
            return next;
        }
        wait.step();
    }
}

/// Single non-blocking check of the same condition, for the non-blocking
/// API variants.
fn try_sync_next(link: &Link) -> Option<*mut Link> {
    let next = link.next.load(Ordering::Acquire);
    if next.is_null() {
        None
    } else {
        Some(next)
    }
}

/// Hand a just-removed link back to the caller as an owned node, clearing
/// its debug-only "linked" marker so a later reuse doesn't spuriously trip
/// the double-enqueue assertion in [`Wfcq::enqueue`].
unsafe fn take_node<T>(link_ptr: *mut Link) -> Box<Node<T>> {
    (*link_ptr).mark_unlinked();
    Node::from_raw(link_to_node(link_ptr))
}

fn append_chain(tail: &AtomicPtr<Link>, new_head: *mut Link, new_tail: *mut Link) {
    // The exchange is the producer's linearization point and carries a
    // full fence: every write to the appended chain becomes visible to
    // whichever consumer later follows `next` into it.
    let old_tail = tail.swap(new_tail, Ordering::AcqRel);
    unsafe {
        (*old_tail).next.store(new_head, Ordering::Release);
    }
}

/// A multi-producer, multi-consumer wait-free FIFO queue of `Node<T>`.
///
/// Must not be moved after construction: the sentinel is heap-allocated
/// once in `new()` precisely so that its address stays valid across
/// moves of the `Wfcq` value itself, but `tail`/`head` comparisons are
/// made against that fixed address, not against `self`'s address, so
/// moving a `Wfcq<T>` around (e.g. inside a `Vec`) is actually fine —
/// only the sentinel's own allocation must outlive the queue, which
/// `Drop` guarantees.
pub struct Wfcq<T> {
    head_sentinel: *mut Link,
    tail: AtomicPtr<Link>,
    lock: Mutex<()>,
    backoff: BackoffConfig,
}

unsafe impl<T: Send> Send for Wfcq<T> {}
unsafe impl<T: Send> Sync for Wfcq<T> {}

impl<T> Wfcq<T> {
    /// Build a new, empty queue. The Rust equivalent of the original's
    /// separate `init(head, tail)` step: construction and initialization
    /// happen together since there is no pre-existing raw memory to
    /// initialize into.
    pub fn new() -> Self {
        Self::with_backoff(BackoffConfig::default())
    }

    /// As [`Wfcq::new`], but overriding the adaptive-wait tuning.
    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        let sentinel = Box::into_raw(Box::new(Link::new()));
        tracing::debug!("wfcq initialized");
        Wfcq {
            head_sentinel: sentinel,
            tail: AtomicPtr::new(sentinel),
            lock: Mutex::new(()),
            backoff,
        }
    }

    fn head(&self) -> &Link {
        unsafe { &*self.head_sentinel }
    }

    /// Unsynchronized snapshot; carries no memory barrier. Checks
    /// `head.next` before `tail.p` so that a consumer never has to touch
    /// the producer-owned tail cache line unless the head-side check is
    /// inconclusive.
    pub fn is_empty(&self) -> bool {
        self.head().next.load(Ordering::Relaxed).is_null()
            && self.tail.load(Ordering::Relaxed) == self.head_sentinel
    }

    /// Wait-free, multi-producer-safe. Publishes `node` in two stores
    /// with no retry loop.
    pub fn enqueue(&self, node: Box<Node<T>>) {
        let node_ptr = Node::into_raw(node);
        let link_ptr = node_to_link(node_ptr);
        let link = unsafe { &*link_ptr };
        debug_assert!(
            !link.mark_linked(),
            "wfcq enqueue called with a node that is already linked"
        );
        // A node reused after `dequeue` may still carry whatever `next`
        // pointed at in its previous position; that must not leak into
        // this enqueue episode, or a consumer following it would read a
        // stale/dangling pointer instead of waiting out the real second
        // store below. Not yet reachable by any consumer, so relaxed is
        // enough.
        link.next.store(ptr::null_mut(), Ordering::Relaxed);
        append_chain(&self.tail, link_ptr, link_ptr);
    }

    /// Blocking variant of `first`: waits out an in-flight producer if
    /// the queue is non-empty but the sentinel's `next` hasn't landed
    /// yet.
    pub fn first(&self) -> Option<NonNull<Node<T>>> {
        if self.is_empty() {
            return None;
        }
        let link = sync_next_blocking(self.head(), &self.backoff);
        Some(unsafe { NonNull::new_unchecked(link_to_node(link)) })
    }

    /// Non-blocking variant of `first`.
    pub fn try_first(&self) -> Result<Option<NonNull<Node<T>>>, WouldBlock> {
        if self.is_empty() {
            return Ok(None);
        }
        match try_sync_next(self.head()) {
            Some(link) => Ok(Some(unsafe { NonNull::new_unchecked(link_to_node(link)) })),
            None => Err(WouldBlock),
        }
    }

    /// Blocking variant of `next`. Returns `None` at end of queue, or
    /// the following node.
    pub fn next(&self, node: NonNull<Node<T>>) -> Option<NonNull<Node<T>>> {
        let link_ptr = node_to_link(node.as_ptr());
        let link = unsafe { &*link_ptr };
        let next = link.next.load(Ordering::Acquire);
        let next = if next.is_null() {
            if self.tail.load(Ordering::Acquire) == link_ptr {
                return None;
            }
            sync_next_blocking(link, &self.backoff)
        } else {
            next
        };
        Some(unsafe { NonNull::new_unchecked(link_to_node(next)) })
    }

    /// Non-blocking variant of `next`.
    pub fn try_next(
        &self,
        node: NonNull<Node<T>>,
    ) -> Result<Option<NonNull<Node<T>>>, WouldBlock> {
        let link_ptr = node_to_link(node.as_ptr());
        let link = unsafe { &*link_ptr };
        let next = link.next.load(Ordering::Acquire);
        if next.is_null() {
            if self.tail.load(Ordering::Acquire) == link_ptr {
                return Ok(None);
            }
            match try_sync_next(link) {
                Some(next) => Ok(Some(unsafe { NonNull::new_unchecked(link_to_node(next)) })),
                None => Err(WouldBlock),
            }
        } else {
            Ok(Some(unsafe { NonNull::new_unchecked(link_to_node(next)) }))
        }
    }

    /// Raw blocking dequeue. Requires the caller to already hold
    /// exclusive consumer access (via [`Wfcq::dequeue_lock`], an
    /// external lock, or a single-consumer discipline) — see
    /// [`Wfcq::dequeue_blocking`] for a self-locking convenience
    /// wrapper.
    pub fn dequeue(&self) -> Option<Box<Node<T>>> {
        if self.is_empty() {
            return None;
        }
        let node_link = sync_next_blocking(self.head(), &self.backoff);
        let next = unsafe { (*node_link).next.load(Ordering::Acquire) };
        if !next.is_null() {
            self.head().next.store(next, Ordering::Release);
            return Some(unsafe { take_node(node_link) });
        }

        // Sole node: try to close the empty hole. Re-init the
        // sentinel's next *before* the CAS so a losing attempt can fall
        // straight into the adaptive wait below without re-reading
        // anything.
        self.head().next.store(ptr::null_mut(), Ordering::Relaxed);
        match self.tail.compare_exchange(
            node_link,
            self.head_sentinel,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                tracing::debug!("wfcq dequeue closed the empty hole");
                Some(unsafe { take_node(node_link) })
            }
            Err(_) => {
                let next = sync_next_blocking(unsafe { &*node_link }, &self.backoff);
                self.head().next.store(next, Ordering::Release);
                Some(unsafe { take_node(node_link) })
            }
        }
    }

    /// Raw non-blocking dequeue. Same exclusivity requirement as
    /// [`Wfcq::dequeue`].
    pub fn try_dequeue(&self) -> Result<Option<Box<Node<T>>>, WouldBlock> {
        if self.is_empty() {
            return Ok(None);
        }
        let node_link = try_sync_next(self.head()).ok_or(WouldBlock)?;
        let next = unsafe { (*node_link).next.load(Ordering::Acquire) };
        if !next.is_null() {
            self.head().next.store(next, Ordering::Release);
            return Ok(Some(unsafe { take_node(node_link) }));
        }

        self.head().next.store(ptr::null_mut(), Ordering::Relaxed);
        match self.tail.compare_exchange(
            node_link,
            self.head_sentinel,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(Some(unsafe { take_node(node_link) })),
            Err(_) => match try_sync_next(unsafe { &*node_link }) {
                Some(next) => {
                    self.head().next.store(next, Ordering::Release);
                    Ok(Some(unsafe { take_node(node_link) }))
                }
                None => Err(WouldBlock),
            },
        }
    }

    /// Raw blocking splice: detach all of `src` and append it to the
    /// tail of `self`. Requires the caller to hold exclusive access to
    /// `src` (not to `self` — splicing into `dest` never contends with
    /// enqueuers on `dest`).
    pub fn splice(&self, src: &Wfcq<T>) {
        if src.is_empty() {
            return;
        }
        let head = sync_next_blocking(src.head(), &src.backoff);
        src.head().next.store(ptr::null_mut(), Ordering::Relaxed);
        let tail = src.tail.swap(src.head_sentinel, Ordering::AcqRel);
        append_chain(&self.tail, head, tail);
    }

    /// Non-blocking splice.
    pub fn try_splice(&self, src: &Wfcq<T>) -> Result<(), WouldBlock> {
        if src.is_empty() {
            return Ok(());
        }
        let head = try_sync_next(src.head()).ok_or(WouldBlock)?;
        src.head().next.store(ptr::null_mut(), Ordering::Relaxed);
        let tail = src.tail.swap(src.head_sentinel, Ordering::AcqRel);
        append_chain(&self.tail, head, tail);
        Ok(())
    }

    /// Acquire the consumer-side mutex, extending a critical section
    /// across multiple raw operations (`dequeue`, `splice`, `first`,
    /// `next`). Released on drop.
    pub fn dequeue_lock(&self) -> DequeueLockGuard<'_> {
        DequeueLockGuard {
            _guard: self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }

    /// Convenience: locks, dequeues, unlocks.
    pub fn dequeue_blocking(&self) -> Option<Box<Node<T>>> {
        let _guard = self.dequeue_lock();
        self.dequeue()
    }

    /// Convenience: locks `src`, splices it into `self`, unlocks. `self`
    /// needs no lock of its own.
    pub fn splice_blocking(&self, src: &Wfcq<T>) {
        let _guard = src.dequeue_lock();
        self.splice(src);
    }
}

impl<T> Default for Wfcq<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Wfcq<T> {
    fn drop(&mut self) {
        while let Some(node) = self.dequeue() {
            drop(node);
        }
        unsafe {
            drop(Box::from_raw(self.head_sentinel));
        }
    }
}

/// RAII guard returned by [`Wfcq::dequeue_lock`]. Holds the consumer-side
/// mutex until dropped.
pub struct DequeueLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}
