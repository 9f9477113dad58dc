//! Seq-stamped value slots
//!
//! A slot holds one `Copy` value behind a stamp. Readers copy the value out
//! and give up if the stamp moved during the copy; they never wait for a
//! writer. A hook that interrupts a writer on the same CPU therefore still
//! finishes. Writers claim the slot by setting the low stamp bit and fail
//! instead of spinning when another writer holds it.
//!
//! Stamp encoding: 0 is empty, odd is "being written", any other even value
//! is `(tag + 1) << 1` for the tag passed to the last completed write.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{fence, AtomicU64, Ordering};

const WRITING: u64 = 1;

#[inline]
const fn encode(tag: u64) -> u64 {
    tag.wrapping_add(1) << 1
}

#[inline]
const fn decode(stamp: u64) -> u64 {
    (stamp >> 1).wrapping_sub(1)
}

pub struct SeqSlot<T: Copy> {
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the value is only ever copied in and out whole, and a copy is
// handed out only when the stamp proves no write overlapped it.
unsafe impl<T: Copy + Send> Sync for SeqSlot<T> {}

impl<T: Copy> SeqSlot<T> {
    pub const fn empty() -> Self {
        Self {
            stamp: AtomicU64::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Slot holding `value` under tag 0
    pub const fn new(value: T) -> Self {
        Self {
            stamp: AtomicU64::new(encode(0)),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }
    }

    /// Store `value` under `tag`. False if another writer holds the slot.
    pub fn try_write(&self, tag: u64, value: T) -> bool {
        let cur = self.stamp.load(Ordering::Relaxed);
        if cur & WRITING != 0 {
            return false;
        }
        if self
            .stamp
            .compare_exchange(cur, cur | WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        fence(Ordering::Release);

        // SAFETY: the WRITING bit excludes other writers; readers discard
        // whatever they copy while it is set.
        unsafe { ptr::write_volatile(self.value.get(), MaybeUninit::new(value)) };

        self.stamp.store(encode(tag), Ordering::Release);
        true
    }

    /// Copy out `(tag, value)`. `None` when empty or written concurrently.
    pub fn read(&self) -> Option<(u64, T)> {
        let before = self.stamp.load(Ordering::Acquire);
        if before == 0 || before & WRITING != 0 {
            return None;
        }

        // SAFETY: a torn copy stays inside MaybeUninit and is dropped below
        // unless the stamp check proves it whole.
        let copy = unsafe { ptr::read_volatile(self.value.get()) };
        fence(Ordering::Acquire);
        if self.stamp.load(Ordering::Relaxed) != before {
            return None;
        }

        // SAFETY: stamp unchanged and even, so a completed write initialized it
        Some((decode(before), unsafe { copy.assume_init() }))
    }
}

impl<T: Copy> Default for SeqSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}
