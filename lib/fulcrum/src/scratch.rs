//! Thread-local scratch arena: a per-thread linear allocator with
//! 16-byte alignment, intended for per-batch worker scratch that gets
//! `Reset` at the start of each batch rather than freed and reallocated.

use std::cell::RefCell;

const ALIGNMENT: usize = 16;

fn align_up(value: usize) -> usize {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Linear allocator over a growing byte buffer. `Allocate` never fails: on
/// exhaustion the buffer doubles. `Reset` rewinds the high-water mark
/// without releasing the underlying allocation.
pub struct ScratchArena {
    buffer: Vec<u8>,
    cursor: usize,
}

impl ScratchArena {
    pub fn new() -> Self {
        ScratchArena {
            buffer: vec![0u8; 4096],
            cursor: 0,
        }
    }

    /// Offset of a fresh `bytes`-byte, 16-byte-aligned region. Grows the
    /// backing buffer (doubling) if the current one can't fit the request.
    pub fn allocate(&mut self, bytes: usize) -> usize {
        let start = align_up(self.cursor);
        let end = start + bytes;

        if end > self.buffer.len() {
            let mut new_len = self.buffer.len().max(1);
            while new_len < end {
                new_len *= 2;
            }
            self.buffer.resize(new_len, 0);
        }

        self.cursor = end;
        start
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.buffer[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.buffer[offset..offset + len]
    }

    /// Rewind the high-water mark to zero without releasing memory.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn used(&self) -> usize {
        self.cursor
    }
}

impl Default for ScratchArena {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static THREAD_ARENA: RefCell<ScratchArena> = RefCell::new(ScratchArena::new());
}

/// Run `f` with exclusive access to this thread's arena. Each thread owns
/// an independent arena; `reset` on one thread never affects another.
pub fn with_thread_arena<R>(f: impl FnOnce(&mut ScratchArena) -> R) -> R {
    THREAD_ARENA.with(|arena| f(&mut arena.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_16_byte_aligned() {
        let mut arena = ScratchArena::new();
        let a = arena.allocate(3);
        let b = arena.allocate(5);
        assert_eq!(a % ALIGNMENT, 0);
        assert_eq!(b % ALIGNMENT, 0);
    }

    #[test]
    fn buffer_doubles_on_exhaustion() {
        let mut arena = ScratchArena::new();
        let initial_capacity = arena.capacity();
        arena.allocate(initial_capacity + 1);
        assert!(arena.capacity() > initial_capacity);
    }

    #[test]
    fn reset_rewinds_without_shrinking_buffer() {
        let mut arena = ScratchArena::new();
        arena.allocate(1024);
        let capacity_before = arena.capacity();
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.capacity(), capacity_before);
    }

    #[test]
    fn each_thread_has_an_independent_arena() {
        with_thread_arena(|arena| {
            arena.allocate(100);
        });
        let used_here = with_thread_arena(|arena| arena.used());
        assert!(used_here > 0);

        let used_elsewhere = std::thread::spawn(|| with_thread_arena(|arena| arena.used()))
            .join()
            .unwrap();
        assert_eq!(used_elsewhere, 0);
    }
}
