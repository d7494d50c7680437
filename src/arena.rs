use std::cell::{Cell, RefCell};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

const CHUNK_SIZE: usize = 4096;

/// Bump allocator over fixed-size chunks backing the in-memory write buffer.
///
/// There is no per-allocation free: every chunk is released together when the
/// arena is dropped. Allocations borrow from `&self` so that many of them can
/// be live at once; raw chunk storage is stable (`Box<[u8]>`), so the returned
/// slices stay valid until the arena itself goes away. The type is `!Sync`,
/// which enforces the caller-synchronized contract; only [`memory_usage`]
/// (a relaxed atomic) is meaningful to read from elsewhere.
///
/// [`memory_usage`]: Arena::memory_usage
pub struct Arena {
    alloc_ptr: Cell<*mut u8>,
    remaining: Cell<usize>,
    chunks: RefCell<Vec<Box<[u8]>>>,
    memory_usage: AtomicUsize,
}

impl Arena {
    pub fn new() -> Arena {
        Arena {
            alloc_ptr: Cell::new(std::ptr::null_mut()),
            remaining: Cell::new(0),
            chunks: RefCell::new(Vec::new()),
            memory_usage: AtomicUsize::new(0),
        }
    }

    /// Returns `bytes` contiguous zeroed bytes, valid until the arena drops.
    pub fn allocate(&self, bytes: usize) -> &mut [u8] {
        assert!(bytes > 0, "zero-sized arena allocation");
        if bytes <= self.remaining.get() {
            let ptr = self.alloc_ptr.get();
            // Safety: `ptr..ptr+remaining` is unused space inside the current
            // chunk; bumping hands out disjoint regions.
            unsafe {
                self.alloc_ptr.set(ptr.add(bytes));
                self.remaining.set(self.remaining.get() - bytes);
                return slice::from_raw_parts_mut(ptr, bytes);
            }
        }
        self.allocate_fallback(bytes)
    }

    /// Like [`allocate`](Arena::allocate), but the result is aligned to
    /// `max(8, word size)`.
    pub fn allocate_aligned(&self, bytes: usize) -> &mut [u8] {
        const ALIGN: usize = if std::mem::size_of::<*const u8>() > 8 {
            std::mem::size_of::<*const u8>()
        } else {
            8
        };
        assert!(bytes > 0, "zero-sized arena allocation");

        let current_mod = self.alloc_ptr.get() as usize & (ALIGN - 1);
        let slop = if current_mod == 0 { 0 } else { ALIGN - current_mod };
        let needed = bytes + slop;
        if needed <= self.remaining.get() {
            // Safety: same bump discipline as `allocate`, with the slop
            // skipped to reach the next aligned address.
            unsafe {
                let ptr = self.alloc_ptr.get().add(slop);
                self.alloc_ptr.set(ptr.add(bytes));
                self.remaining.set(self.remaining.get() - needed);
                debug_assert_eq!(ptr as usize & (ALIGN - 1), 0);
                return slice::from_raw_parts_mut(ptr, bytes);
            }
        }
        // Fresh chunks come from the global allocator and are at least
        // word-aligned already.
        self.allocate_fallback(bytes)
    }

    /// Approximate total memory held by the arena, including bookkeeping.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn allocate_fallback(&self, bytes: usize) -> &mut [u8] {
        if bytes > CHUNK_SIZE / 4 {
            // A large request gets its own chunk, and the current chunk keeps
            // serving small allocations from its leftover space.
            let ptr = self.allocate_new_chunk(bytes);
            return unsafe { slice::from_raw_parts_mut(ptr, bytes) };
        }

        // Waste the remainder of the current chunk and start a fresh one.
        let ptr = self.allocate_new_chunk(CHUNK_SIZE);
        unsafe {
            self.alloc_ptr.set(ptr.add(bytes));
            self.remaining.set(CHUNK_SIZE - bytes);
            slice::from_raw_parts_mut(ptr, bytes)
        }
    }

    fn allocate_new_chunk(&self, chunk_bytes: usize) -> *mut u8 {
        let mut chunk = vec![0u8; chunk_bytes].into_boxed_slice();
        let ptr = chunk.as_mut_ptr();
        self.chunks.borrow_mut().push(chunk);
        self.memory_usage.fetch_add(
            chunk_bytes + std::mem::size_of::<usize>(),
            Ordering::Relaxed,
        );
        ptr
    }
}

impl Default for Arena {
    fn default() -> Arena {
        Arena::new()
    }
}
