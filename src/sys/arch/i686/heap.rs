//! Heap — small fixed kernel heap
//!
//! The core never allocates, but `alloc` is linked (through `object`) and
//! the final binary needs a global allocator. 64 KiB in .bss, inside the
//! kernel page.

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;
use linked_list_allocator::LockedHeap;

const HEAP_SIZE: usize = 64 * 1024;

static mut HEAP: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

pub fn init() {
    // HEAP is handed out exactly once, here
    let mem = unsafe { &mut *addr_of_mut!(HEAP) };
    ALLOCATOR.lock().init_from_slice(mem);
    klog!("heap: {} KiB", HEAP_SIZE / 1024);
}
