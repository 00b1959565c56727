//! IrqMutex — spin::Mutex yang juga mematikan interrupt
//!
//! On a single CPU a spinlock alone is not enough: an interrupt handler
//! that tries to take a lock already held by the code it interrupted would
//! spin forever. The guard disables interrupts before locking and restores
//! the previous interrupt flag after unlocking.
//!
//! On the host (tests, tools) there are no interrupts and the wrapper is a
//! plain spin::Mutex.

use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

pub struct IrqMutex<T> {
    inner: Mutex<T>,
}

/// Field order matters: the lock is released before interrupts come back.
pub struct IrqMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _irq:  InterruptsOff,
}

impl<T> IrqMutex<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let irq = InterruptsOff::enter();
        IrqMutexGuard { guard: self.inner.lock(), _irq: irq }
    }

    pub fn try_lock(&self) -> Option<IrqMutexGuard<'_, T>> {
        let irq = InterruptsOff::enter();
        self.inner.try_lock().map(|guard| IrqMutexGuard { guard, _irq: irq })
    }
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T { &self.guard }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T { &mut self.guard }
}

// ---------------------------------------------------------------------------
// Interrupt flag save/restore
// ---------------------------------------------------------------------------

struct InterruptsOff {
    #[cfg_attr(not(all(feature = "baremetal", target_arch = "x86")), allow(dead_code))]
    was_enabled: bool,
}

#[cfg(all(feature = "baremetal", target_arch = "x86"))]
impl InterruptsOff {
    fn enter() -> Self {
        use x86::bits32::eflags::{self, EFlags};
        let was_enabled = unsafe { eflags::read() }.contains(EFlags::FLAGS_IF);
        unsafe { x86::irq::disable(); }
        Self { was_enabled }
    }
}

#[cfg(all(feature = "baremetal", target_arch = "x86"))]
impl Drop for InterruptsOff {
    fn drop(&mut self) {
        if self.was_enabled {
            unsafe { x86::irq::enable(); }
        }
    }
}

#[cfg(not(all(feature = "baremetal", target_arch = "x86")))]
impl InterruptsOff {
    fn enter() -> Self {
        Self { was_enabled: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_gives_exclusive_access() {
        let m = IrqMutex::new(5u32);
        {
            let mut g = m.lock();
            *g += 1;
            assert!(m.try_lock().is_none());
        }
        assert_eq!(*m.lock(), 6);
    }
}
