//! Two-unit access gate.
//!
//! One unit per direction: a read holds the receive unit, a write holds the
//! transmit unit, and exclusive operations hold both. One reader and one
//! writer may therefore run at the same time, but never alongside an
//! exclusive operation, and never two readers or two writers.
//!
//! Units are always taken in receive-then-transmit order, so exclusive
//! operations cannot deadlock against each other. All guards are RAII and
//! release on every exit path, including unwinding.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Gate protecting a piece of shared state `T`.
pub struct AccessGate<T> {
    rx: Mutex<()>,
    tx: Mutex<()>,
    state: RwLock<T>,
}

impl<T> AccessGate<T> {
    pub fn new(state: T) -> Self {
        Self {
            rx: Mutex::new(()),
            tx: Mutex::new(()),
            state: RwLock::new(state),
        }
    }

    /// Take the receive unit.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let unit = self.rx.lock();
        ReadGuard {
            state: self.state.read(),
            _unit: unit,
        }
    }

    /// Take the transmit unit.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let unit = self.tx.lock();
        WriteGuard {
            state: self.state.read(),
            _unit: unit,
        }
    }

    /// Take both units.
    pub fn exclusive(&self) -> ExclusiveGuard<'_, T> {
        let rx = self.rx.lock();
        let tx = self.tx.lock();
        ExclusiveGuard {
            state: self.state.write(),
            _tx: tx,
            _rx: rx,
        }
    }

    /// Direct access when no other reference can exist.
    pub fn get_mut(&mut self) -> &mut T {
        self.state.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for AccessGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AccessGate");
        match self.state.try_read() {
            Some(state) => s.field("state", &*state),
            None => s.field("state", &"<locked>"),
        };
        s.finish()
    }
}

// Fields drop in declaration order: the state lock goes before the units.

/// Shared view of the state while holding the receive unit.
pub struct ReadGuard<'a, T> {
    state: RwLockReadGuard<'a, T>,
    _unit: MutexGuard<'a, ()>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

/// Shared view of the state while holding the transmit unit.
pub struct WriteGuard<'a, T> {
    state: RwLockReadGuard<'a, T>,
    _unit: MutexGuard<'a, ()>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

/// Mutable view of the state while holding both units.
pub struct ExclusiveGuard<'a, T> {
    state: RwLockWriteGuard<'a, T>,
    _tx: MutexGuard<'a, ()>,
    _rx: MutexGuard<'a, ()>,
}

impl<T> Deref for ExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> DerefMut for ExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}
