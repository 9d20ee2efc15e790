//! Lock poisoning helpers
//!
//! Registries in this crate guard plain maps with `std::sync` locks that are
//! never held across an `.await`. A poisoned lock means a panic happened while
//! a registry was being mutated; these helpers turn that into the caller's
//! typed error instead of propagating the panic.

use std::sync::{LockResult, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

/// Convert a poisoned `Mutex::lock` result into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use metaingest::core::sync::handle_mutex_poison;
/// use metaingest::notifications::api::HubError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |what| HubError::Poisoned { what }).unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<'a, T, E>(
    result: LockResult<MutexGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    result.map_err(|_| error_constructor("mutex poisoned by a panicking holder".to_string()))
}

/// Convert a poisoned `RwLock::read` result into an application error
pub fn handle_rwlock_read<'a, T, E>(
    result: LockResult<RwLockReadGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'a, T>, E> {
    result.map_err(|_| error_constructor("rwlock poisoned (read) by a panicking writer".to_string()))
}

/// Convert a poisoned `RwLock::write` result into an application error
pub fn handle_rwlock_write<'a, T, E>(
    result: LockResult<RwLockWriteGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'a, T>, E> {
    result.map_err(|_| error_constructor("rwlock poisoned (write) by a panicking holder".to_string()))
}
