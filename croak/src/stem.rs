use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// A thread-safe mutable memory location that allows
/// for many concurrent readers or a single writer.
///
/// Access is only possible through closures, so a lock guard
/// can never outlive the operation it was taken for.
///
/// A lock poisoned by a panicking thread is recovered rather than
/// propagated; the data it guards is always left in a consistent
/// state by the closures in this crate.
///
/// ```
/// use croak::stem::Stem;
///
/// let stem = Stem::new(vec![1]);
/// stem.map_mut(|v| v.push(2));
/// assert_eq!(stem.map_ref(|v| v.len()), 2);
/// ```
#[derive(Debug, Default)]
pub struct Stem<T>(RwLock<T>);

impl<T> Stem<T> {
  /// Create a new Stem cell
  pub const fn new(t: T) -> Self {
    Self(RwLock::new(t))
  }

  /// Map a reference to `T` to a new type
  ///
  /// This will block if called concurrently with `map_mut`.
  pub fn map_ref<F, R>(&self, f: F) -> R
    where F: FnOnce(&T) -> R
  {
    f(&self.0.read().unwrap_or_else(PoisonError::into_inner))
  }

  /// Map a mutable reference to `T` to a new type
  ///
  /// This will block if called concurrently with `map_ref` or `map_mut`.
  pub fn map_mut<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut T) -> R
  {
    f(&mut self.0.write().unwrap_or_else(PoisonError::into_inner))
  }

  /// Take the inner value
  pub fn into_inner(self) -> T {
    self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Lock a mutex, recovering from poisoning
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;

  use super::*;

  #[test]
  fn concurrent_writers() {
    let stem = Arc::new(Stem::new(0u32));
    let handles = (0..8).map(|_| {
                          let stem = stem.clone();
                          thread::spawn(move || (0..100).for_each(|_| stem.map_mut(|n| *n += 1)))
                        })
                        .collect::<Vec<_>>();

    handles.into_iter().for_each(|h| h.join().unwrap());
    assert_eq!(stem.map_ref(|n| *n), 800);
  }

  #[test]
  fn poisoned_lock_is_recovered() {
    let stem = Arc::new(Stem::new(1u32));
    let s = stem.clone();
    let _ = thread::spawn(move || s.map_mut(|_| panic!("boom"))).join();
    assert_eq!(stem.map_ref(|n| *n), 1);
  }
}
