//! Shared cells for passing state between hooks, steps and specs.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::declare::{after_each, before_each};

/// A cloneable, thread-safe slot that may or may not hold a value.
///
/// Blocks are `'static`, so they cannot borrow locals from the declaration;
/// clone a `Variable` into each block that needs it instead.
pub struct Variable<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Variable<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Variable").field(&*self.lock()).finish()
    }
}

impl<T> Variable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        let variable = Self::new();
        variable.set(value);
        variable
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, returning the previous one.
    pub fn set(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// `f` must not touch this variable again; the slot stays locked.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.lock().as_ref())
    }

    /// Mutate the value in place. Returns `None` when the slot is empty.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }
}

impl<T: Clone> Variable<T> {
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

/// Declare a value that is freshly created before every spec of the current
/// suite and dropped after it.
pub fn let_value<T, F>(supplier: F) -> Variable<T>
where
    T: Send + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let variable = Variable::new();
    let fill = variable.clone();
    before_each(move || {
        fill.set(supplier());
    });
    let drain = variable.clone();
    after_each(move || drain.clear());
    variable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_slot() {
        let first = Variable::new();
        let second = first.clone();
        assert_eq!(first.set(1), None);
        assert_eq!(second.get(), Some(1));
        assert_eq!(second.set(2), Some(1));
        assert_eq!(first.take(), Some(2));
        assert!(!second.is_set());
    }

    #[test]
    fn update_only_touches_present_values() {
        let counter = Variable::<u32>::new();
        assert_eq!(counter.update(|count| *count += 1), None);

        counter.set(1);
        counter.update(|count| *count += 1);
        assert_eq!(counter.with(|count| count.copied()), Some(2));

        counter.clear();
        assert_eq!(counter.get(), None);
    }

    #[test]
    fn works_across_threads() {
        let shared = Variable::with_value(Vec::<u8>::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.update(|items| items.push(n));
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(shared.with(|items| items.map(Vec::len)), Some(4));
    }
}
