//! Per-thread bound on nested forcing and notification.

use core::cell::Cell;
use core::marker::PhantomData;

use crate::errors::{Error, Result};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of nesting on the current thread. Dropping it leaves the level.
///
/// Not `Send`: a guard must be released on the thread that entered it.
pub(crate) struct DepthGuard {
    _not_send: PhantomData<*const ()>,
}

impl DepthGuard {
    pub(crate) fn enter(max_depth: usize) -> Result<Self> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= max_depth {
                return Err(Error::excessive_recursion(current + 1, max_depth));
            }
            depth.set(current + 1);
            Ok(DepthGuard {
                _not_send: PhantomData,
            })
        })
    }

    pub(crate) fn current() -> usize {
        DEPTH.with(Cell::get)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nesting_is_bounded() {
        let base = DepthGuard::current();
        let outer = DepthGuard::enter(base + 2).unwrap();
        let inner = DepthGuard::enter(base + 2).unwrap();
        assert_eq!(DepthGuard::current(), base + 2);

        let err = DepthGuard::enter(base + 2).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ExcessiveRecursion);

        drop(inner);
        drop(outer);
        assert_eq!(DepthGuard::current(), base);
    }
}
