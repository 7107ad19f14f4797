//! Thread-current environment stack.
//!
//! Every context-scoped call pushes its environment for the duration of the
//! call. Driver code that needs to resolve a class by name, without being
//! handed a [`CallContext`](crate::context::CallContext), reads the top of the
//! stack through [`current_environment`].

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::library::IsolatedEnvironment;

thread_local! {
    static STACK: RefCell<Vec<Arc<IsolatedEnvironment>>> = const { RefCell::new(Vec::new()) };
}

/// Restores the previously current environment when dropped.
///
/// Not `Send`: it must be dropped on the thread that created it.
#[must_use = "the environment is popped as soon as the guard is dropped"]
pub struct EnvironmentGuard {
    depth: usize,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        // truncating also discards anything an inner guard failed to pop
        STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Make `environment` current on this thread until the guard is dropped.
pub fn enter(environment: Arc<IsolatedEnvironment>) -> EnvironmentGuard {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(environment);
        EnvironmentGuard {
            depth,
            _thread_bound: PhantomData,
        }
    })
}

/// The environment of the innermost active call on this thread.
pub fn current_environment() -> Option<Arc<IsolatedEnvironment>> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Number of nested context-scoped calls active on this thread.
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::registry::Library;

    fn root() -> Arc<IsolatedEnvironment> {
        Arc::new(IsolatedEnvironment::root(HashMap::new()))
    }

    fn child(parent: &Arc<IsolatedEnvironment>, id: &str) -> Arc<IsolatedEnvironment> {
        Arc::new(IsolatedEnvironment::isolated(
            Library::new(id, ["/tmp/lib.zip"]).unwrap(),
            HashMap::new(),
            Arc::clone(parent),
            Arc::default(),
        ))
    }

    #[test]
    fn test_nested_guards_restore_outer() {
        let root = root();
        let outer = child(&root, "outer");
        let inner = child(&root, "inner");
        assert!(current_environment().is_none());

        {
            let _outer = enter(Arc::clone(&outer));
            {
                let _inner = enter(Arc::clone(&inner));
                assert!(Arc::ptr_eq(&current_environment().unwrap(), &inner));
                assert_eq!(depth(), 2);
            }
            assert!(Arc::ptr_eq(&current_environment().unwrap(), &outer));
        }

        assert!(current_environment().is_none());
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let root = root();
        let env = child(&root, "panicky");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = enter(Arc::clone(&env));
            panic!("driver blew up");
        }));

        assert!(result.is_err());
        assert!(current_environment().is_none());
    }

    #[test]
    fn test_stack_is_per_thread() {
        let root = root();
        let _guard = enter(Arc::clone(&root));

        let seen = std::thread::spawn(|| current_environment().is_some())
            .join()
            .unwrap();
        assert!(!seen);
        assert!(current_environment().is_some());
    }
}
