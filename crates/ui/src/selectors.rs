//! Selectors memoized by reference equality on their input slice: since
//! reducers always hand back a fresh `Arc` when (and only when) a slice
//! actually changed, `Arc::ptr_eq` is both sound and far cheaper than a
//! value comparison.

use std::sync::Arc;

use parking_lot::Mutex;

struct Cache<S, O> {
    input: Arc<S>,
    output: O,
}

pub struct Selector<S, O> {
    cache: Mutex<Option<Cache<S, O>>>,
    compute: Box<dyn Fn(&S) -> O + Send + Sync>,
}

impl<S, O: Clone> Selector<S, O> {
    pub fn new(compute: impl Fn(&S) -> O + Send + Sync + 'static) -> Self {
        Self {
            cache: Mutex::new(None),
            compute: Box::new(compute),
        }
    }

    /// Returns the projection of `input`, recomputing only if `input`
    /// is not the same allocation as the last call's.
    pub fn select(&self, input: &Arc<S>) -> O {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if Arc::ptr_eq(&cached.input, input) {
                return cached.output.clone();
            }
        }
        let output = (self.compute)(input);
        *cache = Some(Cache {
            input: input.clone(),
            output: output.clone(),
        });
        output
    }
}

/// Composes two already-memoized selector outputs. This is the "factory"
/// the model calls for: combining is a plain function over the two
/// outputs, not another memoized layer — there is nothing left to cache
/// once both inputs have already been projected.
pub fn combine2<A, B, O>(a: A, b: B, f: impl FnOnce(A, B) -> O) -> O {
    f(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn recomputes_only_when_input_pointer_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let selector = Selector::new(move |s: &i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            *s * 2
        });

        let a = Arc::new(5);
        assert_eq!(selector.select(&a), 10);
        assert_eq!(selector.select(&a), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let b = Arc::new(5); // same value, different allocation
        assert_eq!(selector.select(&b), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
