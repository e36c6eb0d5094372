use parking_lot::Mutex;
use std::{future::Future, sync::Arc};
use tokio::sync::OnceCell;

/// Collapses concurrent invocations of an operation into one.
///
/// Callers that arrive while a call is in flight wait for it and share its
/// result. The result is kept until [`SingleFlight::reset`] is called, after
/// which the next caller runs the operation again.
#[derive(Debug)]
pub struct SingleFlight<T, E> {
    flight: Mutex<Arc<OnceCell<Result<T, E>>>>,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            flight: Mutex::new(Arc::new(OnceCell::new())),
        }
    }
}

impl<T: Clone, E: Clone> SingleFlight<T, E> {
    pub async fn call<F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Hold a handle to the current flight so that a concurrent reset does
        // not detach this caller from the result it is waiting on.
        let flight = self.flight.lock().clone();
        flight.get_or_init(f).await.clone()
    }

    /// Forgets the last result.
    pub fn reset(&self) {
        *self.flight.lock() = Arc::new(OnceCell::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{self, Duration};

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_result() {
        let flight = SingleFlight::<usize, String>::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let op = move || async move {
            time::sleep(Duration::from_secs(1)).await;
            Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
        };

        let (a, b, c) = tokio::join!(flight.call(op), flight.call(op), flight.call(op));
        assert_eq!((a, b, c), (Ok(1), Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The result is retained until reset.
        assert_eq!(flight.call(op).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        flight.reset();
        assert_eq!(flight.call(op).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_flight_may_reset_itself() {
        let flight = SingleFlight::<usize, String>::default();
        let counter = AtomicUsize::new(0);
        let (flight, calls) = (&flight, &counter);
        let op = move || async move {
            time::sleep(Duration::from_secs(1)).await;
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            flight.reset();
            Ok(n)
        };

        // The waiter keeps the result of the flight it joined.
        let (a, b) = tokio::join!(flight.call(op), async {
            time::sleep(Duration::from_millis(500)).await;
            flight.call(op).await
        });
        assert_eq!((a, b), (Ok(1), Ok(1)));

        assert_eq!(flight.call(op).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_shared() {
        let flight = SingleFlight::<(), String>::default();
        let (a, b) = tokio::join!(
            flight.call(|| async { Err("sync failed".to_string()) }),
            flight.call(|| async { Ok(()) }),
        );
        assert_eq!(a, Err("sync failed".to_string()));
        assert_eq!(b, Err("sync failed".to_string()));
    }
}
