//! Composition of asynchronous steps.
//!
//! Dependent steps run one after another and stop at the first error;
//! independent steps fan out with a hard bound on how many are in flight.
//! Delayed work is never expressed with timers here: it goes through
//! [`crate::jobs::JobScheduler`].

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};

/// A deferred step: nothing runs until the sequence reaches it.
pub type Step<'a, T, E> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, E>> + Send + 'a>;

/// Run `steps` in order. A step starts only after the previous one
/// succeeded; the first error is returned and later steps never start.
pub async fn run_sequence<'a, T, E>(steps: Vec<Step<'a, T, E>>) -> Result<Vec<T>, E> {
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        out.push(step().await?);
    }
    Ok(out)
}

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Output order follows input order. The first error fails the batch and
/// drops the remaining futures. A `limit` of 0 is treated as 1.
pub async fn bounded_all<I, T, E, F, Fut>(items: I, limit: usize, mut f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let limit = limit.max(1);
    let futures = items.into_iter().enumerate().map(|(idx, item)| {
        let fut = f(item);
        async move { fut.await.map(|value| (idx, value)) }
    });
    let mut indexed: Vec<(usize, T)> = stream::iter(futures).buffer_unordered(limit).try_collect().await?;
    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}

/// Drive `fut` and hand its outcome to `callback` exactly once.
pub async fn complete_with<T, E, Fut, C>(fut: Fut, callback: C)
where
    Fut: Future<Output = Result<T, E>>,
    C: FnOnce(Result<T, E>),
{
    callback(fut.await);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn bounded_all_never_exceeds_limit_and_keeps_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let out = bounded_all(0..12u64, 3, |n| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5 * (12 - n))).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(n * 2)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, (0..12u64).map(|n| n * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn bounded_all_propagates_first_error() {
        let res = bounded_all(vec![1, 2, 3], 0, |n| async move {
            if n == 2 { Err(format!("boom {n}")) } else { Ok(n) }
        })
        .await;
        assert_eq!(res, Err("boom 2".to_string()));
    }

    #[tokio::test]
    async fn run_sequence_short_circuits() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mk = |n: u32, fail: bool| -> Step<'static, u32, String> {
            let ran = ran.clone();
            Box::new(move || {
                async move {
                    ran.lock().unwrap().push(n);
                    if fail { Err(format!("step {n} failed")) } else { Ok(n) }
                }
                .boxed()
            })
        };
        let res = run_sequence(vec![mk(1, false), mk(2, true), mk(3, false)]).await;
        assert_eq!(res, Err("step 2 failed".to_string()));
        assert_eq!(*ran.lock().unwrap(), vec![1, 2]);

        let ok = run_sequence(vec![mk(4, false), mk(5, false)]).await.unwrap();
        assert_eq!(ok, vec![4, 5]);
    }

    #[tokio::test]
    async fn complete_with_fires_exactly_once_with_one_outcome() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        for outcome in [Ok(7), Err("bad".to_string())] {
            let calls = calls.clone();
            complete_with(async move { outcome }, move |res: Result<i32, String>| {
                calls.lock().unwrap().push(res);
            })
            .await;
        }
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Ok(7));
        assert_eq!(calls[1], Err("bad".to_string()));
    }
}
