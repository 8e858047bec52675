#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Bounded fan-out of independent per-repository jobs.

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use futures::{StreamExt, stream::FuturesUnordered};
use tokio::sync::Semaphore;

/// Number of jobs allowed to run at once: one per logical processor.
pub fn worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Runs `job` once per item and hands each result to `consume`.
///
/// When `parallel` is set, up to [`worker_count`] jobs run concurrently as
/// separate tasks and results arrive in completion order. Otherwise items are
/// processed one after another in input order. The first error from a job or
/// from `consume` stops the fan-out; jobs still in flight are aborted.
pub async fn fan_out<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    parallel: bool,
    job: F,
    mut consume: impl FnMut(R) -> Result<()>,
) -> Result<()>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    if !parallel {
        for item in items {
            consume(job(item).await?)?;
        }
        return Ok(());
    }

    let job = Arc::new(job);
    let permits = Arc::new(Semaphore::new(worker_count()));
    let mut handles = FuturesUnordered::new();

    for item in items {
        let job = Arc::clone(&job);
        let permits = Arc::clone(&permits);
        handles.push(AbortOnDrop(tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            job(item).await
        })));
    }

    while let Some(joined) = handles.next().await {
        consume(joined.context("worker task panicked")??)?;
    }
    Ok(())
}

/// Join handle that aborts its task when dropped before completion.
struct AbortOnDrop<R>(tokio::task::JoinHandle<R>);

impl<R> Future for AbortOnDrop<R> {
    type Output = Result<R, tokio::task::JoinError>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        std::pin::Pin::new(&mut self.0).poll(cx)
    }
}

impl<R> Drop for AbortOnDrop<R> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn sequential_preserves_input_order() {
        let mut seen = Vec::new();
        fan_out(
            [3, 1, 2],
            false,
            |n: u32| async move { Ok::<_, anyhow::Error>(n * 10) },
            |n| {
                seen.push(n);
                Ok(())
            },
        )
        .await
        .expect("fan out");
        assert_eq!(seen, [30, 10, 20]);
    }

    #[tokio::test]
    async fn parallel_delivers_every_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut seen = Vec::new();
        fan_out(
            0..20u32,
            true,
            move |n| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(n)
                }
            },
            |n| {
                seen.push(n);
                Ok(())
            },
        )
        .await
        .expect("fan out");
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn first_error_is_returned() {
        let result = fan_out(
            0..4u32,
            true,
            |n| async move {
                if n == 2 {
                    anyhow::bail!("job {n} failed")
                }
                Ok::<_, anyhow::Error>(n)
            },
            |_| Ok(()),
        )
        .await;
        assert!(result.is_err());
    }
}
