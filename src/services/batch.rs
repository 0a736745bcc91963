//! Chunked fan-out for batch jobs
//!
//! Batch computations (bulk similarity, bulk taste-map refresh) process
//! their units in fixed-size chunks: every unit inside a chunk runs
//! concurrently, the chunk is joined before the next one starts, and a
//! configurable pause separates chunks. This bounds concurrent outbound
//! lookups instead of fanning out over the whole user base at once.

use std::future::Future;

use tokio::time::{sleep, Duration};

/// Runs `work` over `items` in chunks of `chunk_size` with `delay_ms`
/// between chunks
///
/// Results come back in input order. The outer `Err` only reports a
/// panicked task; unit-level failure semantics belong to `R`.
pub async fn run_chunked<T, R, F, Fut>(
    items: Vec<T>,
    chunk_size: usize,
    delay_ms: u64,
    work: F,
) -> Vec<Result<R, String>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut remaining = items.into_iter().peekable();

    while remaining.peek().is_some() {
        let chunk: Vec<T> = remaining.by_ref().take(chunk_size).collect();

        let handles: Vec<_> = chunk
            .into_iter()
            .map(|item| tokio::spawn(work(item)))
            .collect();

        for handle in handles {
            match handle.await {
                Ok(result) => results.push(Ok(result)),
                Err(e) => results.push(Err(format!("task panicked: {}", e))),
            }
        }

        // Convoy discipline: pause before the next chunk, not after the last
        if remaining.peek().is_some() && delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    debug_assert_eq!(results.len(), total);
    results
}
