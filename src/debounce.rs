//! Coalesces rapid search-query updates before they reach the filter engine.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

/// Forwards only the latest query once no new query has arrived for `wait`.
#[derive(Clone)]
pub struct SearchDebouncer {
    tx: mpsc::UnboundedSender<String>,
}

impl SearchDebouncer {
    /// Starts the debounce task. `apply` runs with each settled query.
    pub fn spawn<F, Fut>(wait: Duration, apply: F) -> Self
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, wait, apply));
        Self { tx }
    }

    /// Queues a query. Returns false once the debounce task has stopped.
    pub fn push(&self, query: String) -> bool {
        self.tx.send(query).is_ok()
    }
}

async fn run<F, Fut>(mut rx: mpsc::UnboundedReceiver<String>, wait: Duration, apply: F)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(mut latest) = rx.recv().await {
        let mut closed = false;
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(query) => latest = query,
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = tokio::time::sleep(wait) => break,
            }
        }

        debug!("Applying search query '{}'", latest);
        let applying = apply(latest);
        applying.await;

        if closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_debouncer(wait: Duration) -> (SearchDebouncer, Arc<Mutex<Vec<String>>>) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let debouncer = SearchDebouncer::spawn(wait, move |query| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(query);
            }
        });
        (debouncer, applied)
    }

    fn applied(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_applies_only_last_query() {
        let (debouncer, log) = recording_debouncer(Duration::from_millis(300));

        debouncer.push("c".to_string());
        debouncer.push("ch".to_string());
        debouncer.push("chase".to_string());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(applied(&log), vec!["chase".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_applied_before_quiet_period() {
        let (debouncer, log) = recording_debouncer(Duration::from_millis(300));

        debouncer.push("a".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.push("ab".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The second keystroke restarted the timer
        assert!(applied(&log).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(applied(&log), vec!["ab".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_apply_separately() {
        let (debouncer, log) = recording_debouncer(Duration::from_millis(300));

        debouncer.push("first".to_string());
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.push("second".to_string());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(
            applied(&log),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_query_flushed_when_closed() {
        let (debouncer, log) = recording_debouncer(Duration::from_millis(300));

        debouncer.push("last".to_string());
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(applied(&log), vec!["last".to_string()]);
    }
}
