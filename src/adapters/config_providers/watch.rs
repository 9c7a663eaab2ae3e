use std::{future::Future, time::Duration};

use tokio::{sync::mpsc, time::Instant};

/// Turn change notifications into reloads, at most one per `window`.
///
/// A change inside the window is not dropped: the reload waits for the window
/// to close and then covers every change queued meanwhile. Returns once the
/// sender side is gone.
pub async fn debounced_reloads<F, Fut>(mut changes: mpsc::Receiver<()>, window: Duration, mut reload: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last_reload: Option<Instant> = None;

    while changes.recv().await.is_some() {
        if let Some(ready_at) = last_reload.map(|at| at + window) {
            if Instant::now() < ready_at {
                tracing::debug!("Config change inside the debounce window, reloading when it closes");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        while changes.try_recv().is_ok() {}

        last_reload = Some(Instant::now());
        reload().await;
    }
}
