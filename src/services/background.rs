//! Detached work whose only contract is "log on failure".
//!
//! Nothing waits on these tasks and their errors never reach the code that
//! triggered them.

use std::{fmt::Display, future::Future};

use tokio::task::JoinHandle;
use tracing::warn;

/// Run `work` in the background, logging its error under the `task` label.
pub fn spawn_detached<F, E>(task: &'static str, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = work.await {
            warn!(task, error = %err, "background task failed");
        }
    })
}
