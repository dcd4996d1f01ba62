use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Semaphore, time::Instant};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use super::{Resolution, Resolver};
use crate::audio::error::ResolutionError;

/// Runs resolutions on background tasks, at most `workers` at a time, each
/// under a hard deadline.
///
/// The deadline covers the wait for a free worker as well as the lookup
/// itself. A lookup that misses it is aborted (dropping the task kills any
/// extractor process it spawned) and reported as
/// [`ResolutionError::Timeout`]. The resolver is told the deadline so a
/// playlist can hand back what it resolved before it. Dropping the caller's
/// future aborts the lookup too.
#[derive(Clone)]
pub struct ResolverPool {
    resolver: Arc<dyn Resolver>,
    workers: Arc<Semaphore>,
    timeout: Duration,
}

impl ResolverPool {
    pub fn new(resolver: Arc<dyn Resolver>, workers: usize, timeout: Duration) -> Self {
        Self {
            resolver,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Workers not busy right now.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub async fn resolve(
        &self,
        query: &str,
        requested_by: UserId,
    ) -> Result<Resolution, ResolutionError> {
        let resolver = self.resolver.clone();
        let workers = self.workers.clone();
        let owned_query = query.to_owned();
        let deadline = Instant::now() + self.timeout;

        let mut task = AbortOnDropHandle::new(tokio::spawn(async move {
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|_| ResolutionError::Unreachable("resolver pool closed".into()))?;
            resolver.resolve(&owned_query, requested_by, deadline).await
        }));

        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(result)) => {
                debug!("🔍 Resolución terminada: {}", query);
                result
            }
            Ok(Err(join_error)) => {
                warn!("❌ La tarea de resolución falló ({}): {}", query, join_error);
                Err(ResolutionError::Unreachable(format!(
                    "resolver task failed: {join_error}"
                )))
            }
            Err(_) => {
                warn!(
                    "⏱️ Resolución cancelada tras {}: {}",
                    humantime::format_duration(self.timeout),
                    query
                );
                Err(ResolutionError::Timeout(self.timeout))
            }
        }
    }
}
