use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{CollectPass, CollectorKind};
use crate::container::ContainerID;
use crate::docker::{self, DockerApi};
use crate::pipeline::{Message, Payload};
use crate::stats::{self, ContainerStats};

/// Time every container of a pass shares to deliver its two frames.
pub const STATS_DEADLINE: Duration = Duration::from_secs(3);

/// Samples the usage of every container of one host concurrently.
///
/// Each container gets its own worker that reads two consecutive frames and computes
/// the rate between them. Workers that miss the shared deadline are left out of the
/// pass's output.
#[derive(Debug)]
pub struct StatsPass {
    host: String,
    client: Arc<dyn DockerApi>,
}

impl StatsPass {
    pub fn new(host: impl Into<String>, client: Arc<dyn DockerApi>) -> Self {
        Self {
            host: host.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl CollectPass for StatsPass {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Stats
    }

    async fn collect(&self) -> Option<Message> {
        let containers = match self.client.list_containers().await {
            Ok(containers) => containers,
            Err(err) => {
                log::error!(
                    target: "stats collector",
                    "failed listing containers: host={}, error={}",
                    self.host,
                    err
                );
                return None;
            }
        };

        let deadline = Instant::now() + STATS_DEADLINE;
        let mut workers = JoinSet::new();
        for container in containers {
            let client = Arc::clone(&self.client);
            workers.spawn(tokio::time::timeout_at(
                deadline,
                sample(client, container.id, container.name),
            ));
        }

        let total = workers.len();
        let mut stats = Vec::with_capacity(total);
        let mut timed_out = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(Ok(sampled))) => stats.push(sampled),
                Ok(Ok(Err(err))) => log::warn!(
                    target: "stats collector",
                    "failed sampling container: host={}, error={}",
                    self.host,
                    err
                ),
                Ok(Err(_)) => timed_out += 1,
                Err(err) => log::error!(
                    target: "stats collector",
                    "stats worker failed: host={}, error={}",
                    self.host,
                    err
                ),
            }
        }

        if timed_out > 0 {
            log::debug!(
                "{} of {} container(s) on {} missed the stats deadline",
                timed_out,
                total,
                self.host
            );
        }
        if stats.is_empty() {
            return None;
        }
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        log::debug!(
            "Sampled {}/{} container(s) on {}",
            stats.len(),
            total,
            self.host
        );

        Some(Message::new(&self.host, Payload::Stats(stats)))
    }
}

/// Reads two consecutive frames of one container and computes the rate between them.
async fn sample(
    client: Arc<dyn DockerApi>,
    id: ContainerID,
    name: String,
) -> docker::Result<ContainerStats> {
    let mut frames = client.stats_stream(id.as_ref());

    // the first frame has no baseline of its own
    let previous = frames
        .next()
        .await
        .transpose()?
        .ok_or_else(|| docker::Error::IncompleteStats(id.to_string()))?;
    let current = frames
        .next()
        .await
        .transpose()?
        .ok_or_else(|| docker::Error::IncompleteStats(id.to_string()))?;

    Ok(ContainerStats {
        id,
        name,
        stats: stats::compute(&previous, &current),
    })
}
