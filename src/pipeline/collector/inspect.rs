use std::sync::Arc;

use super::{CollectPass, CollectorKind};
use crate::docker::DockerApi;
use crate::pipeline::{Message, Payload};

/// Inspects every container of one host, one after another.
#[derive(Debug)]
pub struct InspectPass {
    host: String,
    client: Arc<dyn DockerApi>,
}

impl InspectPass {
    pub fn new(host: impl Into<String>, client: Arc<dyn DockerApi>) -> Self {
        Self {
            host: host.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl CollectPass for InspectPass {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Inspect
    }

    async fn collect(&self) -> Option<Message> {
        let containers = match self.client.list_containers().await {
            Ok(containers) => containers,
            Err(err) => {
                log::error!(
                    target: "inspect collector",
                    "failed listing containers: host={}, error={}",
                    self.host,
                    err
                );
                return None;
            }
        };

        // TODO: a small worker pool would shorten passes on hosts with many containers
        let mut details = Vec::with_capacity(containers.len());
        for container in &containers {
            match self.client.inspect_container(container.id.as_ref()).await {
                Ok(detail) => details.push(detail),
                Err(err) => log::error!(
                    target: "inspect collector",
                    "failed inspecting container: host={}, container_id={}, error={}",
                    self.host,
                    container.id,
                    err
                ),
            }
        }
        log::debug!(
            "Inspected {}/{} container(s) on {}",
            details.len(),
            containers.len(),
            self.host
        );

        Some(Message::new(&self.host, Payload::Inspect(details)))
    }
}
