use std::sync::Arc;

use super::{CollectPass, CollectorKind};
use crate::docker::DockerApi;
use crate::pipeline::{Message, Payload, Result};

/// Emits the full container roster of one host per pass.
#[derive(Debug)]
pub struct ListPass {
    host: String,
    client: Arc<dyn DockerApi>,
}

impl ListPass {
    pub fn new(host: impl Into<String>, client: Arc<dyn DockerApi>) -> Self {
        Self {
            host: host.into(),
            client,
        }
    }

    /// Queries the roster right away, outside of any polling loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot list its containers.
    pub async fn collect_once(&self) -> Result<Message> {
        let containers = self.client.list_containers().await?;
        Ok(Message::new(&self.host, Payload::List(containers)))
    }
}

#[async_trait::async_trait]
impl CollectPass for ListPass {
    fn kind(&self) -> CollectorKind {
        CollectorKind::List
    }

    async fn collect(&self) -> Option<Message> {
        match self.collect_once().await {
            Ok(message) => {
                log::debug!(
                    "Listed {} container(s) on {}",
                    message.payload.len(),
                    self.host
                );
                Some(message)
            }
            Err(err) => {
                log::error!(
                    target: "list collector",
                    "failed listing containers: host={}, error={}",
                    self.host,
                    err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::fake::FakeDocker;

    #[tokio::test]
    async fn test_emits_full_roster() {
        let docker = FakeDocker::new()
            .with_container("aaa111", "web")
            .with_container("bbb222", "db");
        let pass = ListPass::new("prod-1", Arc::new(docker));

        let message = pass.collect().await.unwrap();
        assert_eq!(message.host, "prod-1");
        let Payload::List(containers) = message.payload else {
            panic!("expected a list payload");
        };
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);
    }

    #[tokio::test]
    async fn test_empty_roster_is_still_emitted() {
        let pass = ListPass::new("prod-1", Arc::new(FakeDocker::new()));

        let message = pass.collect().await.unwrap();
        assert!(message.payload.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_emits_nothing() {
        let docker = Arc::new(FakeDocker::new().fail_list(1));
        let pass = ListPass::new("prod-1", docker.clone());

        assert!(pass.collect().await.is_none());
        assert!(pass.collect_once().await.is_ok());
        assert_eq!(docker.list_calls(), 2);
    }
}
