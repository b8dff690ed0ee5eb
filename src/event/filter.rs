use std::collections::{HashMap, HashSet};

use super::ContainerEvent;
use crate::docker::RawEvent;

const CONTAINER_ACTIONS: &[&str] = &[
    "create",
    "start",
    "restart",
    "stop",
    "die",
    "kill",
    "pause",
    "unpause",
    "destroy",
    "rename",
    "update",
    "attach",
    "detach",
    "exec_create",
    "exec_start",
    "exec_die",
];
const IMAGE_ACTIONS: &[&str] = &[
    "pull", "push", "tag", "untag", "delete", "save", "load",
];
const NETWORK_ACTIONS: &[&str] = &["create", "connect", "disconnect", "destroy"];
const VOLUME_ACTIONS: &[&str] = &["create", "mount", "unmount", "destroy"];
const DAEMON_ACTIONS: &[&str] = &["reload", "shutdown"];

const ATTRIBUTES: &[&str] = &[
    "name",
    "image",
    "exitCode",
    "execDuration",
    "signal",
    "container",
    "com.docker.compose.project",
    "com.docker.compose.service",
];

/// Which event types and actions are forwarded, and which attributes they keep.
///
/// Built once at start-up and shared read-only between all watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWhitelist {
    actions: HashMap<String, HashSet<String>>,
    attributes: HashSet<String>,
}

impl Default for EventWhitelist {
    fn default() -> Self {
        let actions = [
            ("container", CONTAINER_ACTIONS),
            ("image", IMAGE_ACTIONS),
            ("network", NETWORK_ACTIONS),
            ("volume", VOLUME_ACTIONS),
            ("daemon", DAEMON_ACTIONS),
        ];
        Self::new(actions, ATTRIBUTES)
    }
}

impl EventWhitelist {
    /// # Arguments
    ///
    /// * `actions` - Allowed actions per event type.
    /// * `attributes` - Attribute keys kept on accepted events.
    pub fn new<'a>(
        actions: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
        attributes: &[&str],
    ) -> Self {
        Self {
            actions: actions
                .into_iter()
                .map(|(typ, actions)| {
                    let actions = actions.iter().map(|a| (*a).to_owned()).collect();
                    (typ.to_owned(), actions)
                })
                .collect(),
            attributes: attributes.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    pub fn allows(&self, typ: &str, action: &str) -> bool {
        self.actions
            .get(typ)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Keeps only the whitelisted attributes.
    pub fn filter_attributes(&self, attributes: HashMap<String, String>) -> HashMap<String, String> {
        attributes
            .into_iter()
            .filter(|(key, _)| self.attributes.contains(key))
            .collect()
    }

    /// Turns a raw event into a [`ContainerEvent`] for `host`, or `None` if the event
    /// is not whitelisted.
    pub fn accept(&self, host: &str, raw: RawEvent, received_at: u64) -> Option<ContainerEvent> {
        if !self.allows(&raw.typ, &raw.action) {
            return None;
        }
        let attributes = self.filter_attributes(raw.attributes);

        Some(ContainerEvent {
            host: host.to_owned(),
            actor_name: attributes.get("name").cloned(),
            typ: raw.typ,
            action: raw.action,
            actor_id: raw.actor_id,
            timestamp: received_at,
            attributes,
        })
    }
}
