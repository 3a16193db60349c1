/// Group lifecycle, membership, and secret verification.
///
/// `GroupState` is a cheap-to-clone handle; all mutation goes through one
/// mutex so connection-handling tasks can call in concurrently. Members are
/// kept in insertion order with duplicates forbidden.
use std::sync::{Arc, Mutex};

use crate::auth;
use crate::types::now_ms;

#[derive(Debug)]
struct ActiveGroup {
    name: String,
    /// Empty string means no secret is set.
    secret_digest: String,
    host_identity: String,
    members: Vec<String>,
    created_at: u64,
}

/// Authoritative record of the current group. `None` inside until a group
/// is created or joined.
#[derive(Clone, Default)]
pub struct GroupState {
    inner: Arc<Mutex<Option<ActiveGroup>>>,
}

impl GroupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form a group as host: digests the secret and seeds the member list
    /// with the host itself.
    pub fn create(&self, name: &str, secret: &str, host_identity: &str) {
        self.install(name, auth::digest(secret), host_identity, None);
    }

    /// Form a group from a digest computed upstream, so a hash is never
    /// hashed a second time.
    pub fn create_with_digest(&self, name: &str, secret_digest: &str, host_identity: &str) {
        self.install(name, secret_digest.to_string(), host_identity, None);
    }

    /// Record a group joined as a client: no digest (clients only present
    /// secrets, never verify them), members seeded with host and self.
    pub fn join_as(&self, name: &str, host_identity: &str, self_identity: &str) {
        self.install(name, String::new(), host_identity, Some(self_identity));
    }

    fn install(&self, name: &str, secret_digest: String, host_identity: &str, extra: Option<&str>) {
        let mut members = vec![host_identity.to_string()];
        if let Some(identity) = extra {
            if identity != host_identity {
                members.push(identity.to_string());
            }
        }
        let mut slot = self.inner.lock().expect("group lock poisoned");
        *slot = Some(ActiveGroup {
            name: name.to_string(),
            secret_digest,
            host_identity: host_identity.to_string(),
            members,
            created_at: now_ms(),
        });
    }

    /// Verify an offered digest against the stored one.
    ///
    /// False when no group is active.
    pub fn authenticate(&self, candidate_digest: &str) -> bool {
        match &*self.inner.lock().expect("group lock poisoned") {
            Some(group) => auth::verify(candidate_digest, &group.secret_digest),
            None => false,
        }
    }

    /// Add a member; no-op if already present. Returns whether it was new.
    pub fn add_member(&self, identity: &str) -> bool {
        let mut slot = self.inner.lock().expect("group lock poisoned");
        match slot.as_mut() {
            Some(group) if !group.members.iter().any(|m| m == identity) => {
                group.members.push(identity.to_string());
                true
            }
            _ => false,
        }
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove_member(&self, identity: &str) -> bool {
        let mut slot = self.inner.lock().expect("group lock poisoned");
        match slot.as_mut() {
            Some(group) => {
                let before = group.members.len();
                group.members.retain(|m| m != identity);
                group.members.len() != before
            }
            None => false,
        }
    }

    /// Snapshot of the member list, insertion order.
    pub fn members(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("group lock poisoned")
            .as_ref()
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }

    pub fn member_count(&self) -> usize {
        self.inner
            .lock()
            .expect("group lock poisoned")
            .as_ref()
            .map(|g| g.members.len())
            .unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().expect("group lock poisoned").is_some()
    }

    pub fn name(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("group lock poisoned")
            .as_ref()
            .map(|g| g.name.clone())
    }

    pub fn host_identity(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("group lock poisoned")
            .as_ref()
            .map(|g| g.host_identity.clone())
    }

    pub fn created_at(&self) -> Option<u64> {
        self.inner
            .lock()
            .expect("group lock poisoned")
            .as_ref()
            .map(|g| g.created_at)
    }

    /// Drop all group state.
    pub fn clear(&self) {
        *self.inner.lock().expect("group lock poisoned") = None;
    }
}
