//! Credential registry: an in-memory snapshot of API keys and their
//! bucket-scoped grants, backed by the metadata store.
//!
//! Lookups read the current snapshot without locking; `reload()` builds a
//! fresh snapshot from the store and installs it atomically, so readers
//! observe either the pre- or post-reload state in its entirety. Reload is
//! triggered after every admin mutation of keys or permissions.

use crate::config::AdminIdentity;
use crate::meta::{MetaError, MetadataStore};
use crate::types::ApiKeyPermission;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A resolved credential: everything the signature verifier needs.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub secret: String,
    pub enabled: bool,
}

/// Pluggable credential resolution for the signature verifier.
pub trait SecretResolver: Send + Sync {
    /// Look up the secret for an access key id. Disabled keys are returned
    /// with `enabled: false`; unknown keys return `None`.
    fn resolve(&self, access_key_id: &str) -> Option<ResolvedKey>;
}

#[derive(Debug, Default)]
struct KeyEntry {
    secret: String,
    enabled: bool,
    grants: Vec<ApiKeyPermission>,
}

#[derive(Debug, Default)]
struct Snapshot {
    keys: HashMap<String, KeyEntry>,
}

/// In-memory credential cache over the metadata store.
pub struct CredentialRegistry {
    snapshot: ArcSwap<Snapshot>,
    meta: Arc<dyn MetadataStore>,
    admin: AdminIdentity,
}

impl CredentialRegistry {
    /// Create an empty registry; call `reload()` to populate it.
    pub fn new(meta: Arc<dyn MetadataStore>, admin: AdminIdentity) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            meta,
            admin,
        }
    }

    /// Rebuild the snapshot from the store and install it atomically.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<(), MetaError> {
        let dump = self.meta.dump_credentials().await?;

        let mut keys: HashMap<String, KeyEntry> = dump
            .keys
            .into_iter()
            .map(|k| {
                (
                    k.access_key_id,
                    KeyEntry {
                        secret: k.secret,
                        enabled: k.enabled,
                        grants: Vec::new(),
                    },
                )
            })
            .collect();

        for permission in dump.permissions {
            if let Some(entry) = keys.get_mut(&permission.access_key_id) {
                entry.grants.push(permission);
            }
        }

        debug!("Loaded {} API key(s) into the credential cache", keys.len());
        self.snapshot.store(Arc::new(Snapshot { keys }));
        Ok(())
    }

    /// Whether `access_key_id` is the process-wide admin identity.
    pub fn is_admin(&self, access_key_id: &str) -> bool {
        access_key_id == self.admin.access_key_id
    }

    /// Decide whether `access_key_id` may read (or write, if `write`) in
    /// `bucket`. The admin identity short-circuits to allow; everyone else
    /// needs a matching grant with the required flag set.
    pub fn can(&self, access_key_id: &str, bucket: &str, write: bool) -> bool {
        if self.is_admin(access_key_id) {
            return true;
        }
        let snapshot = self.snapshot.load();
        let Some(entry) = snapshot.keys.get(access_key_id) else {
            return false;
        };
        if !entry.enabled {
            return false;
        }
        entry
            .grants
            .iter()
            .filter(|g| g.matches(bucket))
            .any(|g| if write { g.can_write } else { g.can_read })
    }
}

impl SecretResolver for CredentialRegistry {
    fn resolve(&self, access_key_id: &str) -> Option<ResolvedKey> {
        if self.is_admin(access_key_id) {
            return Some(ResolvedKey {
                secret: self.admin.secret_access_key.clone(),
                enabled: true,
            });
        }
        let snapshot = self.snapshot.load();
        snapshot.keys.get(access_key_id).map(|entry| ResolvedKey {
            secret: entry.secret.clone(),
            enabled: entry.enabled,
        })
    }
}
