use super::registry::{Registry, UniqueIndex};
use crate::entity::{new_id, Record, Secret, SecretDraft, SecretPatch};
use crate::error::ServiceError;
use chrono::Utc;
use tracing::info;

/// Owns canonical secrets and the key index used for placeholder
/// substitution.
pub struct SecretService {
    registry: Registry<Secret>,
    keys: UniqueIndex,
}

impl SecretService {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            keys: UniqueIndex::new("key"),
        }
    }

    /// Create a secret. Fails with a conflict if the key is taken.
    pub fn create(&self, draft: SecretDraft) -> Result<Secret, ServiceError> {
        let secret = Secret::from_draft(new_id(Secret::KIND), draft, Utc::now())?;
        self.keys.reserve(&secret.key, &secret.id)?;
        self.registry.insert(secret.clone());

        info!(secret_id = %secret.id, key = %secret.key, "Secret created");
        Ok(secret)
    }

    pub fn update(&self, id: &str, patch: SecretPatch) -> Result<Secret, ServiceError> {
        let secret = self.registry.modify(id, |secret| {
            let old_key = secret.key.clone();
            secret.apply_patch(patch)?;
            if secret.key != old_key {
                self.keys.reserve(&secret.key, &secret.id)?;
                self.keys.release(&old_key, &secret.id);
            }
            Ok(())
        })?;

        info!(secret_id = %secret.id, "Secret updated");
        Ok(secret)
    }

    pub fn delete(&self, id: &str) -> Result<Secret, ServiceError> {
        let removed = self.registry.remove(id, |_| Ok(()))?;
        self.keys.release(&removed.key, &removed.id);

        info!(secret_id = %id, "Secret deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<Secret> {
        self.registry.get(id)
    }

    pub fn get_by_key(&self, key: &str) -> Option<Secret> {
        let id = self.keys.owner(key)?;
        self.registry.get(&id)
    }

    pub fn all(&self) -> Vec<Secret> {
        self.registry.all()
    }

    /// Replace `{{KEY}}` placeholders with secret values.
    ///
    /// Unknown keys and unterminated placeholders are left as written.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };

            match self.get_by_key(after[..end].trim()) {
                Some(secret) => out.push_str(&secret.value),
                None => out.push_str(&rest[start..start + end + 4]),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }
}

impl Default for SecretService {
    fn default() -> Self {
        Self::new()
    }
}
