//! Principal and session records, and the store that persists them.

use crate::capabilities::CapabilityModel;
use crate::{token, AuthError, AuthResult};
use chrono::{DateTime, Utc};
use portal_storage::{KeyValueStore, StorageKeys};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// The authenticated actor. `tenant_id == None` marks a global principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal<C> {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub capabilities: C,
}

impl<C: CapabilityModel> Principal<C> {
    pub fn has_capability(&self, flag: C::Flag) -> bool {
        self.capabilities.grants(flag)
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }
}

/// Access token plus the principal it was issued for.
///
/// A session can only be built from a token whose expiry claim decodes, so
/// `expires_at` always agrees with the token.
#[derive(Debug, Clone, PartialEq)]
pub struct Session<C> {
    access_token: String,
    expires_at: DateTime<Utc>,
    principal: Principal<C>,
}

impl<C: CapabilityModel> Session<C> {
    pub fn new(access_token: impl Into<String>, principal: Principal<C>) -> AuthResult<Self> {
        let access_token = access_token.into();
        let expires_at = token::expires_at(&access_token)?;
        Ok(Self {
            access_token,
            expires_at,
            principal,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn principal(&self) -> &Principal<C> {
        &self.principal
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Sole owner of the persisted session keys.
///
/// Reads never fail: a partial or corrupted record is wiped and reported as
/// "no session". Writes replace the whole record.
pub struct SessionStore<C> {
    storage: Arc<dyn KeyValueStore>,
    _capabilities: PhantomData<fn() -> C>,
}

impl<C: CapabilityModel> SessionStore<C> {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            _capabilities: PhantomData,
        }
    }

    /// Load the persisted session, discarding anything unusable.
    pub fn load(&self) -> Option<Session<C>> {
        let token = self.read(StorageKeys::SESSION_TOKEN);
        let principal = self.read(StorageKeys::SESSION_PRINCIPAL);

        let (token, principal) = match (token, principal) {
            (Some(token), Some(principal)) => (token, principal),
            (None, None) => return None,
            _ => {
                warn!("Discarding partial session record");
                self.discard();
                return None;
            }
        };

        let principal: Principal<C> = match serde_json::from_str(&principal) {
            Ok(principal) => principal,
            Err(e) => {
                warn!(error = %e, "Discarding session with malformed principal");
                self.discard();
                return None;
            }
        };

        match Session::new(token, principal) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Discarding session with unusable token");
                self.discard();
                None
            }
        }
    }

    /// Access token only, without decoding the principal.
    pub fn access_token(&self) -> Option<String> {
        self.read(StorageKeys::SESSION_TOKEN)
    }

    /// Persist `session`, replacing any previous one. If either key cannot
    /// be written the whole record is removed, so a new token is never left
    /// next to an old principal.
    pub fn save(&self, session: &Session<C>) -> AuthResult<()> {
        let principal = serde_json::to_string(&session.principal)
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let written = self
            .storage
            .set(StorageKeys::SESSION_TOKEN, &session.access_token)
            .and_then(|()| self.storage.set(StorageKeys::SESSION_PRINCIPAL, &principal));
        if let Err(e) = written {
            warn!(error = %e, "Session write failed, removing partial record");
            self.discard();
            return Err(e.into());
        }

        debug!(user_id = %session.principal.id, expires_at = %session.expires_at, "Session saved");
        Ok(())
    }

    /// Remove every session key. Attempts all deletions even if one fails and
    /// reports the first failure.
    pub fn clear(&self) -> AuthResult<()> {
        let mut first_error = None;
        for key in StorageKeys::ALL {
            if let Err(e) = self.storage.delete(key) {
                warn!(key, error = %e, "Failed to delete session key");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn branding_hint(&self) -> Option<String> {
        self.read(StorageKeys::TENANT_BRANDING_HINT)
            .filter(|hint| !hint.is_empty())
    }

    pub fn set_branding_hint(&self, hint: &str) -> AuthResult<()> {
        self.storage.set(StorageKeys::TENANT_BRANDING_HINT, hint)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Session store read failed");
                None
            }
        }
    }

    fn discard(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "Failed to discard session record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{AdminRole, Capability, ManagerCapabilities};
    use crate::token::unsigned_token;
    use portal_storage::MemoryStore;

    fn principal() -> Principal<ManagerCapabilities> {
        Principal {
            id: "user-1".to_string(),
            username: "jane".to_string(),
            display_name: "Jane Doe".to_string(),
            tenant_id: Some("acme".to_string()),
            capabilities: ManagerCapabilities {
                membership: true,
                ..Default::default()
            },
        }
    }

    fn store() -> (Arc<MemoryStore>, SessionStore<ManagerCapabilities>) {
        let memory = Arc::new(MemoryStore::new());
        let store = SessionStore::new(memory.clone());
        (memory, store)
    }

    #[test]
    fn test_save_then_load() {
        let (_, store) = store();
        let session = Session::new(unsigned_token(1_900_000_000), principal()).unwrap();

        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.expires_at().timestamp(), 1_900_000_000);
        assert!(loaded.principal().has_capability(Capability::Membership));
        assert!(!loaded.principal().is_global());
    }

    #[test]
    fn test_session_requires_expiry() {
        let result = Session::new("opaque", principal());
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_empty_store_loads_none() {
        let (_, store) = store();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_malformed_principal_is_discarded() {
        let (memory, store) = store();
        memory
            .set(StorageKeys::SESSION_TOKEN, &unsigned_token(1_900_000_000))
            .unwrap();
        memory.set(StorageKeys::SESSION_PRINCIPAL, "{ not json").unwrap();

        assert!(store.load().is_none());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_partial_record_is_discarded() {
        let (memory, store) = store();
        memory
            .set(StorageKeys::SESSION_PRINCIPAL, &serde_json::to_string(&principal()).unwrap())
            .unwrap();

        assert!(store.load().is_none());
        assert!(!memory.has(StorageKeys::SESSION_PRINCIPAL).unwrap());
    }

    #[test]
    fn test_token_without_expiry_is_discarded() {
        let (memory, store) = store();
        memory.set(StorageKeys::SESSION_TOKEN, "opaque").unwrap();
        memory
            .set(StorageKeys::SESSION_PRINCIPAL, &serde_json::to_string(&principal()).unwrap())
            .unwrap();

        assert!(store.load().is_none());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_clear_removes_all_keys_and_is_idempotent() {
        let (memory, store) = store();
        let session = Session::new(unsigned_token(1_900_000_000), principal()).unwrap();
        store.save(&session).unwrap();
        store.set_branding_hint("acme-blue").unwrap();

        store.clear().unwrap();
        store.clear().unwrap();

        assert!(memory.is_empty());
        assert!(store.branding_hint().is_none());
    }

    /// Delegates to memory but refuses to write one key.
    struct FailingStore {
        memory: MemoryStore,
        refuse: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn set(&self, key: &str, value: &str) -> portal_storage::StorageResult<()> {
            if key == self.refuse {
                return Err(portal_storage::StorageError::Io(std::io::Error::other("disk full")));
            }
            self.memory.set(key, value)
        }

        fn get(&self, key: &str) -> portal_storage::StorageResult<Option<String>> {
            self.memory.get(key)
        }

        fn delete(&self, key: &str) -> portal_storage::StorageResult<bool> {
            self.memory.delete(key)
        }
    }

    #[test]
    fn test_failed_save_leaves_no_mixed_record() {
        let failing = Arc::new(FailingStore {
            memory: MemoryStore::new(),
            refuse: StorageKeys::SESSION_PRINCIPAL,
        });
        let old = Session::new(unsigned_token(1_800_000_000), principal()).unwrap();
        failing
            .memory
            .set(StorageKeys::SESSION_TOKEN, old.access_token())
            .unwrap();
        failing
            .memory
            .set(StorageKeys::SESSION_PRINCIPAL, &serde_json::to_string(old.principal()).unwrap())
            .unwrap();

        let store: SessionStore<ManagerCapabilities> = SessionStore::new(failing.clone());
        let mut other = principal();
        other.id = "user-2".to_string();
        let new = Session::new(unsigned_token(1_900_000_000), other).unwrap();

        let err = store.save(&new).unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(store.load().is_none());
        assert!(!failing.memory.has(StorageKeys::SESSION_TOKEN).unwrap());
        assert!(!failing.memory.has(StorageKeys::SESSION_PRINCIPAL).unwrap());
    }

    #[test]
    fn test_is_expired_at() {
        let session = Session::new(unsigned_token(1_900_000_000), principal()).unwrap();
        let expiry = session.expires_at();

        assert!(!session.is_expired_at(expiry - chrono::Duration::seconds(1)));
        assert!(session.is_expired_at(expiry));
    }

    #[test]
    fn test_admin_principal_is_global() {
        let json = r#"{
            "id": "admin-1",
            "username": "root",
            "displayName": "Root",
            "tenantId": null,
            "capabilities": "support"
        }"#;
        let principal: Principal<AdminRole> = serde_json::from_str(json).unwrap();

        assert!(principal.is_global());
        assert!(principal.has_capability(AdminRole::Support));
        assert!(!principal.has_capability(AdminRole::SuperAdmin));
    }
}
