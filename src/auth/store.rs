use crate::auth::Account;
use crate::config::SERVICE_NAME;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

#[derive(Clone, Serialize, Deserialize)]
pub struct CachedAccount {
    pub account: Account,
    pub refresh_token: String,
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn delete(&self, key: &str) -> Result<(), AppError>;
}

pub fn load_cached_account(
    store: &dyn CredentialStore,
    key: &str,
) -> Result<Option<CachedAccount>, AppError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<CachedAccount>(&raw) {
        Ok(cached) if !cached.refresh_token.is_empty() => Ok(Some(cached)),
        Ok(_) => Ok(None),
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable cached account");
            store.delete(key)?;
            Ok(None)
        }
    }
}

pub fn save_cached_account(
    store: &dyn CredentialStore,
    key: &str,
    cached: &CachedAccount,
) -> Result<(), AppError> {
    store.set(key, &serde_json::to_string(cached)?)
}

pub struct KeyringStore;

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entry = keyring::Entry::new(SERVICE_NAME, key)?;
        match entry.get_password() {
            Ok(v) if !v.is_empty() => Ok(Some(v)),
            Ok(_) => Ok(None),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::Keyring(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let entry = keyring::Entry::new(SERVICE_NAME, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        let entry = keyring::Entry::new(SERVICE_NAME, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::Keyring(e)),
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            username: "user@example.com".into(),
            home_account_id: "oid.tid".into(),
        }
    }

    #[test]
    fn cached_account_survives_store_round_trip() {
        let store = MemoryStore::default();
        let cached = CachedAccount {
            account: account(),
            refresh_token: "rt".into(),
        };
        save_cached_account(&store, "account:t:c", &cached).expect("save");

        let loaded = load_cached_account(&store, "account:t:c")
            .expect("load")
            .expect("present");
        assert_eq!(loaded.account, account());
        assert_eq!(loaded.refresh_token, "rt");
    }

    #[test]
    fn corrupt_cached_account_is_dropped() {
        let store = MemoryStore::default();
        store.set("account:t:c", "not json").expect("seed");

        assert!(load_cached_account(&store, "account:t:c")
            .expect("load")
            .is_none());
        assert!(store.get("account:t:c").expect("get").is_none());
    }

    #[test]
    fn empty_refresh_token_counts_as_signed_out() {
        let store = MemoryStore::default();
        let cached = CachedAccount {
            account: account(),
            refresh_token: String::new(),
        };
        save_cached_account(&store, "k", &cached).expect("save");
        assert!(load_cached_account(&store, "k").expect("load").is_none());
    }
}
