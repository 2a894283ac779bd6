//! Persistence seam: the cookie jar plus local-storage mirror.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::consent::{cookie_name, decode_consent_cookie, format_cookie, user_id_key, ConsentState};

/// Days the visitor id cookie lives.
pub const USER_ID_EXPIRY_DAYS: u32 = 730;

pub trait ConsentStore {
    /// Raw (still URL-encoded) cookie value.
    fn read_cookie(&self, name: &str) -> Option<String>;
    fn write_cookie(&mut self, name: &str, value: &str, expiry_days: u32, now: DateTime<Utc>);
    fn delete_cookie(&mut self, name: &str);
    fn read_local(&self, key: &str) -> Option<String>;
    fn write_local(&mut self, key: &str, value: &str);
    fn remove_local(&mut self, key: &str);
}

/// In-memory store. Keeps the exact `document.cookie` strings it was
/// asked to write so tests can assert on them.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    cookies: HashMap<String, String>,
    local: HashMap<String, String>,
    pub written: Vec<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsentStore for InMemoryStore {
    fn read_cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn write_cookie(&mut self, name: &str, value: &str, expiry_days: u32, now: DateTime<Utc>) {
        let line = format_cookie(name, value, expiry_days, now);
        if let Some((_, raw)) = line.split(';').next().and_then(|pair| pair.split_once('=')) {
            self.cookies.insert(name.to_string(), raw.to_string());
        }
        self.written.push(line);
    }

    fn delete_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    fn read_local(&self, key: &str) -> Option<String> {
        self.local.get(key).cloned()
    }

    fn write_local(&mut self, key: &str, value: &str) {
        self.local.insert(key.to_string(), value.to_string());
    }

    fn remove_local(&mut self, key: &str) {
        self.local.remove(key);
    }
}

/// Cookie first, local storage second; malformed data counts as none.
pub fn load_consent(store: &impl ConsentStore, banner_id: &str) -> Option<ConsentState> {
    let name = cookie_name(banner_id);
    store
        .read_cookie(&name)
        .and_then(|raw| decode_consent_cookie(&raw))
        .or_else(|| {
            store
                .read_local(&name)
                .and_then(|json| serde_json::from_str(&json).ok())
        })
}

pub fn persist_consent(
    store: &mut impl ConsentStore,
    banner_id: &str,
    state: &ConsentState,
    expiry_days: u32,
    now: DateTime<Utc>,
) -> Result<(), serde_json::Error> {
    let name = cookie_name(banner_id);
    let json = serde_json::to_string(state)?;
    store.write_cookie(&name, &json, expiry_days, now);
    store.write_local(&name, &json);
    Ok(())
}

pub fn clear_consent(store: &mut impl ConsentStore, banner_id: &str) {
    let name = cookie_name(banner_id);
    store.delete_cookie(&name);
    store.remove_local(&name);
}

/// One durable visitor id, repaired from whichever store still has it.
pub fn ensure_user_id(store: &mut impl ConsentStore, banner_id: &str, now: DateTime<Utc>) -> String {
    let key = user_id_key(banner_id);
    let from_local = store.read_local(&key);
    let from_cookie = store
        .read_cookie(&key)
        .and_then(|raw| urlencoding::decode(&raw).ok().map(|s| s.into_owned()));

    let id = from_local
        .clone()
        .or_else(|| from_cookie.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if from_local.as_deref() != Some(id.as_str()) {
        store.write_local(&key, &id);
    }
    if from_cookie.as_deref() != Some(id.as_str()) {
        store.write_cookie(&key, &id, USER_ID_EXPIRY_DAYS, now);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_persist_then_load() {
        let mut store = InMemoryStore::new();
        let state = ConsentState::reject_all(&[], now());
        persist_consent(&mut store, "acme", &state, 365, now()).unwrap();

        assert_eq!(load_consent(&store, "acme"), Some(state.clone()));
        assert!(store.written[0].starts_with("acme-consent="));
        assert!(store.written[0].ends_with("; path=/; SameSite=Lax"));

        store.delete_cookie("acme-consent");
        assert_eq!(load_consent(&store, "acme"), Some(state));

        clear_consent(&mut store, "acme");
        assert_eq!(load_consent(&store, "acme"), None);
    }

    #[test]
    fn test_garbage_cookie_is_ignored() {
        let mut store = InMemoryStore::new();
        store.cookies.insert("acme-consent".into(), "garbage".into());
        assert_eq!(load_consent(&store, "acme"), None);
    }

    #[test]
    fn test_user_id_is_stable_and_repaired() {
        let mut store = InMemoryStore::new();
        let first = ensure_user_id(&mut store, "acme", now());
        assert_eq!(ensure_user_id(&mut store, "acme", now()), first);

        store.remove_local("acme-uid");
        assert_eq!(ensure_user_id(&mut store, "acme", now()), first);
        assert_eq!(store.read_local("acme-uid"), Some(first.clone()));

        store.delete_cookie("acme-uid");
        assert_eq!(ensure_user_id(&mut store, "acme", now()), first);
        assert!(store.read_cookie("acme-uid").is_some());
    }
}
