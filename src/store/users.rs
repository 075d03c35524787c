//! Identity/role store: user records keyed by a stable integer id, with
//! email uniqueness enforced at creation and argon2 password verification.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};

use crate::access::Role;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct UserState {
    next_id: i64,
    by_id: HashMap<i64, UserRecord>,
}

pub struct UserStore {
    inner: RwLock<UserState>,
}

fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("salt".into(), e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("salt".into(), e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash".into(), e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(UserState { next_id: 1, by_id: HashMap::new() }) }
    }

    /// Create a new identity. Fails when the email is already taken; the
    /// password arrives pre-validated and is stored as an argon2 PHC string.
    pub fn create(&self, email: &str, password: &str, name: &str, role: Role) -> AppResult<UserRecord> {
        let phc = hash_password(password)?;
        let mut state = self.inner.write();
        if state.by_id.values().any(|u| u.email == email) {
            return Err(AppError::user("email_exists", "Email already exists."));
        }
        let id = state.next_id;
        state.next_id += 1;
        let record = UserRecord {
            id,
            email: email.to_string(),
            password_hash: phc,
            name: name.to_string(),
            role,
            created_at: Utc::now(),
        };
        state.by_id.insert(id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Option<UserRecord> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.inner.read().by_id.values().find(|u| u.email == email).cloned()
    }

    /// Password login: returns the user when the email exists and the
    /// password verifies against the stored hash.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<UserRecord> {
        let user = self.find_by_email(email)?;
        if verify_password(&user.password_hash, password) {
            Some(user)
        } else {
            None
        }
    }

    /// Role lookup, once per request.
    pub fn role_of(&self, id: i64) -> Option<Role> {
        self.inner.read().by_id.get(&id).map(|u| u.role)
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_authenticate() {
        let store = UserStore::new();
        let u = store.create("a@x.com", "Test@1234", "A", Role::Ops).unwrap();
        assert_eq!(u.id, 1);
        assert!(store.authenticate("a@x.com", "Test@1234").is_some());
        assert!(store.authenticate("a@x.com", "wrong").is_none());
        assert!(store.authenticate("b@x.com", "Test@1234").is_none());
        assert_eq!(store.role_of(u.id), Some(Role::Ops));
    }

    #[test]
    fn email_uniqueness_is_enforced() {
        let store = UserStore::new();
        store.create("a@x.com", "Test@1234", "A", Role::Ops).unwrap();
        let dup = store.create("a@x.com", "Other@123", "B", Role::Client);
        assert!(dup.is_err());
    }

    #[test]
    fn stored_hash_is_phc_not_plaintext() {
        let store = UserStore::new();
        let u = store.create("a@x.com", "Test@1234", "A", Role::Client).unwrap();
        assert!(u.password_hash.starts_with("$argon2"));
        assert!(!u.password_hash.contains("Test@1234"));
    }
}
