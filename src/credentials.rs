//! Per-user derived secrets and the in-memory credential table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::{CryptoRng, Rng};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::utils;
use crate::{KEY_LEN, MAX_ITERATIONS, MIN_ITERATIONS, SALT_LEN};

/// Credentials associated with one username. Carries only the information
/// needed to verify a SCRAM-SHA-256 exchange, never the password.
///
/// Immutable after construction. Restore persisted records with
/// [`UserCredentials::from_stored`]; enroll a new user with
/// [`UserCredentials::from_password`], which performs the expensive
/// derivation exactly once.
pub struct UserCredentials {
    role: String,
    username: String,
    normalized_username: Vec<u8>,
    salt: [u8; SALT_LEN],
    iter_count: u32,
    stored_key: [u8; KEY_LEN],
    server_key: [u8; KEY_LEN],
}

impl UserCredentials {
    /// Restores credentials from previously derived fields.
    ///
    /// Fails with a descriptive [`Error::InvalidArgument`] when a field does
    /// not have its required length or the iteration count is out of range.
    pub fn from_stored(
        role: &str,
        username: &str,
        salt: &[u8],
        stored_key: &[u8],
        server_key: &[u8],
        iter_count: u32,
    ) -> Result<Self> {
        let (role, username, normalized_username) = Self::check_identity(role, username)?;
        Self::check_iterations(iter_count)?;

        let salt: [u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| Error::InvalidArgument("salt must be exactly 24 bytes"))?;
        let stored_key: [u8; KEY_LEN] = stored_key
            .try_into()
            .map_err(|_| Error::InvalidArgument("stored key must be exactly 32 bytes"))?;
        let server_key: [u8; KEY_LEN] = server_key
            .try_into()
            .map_err(|_| Error::InvalidArgument("server key must be exactly 32 bytes"))?;

        Ok(UserCredentials {
            role,
            username,
            normalized_username,
            salt,
            iter_count,
            stored_key,
            server_key,
        })
    }

    /// Enrolls a new user: derives the stored key and server key from the
    /// password under a fresh random salt.
    ///
    /// The password is normalized, stretched with `Hi`, and discarded; the
    /// intermediate password-equivalent values are wiped before returning.
    pub fn from_password<R: Rng + CryptoRng>(
        role: &str,
        username: &str,
        password: &str,
        iter_count: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let (role, username, normalized_username) = Self::check_identity(role, username)?;
        Self::check_iterations(iter_count)?;

        let salt = utils::random_salt(rng);

        let mut normalized_password = normalize(password);
        let mut salted_password = utils::hi(&normalized_password, &salt, iter_count);
        let mut client_key = utils::hmac_sha256(&salted_password, utils::CLIENT_KEY_TEXT);
        let stored_key = utils::sha256(&client_key);
        let server_key = utils::hmac_sha256(&salted_password, utils::SERVER_KEY_TEXT);
        normalized_password.zeroize();
        salted_password.zeroize();
        client_key.zeroize();

        Ok(UserCredentials {
            role,
            username,
            normalized_username,
            salt,
            iter_count,
            stored_key,
            server_key,
        })
    }

    fn check_identity(role: &str, username: &str) -> Result<(String, String, Vec<u8>)> {
        if role.is_empty() {
            return Err(Error::InvalidArgument("role must not be empty"));
        }
        if username.is_empty() {
            return Err(Error::InvalidArgument("username must not be empty"));
        }
        let normalized_username = normalize(username);
        if normalized_username.is_empty() {
            return Err(Error::InvalidArgument("username must not normalize to nothing"));
        }
        Ok((role.to_owned(), username.to_owned(), normalized_username))
    }

    fn check_iterations(iter_count: u32) -> Result<()> {
        if (MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iter_count) {
            Ok(())
        } else {
            Err(Error::InvalidArgument("iteration count must be in [4096, 9999]"))
        }
    }

    /// The user's role.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The username as provided at enrollment.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The normalized username, as it keys the credential store.
    pub fn normalized_username(&self) -> &[u8] {
        &self.normalized_username
    }

    /// The per-user salt sent in the server-first challenge.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// The `Hi` iteration count sent in the server-first challenge.
    pub fn iter_count(&self) -> u32 {
        self.iter_count
    }

    pub(crate) fn stored_key(&self) -> &[u8; KEY_LEN] {
        &self.stored_key
    }

    pub(crate) fn server_key(&self) -> &[u8; KEY_LEN] {
        &self.server_key
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("role", &self.role)
            .field("username", &self.username)
            .field("iter_count", &self.iter_count)
            .field("salt", &"[redacted]")
            .field("stored_key", &"[redacted]")
            .field("server_key", &"[redacted]")
            .finish()
    }
}

/// A table mapping normalized usernames to credentials.
///
/// Entries are added or replaced, never removed; records live for the
/// process lifetime. Lookups and inserts are safe from concurrent callers.
#[derive(Default)]
pub struct CredentialStore {
    inner: Mutex<HashMap<Vec<u8>, Arc<UserCredentials>>>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        CredentialStore::default()
    }

    /// Adds a credential, replacing any existing record for the same
    /// normalized username.
    pub fn insert(&self, credentials: UserCredentials) {
        let key = credentials.normalized_username.clone();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key, Arc::new(credentials));
    }

    /// Looks up the credentials for a normalized username.
    pub fn lookup(&self, normalized_username: &[u8]) -> Option<Arc<UserCredentials>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(normalized_username).cloned()
    }

    /// The number of stored records.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn enrollment_derives_the_documented_pipeline() {
        let mut rng = rng();
        let cred = UserCredentials::from_password("ADM", "jdoe", "some_password", 4096, &mut rng)
            .unwrap();

        let salted = utils::hi(&normalize("some_password"), cred.salt(), 4096);
        let client_key = utils::hmac_sha256(&salted, utils::CLIENT_KEY_TEXT);
        assert_eq!(cred.stored_key(), &utils::sha256(&client_key));
        assert_eq!(
            cred.server_key(),
            &utils::hmac_sha256(&salted, utils::SERVER_KEY_TEXT)
        );
        assert_eq!(cred.normalized_username(), b"jdoe");
        assert_eq!(cred.iter_count(), 4096);
    }

    #[test]
    fn salts_are_unique_per_enrollment() {
        let mut rng = rng();
        let a = UserCredentials::from_password("u", "jdoe", "pw-one", 4096, &mut rng).unwrap();
        let b = UserCredentials::from_password("u", "jdoe", "pw-one", 4096, &mut rng).unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.stored_key(), b.stored_key());
    }

    #[test]
    fn from_stored_round_trips_derived_fields() {
        let mut rng = rng();
        let derived =
            UserCredentials::from_password("u", "alice", "pw", 9999, &mut rng).unwrap();
        let restored = UserCredentials::from_stored(
            derived.role(),
            derived.username(),
            derived.salt(),
            derived.stored_key(),
            derived.server_key(),
            derived.iter_count(),
        )
        .unwrap();
        assert_eq!(restored.stored_key(), derived.stored_key());
        assert_eq!(restored.server_key(), derived.server_key());
        assert_eq!(restored.normalized_username(), derived.normalized_username());
    }

    #[test]
    fn from_stored_validates_lengths_and_ranges() {
        let salt = [0u8; SALT_LEN];
        let key = [0u8; KEY_LEN];

        assert!(UserCredentials::from_stored("", "u", &salt, &key, &key, 4096).is_err());
        assert!(UserCredentials::from_stored("r", "", &salt, &key, &key, 4096).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt[..23], &key, &key, 4096).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt, &key[..31], &key, 4096).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt, &key, &key[..31], 4096).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt, &key, &key, 4095).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt, &key, &key, 10000).is_err());
        assert!(UserCredentials::from_stored("r", "u", &salt, &key, &key, 9999).is_ok());
    }

    #[test]
    fn iteration_bounds_apply_to_enrollment() {
        let mut rng = rng();
        assert!(UserCredentials::from_password("r", "u", "pw", 4095, &mut rng).is_err());
        assert!(UserCredentials::from_password("r", "u", "pw", 10000, &mut rng).is_err());
    }

    #[test]
    fn store_lookup_uses_the_normalized_name() {
        let mut rng = rng();
        let store = CredentialStore::new();
        // U+FB01 LATIN SMALL LIGATURE FI normalizes to "fi".
        store.insert(
            UserCredentials::from_password("u", "\u{FB01}ona", "pw", 4096, &mut rng).unwrap(),
        );
        assert!(store.lookup(b"fiona").is_some());
        assert!(store.lookup("\u{FB01}ona".as_bytes()).is_none());
    }

    #[test]
    fn store_insert_replaces_existing_records() {
        let mut rng = rng();
        let store = CredentialStore::new();
        store.insert(UserCredentials::from_password("u", "alice", "old", 4096, &mut rng).unwrap());
        let first = store.lookup(b"alice").unwrap();
        store.insert(UserCredentials::from_password("u", "alice", "new", 4096, &mut rng).unwrap());
        let second = store.lookup(b"alice").unwrap();
        assert_eq!(store.len(), 1);
        assert_ne!(first.stored_key(), second.stored_key());
    }

    #[test]
    fn debug_redacts_key_material() {
        let mut rng = rng();
        let cred = UserCredentials::from_password("u", "alice", "pw", 4096, &mut rng).unwrap();
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("alice"));
        assert!(rendered.contains("[redacted]"));
    }
}
