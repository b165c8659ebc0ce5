//! Server side of the exchange: a shared service that correlates pending
//! handshakes, verifies proofs, and manages issued session tokens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::{CryptoRng, Rng};
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, UserCredentials};
use crate::error::{Error, Result};
use crate::messages::{ClientFinalMessage, ClientFirstMessage, ServerFinalMessage, ServerFirstMessage};

/// Lifetimes and limits for handshakes and sessions.
#[derive(Clone, Debug)]
pub struct ScramServerConfig {
    /// How long a pending handshake may wait for its client-final.
    pub pending_timeout: Duration,
    /// Sliding lifetime of an issued session token; refreshed on each
    /// successful validation.
    pub token_timeout: Duration,
    /// Pending handshakes allowed before new attempts are shed.
    pub max_pending: usize,
}

impl Default for ScramServerConfig {
    fn default() -> Self {
        ScramServerConfig {
            pending_timeout: Duration::from_secs(60),
            token_timeout: Duration::from_secs(5 * 60),
            max_pending: 100,
        }
    }
}

/// One login attempt between its client-first and client-final.
struct PendingAuthentication {
    credentials: Arc<UserCredentials>,
    client_first: ClientFirstMessage,
    server_first: ServerFirstMessage,
    deadline: Instant,
}

/// An authenticated session with a sliding expiry.
struct IssuedToken {
    credentials: Arc<UserCredentials>,
    expires_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Responds to client authentication challenges. The entry point for the
/// server side of the mechanism.
///
/// Safe to share across request-handling threads: the pending-handshake
/// table, the issued-token table, and the random source are each guarded,
/// and every operation is a short CPU-bound call. Timeouts are wall-clock
/// deadlines evaluated lazily on subsequent calls; nothing is scheduled.
pub struct ScramServer<R: Rng + CryptoRng> {
    store: Arc<CredentialStore>,
    config: ScramServerConfig,
    rng: Mutex<R>,
    pending: Mutex<HashMap<String, PendingAuthentication>>,
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl<R: Rng + CryptoRng> ScramServer<R> {
    /// Creates a server over a credential store with default lifetimes.
    ///
    /// The random source generates server nonces and correlation tokens;
    /// only use a cryptographically secure generator.
    pub fn new(store: Arc<CredentialStore>, rng: R) -> Self {
        Self::with_config(store, rng, ScramServerConfig::default())
    }

    /// Creates a server with explicit lifetimes and limits.
    pub fn with_config(store: Arc<CredentialStore>, rng: R, config: ScramServerConfig) -> Self {
        ScramServer {
            store,
            config,
            rng: Mutex::new(rng),
            pending: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Handles a base64 "client-first" message: sweeps expired handshakes,
    /// sheds load over capacity, resolves the username, and stores a new
    /// pending handshake under the challenge's correlation token.
    ///
    /// The returned challenge carries that token; hand it back with the
    /// client-final. Map an `Err` to the wire with
    /// [`Error::wire_reason`] and [`ServerFirstMessage::error`].
    pub fn handle_client_first(&self, base64: &[u8]) -> Result<ServerFirstMessage> {
        let now = Instant::now();
        {
            let mut pending = lock(&self.pending);
            pending.retain(|_, attempt| attempt.deadline > now);
            if pending.len() > self.config.max_pending {
                warn!(pending = pending.len(), "shedding client-first, too many pending handshakes");
                return Err(Error::CapacityExceeded);
            }
        }

        let client_first = ClientFirstMessage::parse(base64)?;
        let credentials = match self.store.lookup(client_first.normalized_username()) {
            Some(credentials) => credentials,
            None => {
                warn!(
                    username = %String::from_utf8_lossy(client_first.normalized_username()),
                    "client-first for unknown user"
                );
                return Err(Error::UnknownUser);
            }
        };

        let server_first = {
            let mut rng = lock(&self.rng);
            ServerFirstMessage::new(&client_first, &credentials, &mut *rng)?
        };
        let token = server_first
            .token()
            .ok_or(Error::InvalidArgument("challenge is missing its token"))?
            .to_owned();

        let mut pending = lock(&self.pending);
        pending.insert(
            token.clone(),
            PendingAuthentication {
                credentials,
                client_first,
                server_first: server_first.clone(),
                deadline: now + self.config.pending_timeout,
            },
        );
        debug!(token = %token, "stored pending handshake");

        Ok(server_first)
    }

    /// Handles a base64 "client-final" message for the handshake stored
    /// under `token`.
    ///
    /// The pending handshake is consumed whether or not the proof verifies;
    /// a failed client must restart from client-first. On success the same
    /// token becomes a session token with a sliding expiry, and the signed
    /// server-final is returned.
    pub fn handle_client_final(&self, token: &str, base64: &[u8]) -> Result<ServerFinalMessage> {
        let now = Instant::now();

        let attempt = lock(&self.pending).remove(token);
        let attempt = match attempt {
            Some(attempt) if attempt.deadline > now => attempt,
            Some(_) => {
                warn!("client-final for an expired handshake");
                return Err(Error::UnknownToken);
            }
            None => {
                warn!("client-final without a matching pending handshake");
                return Err(Error::UnknownToken);
            }
        };

        let client_final = ClientFinalMessage::parse(
            base64,
            &attempt.client_first,
            &attempt.server_first,
            &attempt.credentials,
        )
        .map_err(|err| {
            warn!(username = %attempt.credentials.username(), %err, "client-final rejected");
            err
        })?;

        let server_final = ServerFinalMessage::new(&client_final, &attempt.credentials, token)?;

        {
            let mut tokens = lock(&self.tokens);
            tokens.retain(|_, issued| issued.expires_at > now);
            tokens.insert(
                token.to_owned(),
                IssuedToken {
                    credentials: Arc::clone(&attempt.credentials),
                    expires_at: now + self.config.token_timeout,
                },
            );
        }
        info!(
            username = %attempt.credentials.username(),
            "SCRAM-SHA-256 authentication succeeded"
        );

        Ok(server_final)
    }

    /// Validates a session token.
    ///
    /// An unknown token yields `None`; an expired one is evicted and yields
    /// `None`; otherwise the expiry slides forward by the configured token
    /// lifetime and the associated credentials are returned. The refresh is
    /// a single read-modify-write under the table lock.
    pub fn validate_token(&self, token: &str) -> Option<Arc<UserCredentials>> {
        let now = Instant::now();
        let mut tokens = lock(&self.tokens);

        if let Some(issued) = tokens.get_mut(token) {
            if issued.expires_at > now {
                issued.expires_at = now + self.config.token_timeout;
                return Some(Arc::clone(&issued.credentials));
            }
            tokens.remove(token);
            debug!("evicted expired session token");
        }
        None
    }
}
