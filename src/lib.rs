//! # Salted Challenge Response Authentication Mechanism (SCRAM)
//!
//! This crate implements the SCRAM-SHA-256 mechanism according to RFC 5802
//! and RFC 7677, without channel binding, over a compact fixed-layout wire
//! encoding. It provides both sides of the exchange: a client state machine
//! and a concurrent server service that correlates pending handshakes,
//! issues opaque session tokens with a sliding expiry, and sheds load when
//! too many handshakes are in flight.
//!
//! The server stores only derived secrets (a stored key and a server key);
//! the password itself is never retained, transmitted, or recoverable from
//! the credential record.
//!
//! # Usage
//!
//! A typical exchange is shown below. Each of the four messages advances a
//! consuming state on the client side; the server is shared and may be
//! driven concurrently from many request handlers. In productive code you
//! should replace the unwrapping by proper error handling.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scram_auth::{CredentialStore, ScramClient, ScramServer, UserCredentials};
//!
//! let mut rng = rand::thread_rng();
//!
//! // Enrollment: derive and store the credential record once.
//! let store = Arc::new(CredentialStore::new());
//! let alice = UserCredentials::from_password("user", "alice", "correct-horse", 4096, &mut rng)
//!     .unwrap();
//! store.insert(alice);
//!
//! let server = ScramServer::new(Arc::clone(&store), rand::thread_rng());
//!
//! // One login attempt: four messages, two round trips.
//! let client = ScramClient::new("alice", "correct-horse");
//! let (client, client_first) = client.client_first(&mut rng).unwrap();
//!
//! let server_first = server.handle_client_first(client_first.as_bytes()).unwrap();
//! let handshake_token = server_first.token().unwrap().to_owned();
//!
//! let (client, client_final) = client
//!     .handle_server_first(server_first.to_base64().as_bytes())
//!     .unwrap();
//!
//! let server_final = server
//!     .handle_client_final(&handshake_token, client_final.as_bytes())
//!     .unwrap();
//! let session_token = client
//!     .handle_server_final(server_final.to_base64().as_bytes())
//!     .unwrap();
//!
//! // The session token stays valid while it is used at least once per window.
//! assert!(server.validate_token(&session_token).is_some());
//! ```

mod client;
mod credentials;
mod error;
mod messages;
mod normalize;
mod server;
mod utils;

pub use client::{ScramClient, WaitingServerFinal, WaitingServerFirst};
pub use credentials::{CredentialStore, UserCredentials};
pub use error::{Error, Kind, Result};
pub use messages::{ClientFinalMessage, ClientFirstMessage, ServerFinalMessage, ServerFirstMessage};
pub use normalize::normalize;
pub use server::{ScramServer, ScramServerConfig};

/// Length in bytes of the client and server nonces.
pub const NONCE_LEN: usize = 30;

/// Length in bytes of a per-user salt.
pub const SALT_LEN: usize = 24;

/// Length in bytes of a SHA-256 output, and so of every derived key,
/// signature, and proof.
pub const KEY_LEN: usize = 32;

/// Length in characters of correlation and session tokens.
pub const TOKEN_LEN: usize = 30;

/// Smallest iteration count accepted when generating or parsing a credential.
pub const MIN_ITERATIONS: u32 = 4096;

/// Largest accepted iteration count. Keeps the wire rendering at exactly
/// four ASCII digits.
pub const MAX_ITERATIONS: u32 = 9999;
