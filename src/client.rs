//! Client side of the handshake. Each state is consumed by the call that
//! advances it, so a message can never be replayed against the wrong stage
//! of the exchange.

use rand::{CryptoRng, Rng};
use ring::constant_time;
use tracing::warn;

use crate::error::{Error, Kind, Result};
use crate::messages::{ClientFinalMessage, ClientFirstMessage, ServerFinalMessage, ServerFirstMessage};
use crate::KEY_LEN;

/// The entry point for a client-side SCRAM handshake.
pub struct ScramClient<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> ScramClient<'a> {
    /// Constructs an initial handshake state from the credentials.
    pub fn new(username: &'a str, password: &'a str) -> Self {
        ScramClient { username, password }
    }

    /// Computes the first client message and advances the handshake.
    ///
    /// The random source generates the client nonce; only use a
    /// cryptographically secure generator.
    pub fn client_first<R: Rng + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<(WaitingServerFirst<'a>, String)> {
        let client_first = ClientFirstMessage::new(self.username, rng)?;
        let base64 = client_first.to_base64();
        Ok((
            WaitingServerFirst {
                password: self.password,
                client_first,
            },
            base64,
        ))
    }
}

/// Waits for the server challenge.
pub struct WaitingServerFirst<'a> {
    password: &'a str,
    client_first: ClientFirstMessage,
}

impl<'a> WaitingServerFirst<'a> {
    /// Processes the server challenge and computes the final client message.
    ///
    /// Runs the iteration-count-gated `Hi` stretch once. A server error
    /// payload aborts the handshake with [`Error::AuthenticationFailed`].
    pub fn handle_server_first(self, base64: &[u8]) -> Result<(WaitingServerFinal, String)> {
        let server_first = ServerFirstMessage::parse(base64, &self.client_first)?;
        if let Some(reason) = server_first.error_reason() {
            warn!(reason, "server rejected the handshake");
            return Err(Error::AuthenticationFailed);
        }

        let client_final =
            ClientFinalMessage::new(self.password, &self.client_first, &server_first)?;
        let base64 = client_final.to_base64();
        let server_signature = *client_final.server_signature();

        Ok((WaitingServerFinal { server_signature }, base64))
    }
}

/// Waits for the server's signature and session token.
#[derive(Debug)]
pub struct WaitingServerFinal {
    server_signature: [u8; KEY_LEN],
}

impl WaitingServerFinal {
    /// Processes the final server message and yields the session token.
    ///
    /// A signature that does not match the one derived from the password
    /// fails with [`Error::InvalidServer`]: the peer answered the handshake
    /// without holding the server key.
    pub fn handle_server_final(self, base64: &[u8]) -> Result<String> {
        let server_final = ServerFinalMessage::parse(base64)?;
        if let Some(reason) = server_final.error_reason() {
            warn!(reason, "server rejected authentication");
            return Err(Error::AuthenticationFailed);
        }

        if constant_time::verify_slices_are_equal(
            server_final.server_signature(),
            &self.server_signature,
        )
        .is_err()
        {
            return Err(Error::InvalidServer);
        }

        server_final
            .token()
            .map(str::to_owned)
            .ok_or_else(|| Kind::Length.into())
    }
}
