use ring::constant_time;
use zeroize::Zeroize;

use crate::credentials::UserCredentials;
use crate::error::{Error, Kind, Result};
use crate::messages::{ClientFirstMessage, ServerFirstMessage};
use crate::normalize::normalize;
use crate::utils;
use crate::{KEY_LEN, NONCE_LEN};

/// Total length: two nonces, a comma, and the raw 32-byte proof.
const MESSAGE_LEN: usize = 93;
const COMMA_POS: usize = 60;
const PROOF_START: usize = 61;

/// The "client-final" message carrying the proof of password knowledge.
///
/// ```text
/// SALTED_PASSWORD = Hi(Normalize(password), SALT, ITER_COUNT)
/// CLIENT_KEY      = HMAC(SALTED_PASSWORD, "Client Key")
/// STORED_KEY      = H(CLIENT_KEY)
/// AUTH_MESSAGE    = CLIENT_FIRST + "," + SERVER_FIRST + "," + CNONCE + SNONCE
/// CLIENT_SIG      = HMAC(STORED_KEY, AUTH_MESSAGE)
/// CLIENT_PROOF    = CLIENT_KEY XOR CLIENT_SIG
/// CLIENT_FINAL    = CNONCE + SNONCE + "," + CLIENT_PROOF
/// ```
///
/// The server-side [`parse`](ClientFinalMessage::parse) *is* the verification
/// step: it recovers the client key from the received proof and checks its
/// hash against the stored key.
#[derive(Clone, Debug)]
pub struct ClientFinalMessage {
    auth_message: Vec<u8>,
    client_proof: [u8; KEY_LEN],
    server_signature: [u8; KEY_LEN],
    message: Vec<u8>,
}

fn assemble_auth_message(
    client_first: &ClientFirstMessage,
    server_first: &ServerFirstMessage,
) -> Vec<u8> {
    let mut auth = Vec::with_capacity(
        client_first.as_bytes().len() + server_first.as_bytes().len() + 2 + 2 * NONCE_LEN,
    );
    auth.extend_from_slice(client_first.as_bytes());
    auth.push(b',');
    auth.extend_from_slice(server_first.as_bytes());
    auth.push(b',');
    auth.extend_from_slice(client_first.c_nonce());
    auth.extend_from_slice(server_first.s_nonce());
    auth
}

impl ClientFinalMessage {
    /// Derives the proof from the entered password and builds the message
    /// (client role). This runs the iteration-count-gated `Hi` stretch.
    pub fn new(
        password: &str,
        client_first: &ClientFirstMessage,
        server_first: &ServerFirstMessage,
    ) -> Result<Self> {
        if server_first.is_error() {
            return Err(Error::InvalidArgument("cannot answer an error server-first"));
        }

        let auth_message = assemble_auth_message(client_first, server_first);

        let mut normalized_password = normalize(password);
        let mut salted_password =
            utils::hi(&normalized_password, server_first.salt(), server_first.iter_count());
        let (client_proof, server_signature) = utils::find_proofs(&salted_password, &auth_message);
        normalized_password.zeroize();
        salted_password.zeroize();

        let mut message = Vec::with_capacity(MESSAGE_LEN);
        message.extend_from_slice(client_first.c_nonce());
        message.extend_from_slice(server_first.s_nonce());
        message.push(b',');
        message.extend_from_slice(&client_proof);

        Ok(ClientFinalMessage {
            auth_message,
            client_proof,
            server_signature,
            message,
        })
    }

    /// Parses a message received over the wire and verifies its proof
    /// against the pending handshake and the stored key (server role).
    ///
    /// A proof that does not verify fails with
    /// [`Error::AuthenticationFailed`]; layout or nonce-binding violations
    /// fail with [`Error::Malformed`].
    pub fn parse(
        base64: &[u8],
        client_first: &ClientFirstMessage,
        server_first: &ServerFirstMessage,
        credentials: &UserCredentials,
    ) -> Result<Self> {
        let message = base64::decode(base64).map_err(|_| Kind::Encoding)?;

        if message.len() != MESSAGE_LEN {
            return Err(Kind::Length.into());
        }
        if message[COMMA_POS] != b',' {
            return Err(Kind::Delimiter.into());
        }
        if message[..NONCE_LEN] != client_first.c_nonce()[..] {
            return Err(Kind::Nonce.into());
        }
        if message[NONCE_LEN..COMMA_POS] != server_first.s_nonce()[..] {
            return Err(Kind::Nonce.into());
        }

        let mut client_proof = [0u8; KEY_LEN];
        client_proof.copy_from_slice(&message[PROOF_START..]);

        let auth_message = assemble_auth_message(client_first, server_first);
        let client_signature = utils::hmac_sha256(credentials.stored_key(), &auth_message);

        let mut client_key = [0u8; KEY_LEN];
        for (key, (sig, proof)) in client_key
            .iter_mut()
            .zip(client_signature.iter().zip(client_proof.iter()))
        {
            *key = sig ^ proof;
        }
        let recovered_stored_key = utils::sha256(&client_key);
        client_key.zeroize();

        if constant_time::verify_slices_are_equal(&recovered_stored_key, credentials.stored_key())
            .is_err()
        {
            return Err(Error::AuthenticationFailed);
        }

        let server_signature = utils::hmac_sha256(credentials.server_key(), &auth_message);

        Ok(ClientFinalMessage {
            auth_message,
            client_proof,
            server_signature,
            message,
        })
    }

    /// The exact byte string both sides sign to bind the exchange together.
    pub fn auth_message(&self) -> &[u8] {
        &self.auth_message
    }

    /// The proof carried by the message.
    pub fn client_proof(&self) -> &[u8; KEY_LEN] {
        &self.client_proof
    }

    /// The signature the server is expected to answer with.
    pub(crate) fn server_signature(&self) -> &[u8; KEY_LEN] {
        &self.server_signature
    }

    /// The raw message bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.message
    }

    /// The transport form of the message.
    pub fn to_base64(&self) -> String {
        base64::encode(&self.message)
    }
}
