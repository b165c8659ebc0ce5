use rand::{CryptoRng, Rng};

use crate::credentials::UserCredentials;
use crate::error::{Error, Kind, Result};
use crate::messages::ClientFirstMessage;
use crate::utils;
use crate::{MAX_ITERATIONS, MIN_ITERATIONS, NONCE_LEN, SALT_LEN};

/// Total length of the success form.
const MESSAGE_LEN: usize = 96;
const C_NONCE_START: usize = 2;
const S_NONCE_START: usize = 32;
const SALT_START: usize = 65;
const ITER_START: usize = 92;

/// The "server-first" challenge, or a "server-error" payload.
///
/// ```text
/// SERVER_FIRST = "r=" + CNONCE[30] + SNONCE[30] + ",s=" + SALT[24] + ",i=" + ITER_COUNT[4]
/// SERVER_ERROR = "e=" + REASON
/// ```
///
/// When constructed by the server in response to a valid client-first, the
/// message also carries the correlation token under which the pending
/// handshake is stored; the token never appears on the wire here.
#[derive(Clone, Debug)]
pub struct ServerFirstMessage {
    c_nonce: [u8; NONCE_LEN],
    s_nonce: [u8; NONCE_LEN],
    salt: [u8; SALT_LEN],
    iter_count: u32,
    token: Option<String>,
    error: Option<String>,
    message: Vec<u8>,
}

impl ServerFirstMessage {
    /// Builds the challenge for a client-first against the credentials
    /// matching its username, with a fresh server nonce and correlation
    /// token (server role).
    pub fn new<R: Rng + CryptoRng>(
        client_first: &ClientFirstMessage,
        credentials: &UserCredentials,
        rng: &mut R,
    ) -> Result<Self> {
        if credentials.normalized_username() != client_first.normalized_username() {
            return Err(Error::InvalidArgument(
                "credentials do not match the client-first username",
            ));
        }

        let s_nonce = utils::random_nonce(rng);
        let salt = *credentials.salt();
        let iter_count = credentials.iter_count();

        let mut message = Vec::with_capacity(MESSAGE_LEN);
        message.extend_from_slice(b"r=");
        message.extend_from_slice(client_first.c_nonce());
        message.extend_from_slice(&s_nonce);
        message.extend_from_slice(b",s=");
        message.extend_from_slice(&salt);
        message.extend_from_slice(format!(",i={:04}", iter_count).as_bytes());
        debug_assert_eq!(message.len(), MESSAGE_LEN);

        Ok(ServerFirstMessage {
            c_nonce: *client_first.c_nonce(),
            s_nonce,
            salt,
            iter_count,
            token: Some(utils::new_token(rng)),
            error: None,
            message,
        })
    }

    /// Builds the error form, `"e=" + reason`.
    pub fn error(reason: &str) -> Result<Self> {
        if reason.trim().is_empty() {
            return Err(Error::InvalidArgument("error reason must not be blank"));
        }

        let mut message = Vec::with_capacity(2 + reason.len());
        message.extend_from_slice(b"e=");
        message.extend_from_slice(reason.as_bytes());

        Ok(ServerFirstMessage {
            c_nonce: [0; NONCE_LEN],
            s_nonce: [0; NONCE_LEN],
            salt: [0; SALT_LEN],
            iter_count: 0,
            token: None,
            error: Some(reason.to_owned()),
            message,
        })
    }

    /// Reconstructs a challenge received over the wire, binding it to the
    /// client-first it answers (client role).
    ///
    /// Rejects a message whose embedded client nonce does not match
    /// `client_first`, whose layout is off, or whose iteration count falls
    /// outside the accepted range.
    pub fn parse(base64: &[u8], client_first: &ClientFirstMessage) -> Result<Self> {
        let message = base64::decode(base64).map_err(|_| Kind::Encoding)?;

        if message.len() > 2 && message[..2] == *b"e=" {
            let reason =
                String::from_utf8(message[2..].to_vec()).map_err(|_| Kind::Encoding)?;
            return Ok(ServerFirstMessage {
                c_nonce: [0; NONCE_LEN],
                s_nonce: [0; NONCE_LEN],
                salt: [0; SALT_LEN],
                iter_count: 0,
                token: None,
                error: Some(reason),
                message,
            });
        }

        if message.len() != MESSAGE_LEN {
            return Err(Kind::Length.into());
        }
        if message[..2] != *b"r="
            || message[62] != b','
            || message[63..65] != *b"s="
            || message[89] != b','
            || message[90..92] != *b"i="
            || !message[ITER_START..].iter().all(|b| b.is_ascii_digit())
        {
            return Err(Kind::Delimiter.into());
        }
        if message[C_NONCE_START..S_NONCE_START] != client_first.c_nonce()[..] {
            return Err(Kind::Nonce.into());
        }

        let mut s_nonce = [0u8; NONCE_LEN];
        s_nonce.copy_from_slice(&message[S_NONCE_START..S_NONCE_START + NONCE_LEN]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&message[SALT_START..SALT_START + SALT_LEN]);

        let iter_count = message[ITER_START..]
            .iter()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iter_count) {
            return Err(Kind::IterationCount.into());
        }

        Ok(ServerFirstMessage {
            c_nonce: *client_first.c_nonce(),
            s_nonce,
            salt,
            iter_count,
            token: None,
            error: None,
            message,
        })
    }

    /// Whether this is a "server-error" payload.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The error reason, when this is a "server-error" payload.
    pub fn error_reason(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The server nonce.
    pub fn s_nonce(&self) -> &[u8; NONCE_LEN] {
        &self.s_nonce
    }

    /// The per-user salt echoed from the matched credentials.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// The `Hi` iteration count.
    pub fn iter_count(&self) -> u32 {
        self.iter_count
    }

    /// The correlation token, present only on a server-constructed challenge.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
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
