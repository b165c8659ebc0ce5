use rand::{CryptoRng, Rng};

use crate::error::{Error, Kind, Result};
use crate::normalize::normalize;
use crate::utils;
use crate::NONCE_LEN;

const LEADING: &[u8] = b"n,,n=";
const MID: &[u8] = b",r=";

/// The "client-first" message opening an authentication exchange.
///
/// ```text
/// CLIENT_FIRST = "n,,n=" + NORMALIZED_USERNAME + ",r=" + CNONCE[30]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientFirstMessage {
    normalized_username: Vec<u8>,
    c_nonce: [u8; NONCE_LEN],
    message: Vec<u8>,
}

impl ClientFirstMessage {
    /// Builds the message with a fresh random client nonce (client role).
    pub fn new<R: Rng + CryptoRng>(username: &str, rng: &mut R) -> Result<Self> {
        if username.is_empty() {
            return Err(Error::InvalidArgument("username must not be empty"));
        }
        let normalized_username = normalize(username);
        if normalized_username.is_empty() {
            return Err(Error::InvalidArgument("username must not normalize to nothing"));
        }

        let c_nonce = utils::random_nonce(rng);

        let mut message =
            Vec::with_capacity(LEADING.len() + normalized_username.len() + MID.len() + NONCE_LEN);
        message.extend_from_slice(LEADING);
        message.extend_from_slice(&normalized_username);
        message.extend_from_slice(MID);
        message.extend_from_slice(&c_nonce);

        Ok(ClientFirstMessage {
            normalized_username,
            c_nonce,
            message,
        })
    }

    /// Reconstructs a message received over the wire (server role).
    pub fn parse(base64: &[u8]) -> Result<Self> {
        let message = base64::decode(base64).map_err(|_| Kind::Encoding)?;

        let min_len = LEADING.len() + 1 + MID.len() + NONCE_LEN;
        if message.len() < min_len {
            return Err(Kind::Length.into());
        }

        let mid_start = message.len() - NONCE_LEN - MID.len();
        if message[..LEADING.len()] != *LEADING || message[mid_start..mid_start + MID.len()] != *MID
        {
            return Err(Kind::Delimiter.into());
        }

        let normalized_username = message[LEADING.len()..mid_start].to_vec();
        let mut c_nonce = [0u8; NONCE_LEN];
        c_nonce.copy_from_slice(&message[mid_start + MID.len()..]);

        Ok(ClientFirstMessage {
            normalized_username,
            c_nonce,
            message,
        })
    }

    /// The normalized username carried by the message.
    pub fn normalized_username(&self) -> &[u8] {
        &self.normalized_username
    }

    /// The client nonce.
    pub fn c_nonce(&self) -> &[u8; NONCE_LEN] {
        &self.c_nonce
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
