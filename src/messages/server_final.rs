use crate::credentials::UserCredentials;
use crate::error::{Error, Kind, Result};
use crate::messages::ClientFinalMessage;
use crate::utils;
use crate::{KEY_LEN, TOKEN_LEN};

/// Total length of the success form.
const MESSAGE_LEN: usize = 63;
const COMMA_POS: usize = 32;
const TOKEN_START: usize = 33;

/// The "server-final" message closing a successful exchange, or a
/// "server-error" payload.
///
/// ```text
/// SERVER_SIG   = HMAC(SERVER_KEY, AUTH_MESSAGE)
/// SERVER_FINAL = SERVER_SIG[32] + "," + TOKEN[30]
/// SERVER_ERROR = "e=" + REASON
/// ```
///
/// The signature proves to the client that the server holds the server key;
/// the token identifies the authenticated session from here on.
#[derive(Clone, Debug)]
pub struct ServerFinalMessage {
    server_signature: [u8; KEY_LEN],
    token: Option<String>,
    error: Option<String>,
    message: Vec<u8>,
}

impl ServerFinalMessage {
    /// Signs the auth message of a verified client-final and embeds the
    /// session token (server role).
    pub fn new(
        client_final: &ClientFinalMessage,
        credentials: &UserCredentials,
        token: &str,
    ) -> Result<Self> {
        if token.len() != TOKEN_LEN || !token.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidArgument("token must be 30 alphanumeric characters"));
        }

        let server_signature =
            utils::hmac_sha256(credentials.server_key(), client_final.auth_message());

        let mut message = Vec::with_capacity(MESSAGE_LEN);
        message.extend_from_slice(&server_signature);
        message.push(b',');
        message.extend_from_slice(token.as_bytes());
        debug_assert_eq!(message.len(), MESSAGE_LEN);

        Ok(ServerFinalMessage {
            server_signature,
            token: Some(token.to_owned()),
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

        Ok(ServerFinalMessage {
            server_signature: [0; KEY_LEN],
            token: None,
            error: Some(reason.to_owned()),
            message,
        })
    }

    /// Reconstructs a message received over the wire (client role).
    ///
    /// Checks the fixed layout only; callers match the extracted signature
    /// against their own expectation to validate the server.
    pub fn parse(base64: &[u8]) -> Result<Self> {
        let message = base64::decode(base64).map_err(|_| Kind::Encoding)?;

        if message.len() > 2 && message[..2] == *b"e=" {
            let reason =
                String::from_utf8(message[2..].to_vec()).map_err(|_| Kind::Encoding)?;
            return Ok(ServerFinalMessage {
                server_signature: [0; KEY_LEN],
                token: None,
                error: Some(reason),
                message,
            });
        }

        if message.len() != MESSAGE_LEN {
            return Err(Kind::Length.into());
        }
        if message[COMMA_POS] != b',' {
            return Err(Kind::Delimiter.into());
        }

        let mut server_signature = [0u8; KEY_LEN];
        server_signature.copy_from_slice(&message[..KEY_LEN]);
        let token = std::str::from_utf8(&message[TOKEN_START..])
            .map_err(|_| Kind::Encoding)?
            .to_owned();

        Ok(ServerFinalMessage {
            server_signature,
            token: Some(token),
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

    /// The signature over the auth message.
    pub fn server_signature(&self) -> &[u8; KEY_LEN] {
        &self.server_signature
    }

    /// The session token, absent on an error payload.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientFirstMessage, ServerFirstMessage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn verified_exchange() -> (ClientFinalMessage, UserCredentials, String) {
        let mut rng = StdRng::seed_from_u64(4);
        let credentials =
            UserCredentials::from_password("user", "alice", "pw", 4096, &mut rng).unwrap();
        let client_first = ClientFirstMessage::new("alice", &mut rng).unwrap();
        let server_first = ServerFirstMessage::new(&client_first, &credentials, &mut rng).unwrap();
        let token = server_first.token().unwrap().to_owned();
        let client_final = ClientFinalMessage::new("pw", &client_first, &server_first).unwrap();
        (client_final, credentials, token)
    }

    #[test]
    fn layout_matches_the_wire_format() {
        let (client_final, credentials, token) = verified_exchange();
        let msg = ServerFinalMessage::new(&client_final, &credentials, &token).unwrap();
        let bytes = msg.as_bytes();

        assert_eq!(bytes.len(), 63);
        assert_eq!(&bytes[..32], &msg.server_signature()[..]);
        assert_eq!(bytes[32], b',');
        assert_eq!(&bytes[33..], token.as_bytes());
        assert_eq!(
            msg.server_signature(),
            &utils::hmac_sha256(credentials.server_key(), client_final.auth_message())
        );
    }

    #[test]
    fn round_trips_through_base64() {
        let (client_final, credentials, token) = verified_exchange();
        let msg = ServerFinalMessage::new(&client_final, &credentials, &token).unwrap();
        let recovered = ServerFinalMessage::parse(msg.to_base64().as_bytes()).unwrap();

        assert_eq!(recovered.server_signature(), msg.server_signature());
        assert_eq!(recovered.token(), Some(token.as_str()));
        assert_eq!(recovered.as_bytes(), msg.as_bytes());
    }

    #[test]
    fn rejects_bad_tokens_at_construction() {
        let (client_final, credentials, _) = verified_exchange();
        assert!(ServerFinalMessage::new(&client_final, &credentials, "short").is_err());
        assert!(
            ServerFinalMessage::new(&client_final, &credentials, &"_".repeat(30)).is_err()
        );
    }

    #[test]
    fn parse_rejects_wrong_length_and_delimiter() {
        let (client_final, credentials, token) = verified_exchange();
        let msg = ServerFinalMessage::new(&client_final, &credentials, &token).unwrap();

        let truncated = base64::encode(&msg.as_bytes()[..62]);
        assert_eq!(
            ServerFinalMessage::parse(truncated.as_bytes()).unwrap_err(),
            Error::Malformed(Kind::Length)
        );

        let mut tampered = msg.as_bytes().to_vec();
        tampered[COMMA_POS] = b'x';
        assert_eq!(
            ServerFinalMessage::parse(base64::encode(&tampered).as_bytes()).unwrap_err(),
            Error::Malformed(Kind::Delimiter)
        );
    }

    #[test]
    fn error_payload_carries_its_reason() {
        let msg = ServerFinalMessage::error("authentication-failed").unwrap();
        assert_eq!(msg.as_bytes(), b"e=authentication-failed");

        let recovered = ServerFinalMessage::parse(msg.to_base64().as_bytes()).unwrap();
        assert!(recovered.is_error());
        assert_eq!(recovered.error_reason(), Some("authentication-failed"));
        assert_eq!(recovered.token(), None);
    }
}
