//! The four wire messages of the exchange. Each type both constructs a
//! message from protocol inputs and parses one received as transport base64,
//! validating the fixed byte layout and, where applicable, re-deriving and
//! comparing its cryptographic fields.

mod client_final;
mod client_first;
mod server_final;
mod server_first;

pub use client_final::ClientFinalMessage;
pub use client_first::ClientFirstMessage;
pub use server_final::ServerFinalMessage;
pub use server_first::ServerFirstMessage;
