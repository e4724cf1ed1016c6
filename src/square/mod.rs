//! Square processor client.
//!
//! [`PaymentProcessor`] is the seam the payment managers depend on;
//! [`SquareClient`] is the live implementation over the Connect v2 REST API.

mod client;
mod live_client;
mod types;

pub use client::{
    CreateCard, CreateCustomer, PaymentProcessor, ProcessorReadiness, StoredCardCharge,
    TokenCharge,
};
pub use live_client::SquareClient;
pub use types::{Address, Card, Customer, Money, Payment, PaymentStatus};

/// Short, log-safe prefix of a card token or nonce.
pub(crate) fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}
