//! HTTP surface of the relay.
//!
//! Handlers only translate JSON to manager calls and back; validation and
//! sequencing live in [`crate::payments`].

mod cards;
mod customers;
mod payments;
mod root;

pub use cards::{CardListResponse, CardRoutes, CreateCardBody, DeleteCardResponse, OwnerQuery};
pub use customers::{CustomerRoutes, EnsureCustomerBody, EnsureCustomerResponse};
pub use payments::{
    ChargeOutcome, PaymentBody, PaymentResponse, PaymentRoutes, StoredChargeBody,
    StoredChargeResponse,
};
pub use root::RootRoutes;
