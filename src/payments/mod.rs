//! Payment orchestration.
//!
//! Managers sequence processor and store calls for each operation. They get
//! their collaborators explicitly, so tests can hand them fakes.

use std::future::Future;

use crate::error::{RelayError, Result};

mod cards;
mod charge;
mod customer;
pub mod idempotency;
pub mod validation;

pub use cards::{CardManager, SaveCard};
pub use charge::{ChargeManager, ChargeRequest};
pub use customer::{CustomerManager, EnsureCustomer};

/// Write a record that mirrors a processor resource we already created.
///
/// `Conflict` is handed back untouched for the caller to resolve. Any other
/// failure is retried once; if that fails too the processor resource is
/// orphaned and logged for reconciliation.
pub(crate) async fn persist_or_reconcile<T, F, Fut>(
    operation: &'static str,
    processor_id: &str,
    mut write: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match write().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_conflict() => return Err(err),
        Err(err) => {
            tracing::warn!(
                operation = operation,
                processor_id = %processor_id,
                error = %err,
                "Store write failed, retrying once"
            );
        }
    }

    match write().await {
        Ok(value) => Ok(value),
        Err(err) if err.is_conflict() => Err(err),
        Err(err) => {
            tracing::error!(
                reconcile = true,
                operation = operation,
                processor_id = %processor_id,
                error = %err,
                "Processor resource created but not recorded"
            );
            Err(RelayError::internal(format!(
                "{operation}: failed to record processor resource {processor_id}: {err}"
            )))
        }
    }
}
