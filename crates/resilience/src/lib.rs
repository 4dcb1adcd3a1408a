//! Resilient invocation of external calls (Component G): a per-resource circuit
//! breaker composed with classified exponential-backoff retry.

mod circuit;
mod error;
mod invoker;
mod retry;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::InvokeError;
pub use invoker::{CircuitBreakerRegistry, ResilientInvoker};
pub use retry::{retry, RetryOutcome, RetryPolicy};
