//! Backoff for model calls
//!
//! The scheduler itself lives with the corpus client; model errors plug into
//! it through [`Recoverable`].

use crate::error::ModelError;
pub use alvara_retrieval::retry::{Recoverable, RetryPolicy, RetryScheduler};

impl Recoverable for ModelError {
    fn is_recoverable(&self) -> bool {
        ModelError::is_recoverable(self)
    }
}
