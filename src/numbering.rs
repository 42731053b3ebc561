//! Contract numbering.
//!
//! Contracts of a numbered type get `<TYPE><n>` where `n` comes from a
//! per-type counter, zero-padded to two digits (`ABS01`, `ABS02`, ...,
//! `ABS100`). Every generation consumes a number, so gaps appear when a later
//! step fails; numbers are never reused.

use std::sync::Arc;

use thiserror::Error;

use crate::db::{CounterStore, StoreError};

/// Contract types that receive generated numbers.
pub const NUMBERED_CONTRACT_TYPES: [&str; 3] = ["ABS", "DMR", "SIP"];

#[derive(Debug, Error)]
pub enum NumberingError {
    #[error("contract type `{0}` does not use generated numbers")]
    NotNumbered(String),
    #[error("contract numbering is unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

#[derive(Clone)]
pub struct ContractNumberingService {
    store: Arc<dyn CounterStore>,
    allow_list: Vec<String>,
}

impl ContractNumberingService {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_allow_list(store, NUMBERED_CONTRACT_TYPES)
    }

    pub fn with_allow_list<I, S>(store: Arc<dyn CounterStore>, allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            allow_list: allow_list.into_iter().map(Into::into).collect(),
        }
    }

    pub fn requires_number(&self, contract_type: &str) -> bool {
        self.allow_list.iter().any(|t| t == contract_type)
    }

    /// Consume the next number for `contract_type`.
    pub async fn next(&self, contract_type: &str) -> Result<String, NumberingError> {
        if !self.requires_number(contract_type) {
            return Err(NumberingError::NotNumbered(contract_type.to_string()));
        }

        let number = self.store.increment(contract_type).await.map_err(|e| {
            log::error!("Counter increment for {} failed: {}", contract_type, e);
            NumberingError::Unavailable(e)
        })?;

        let formatted = format!("{contract_type}{number:02}");
        log::info!("Assigned contract number {}", formatted);
        Ok(formatted)
    }

    /// The number to print on a contract: a generated one for numbered types,
    /// the code itself otherwise.
    pub async fn contract_number(&self, contract_type: &str) -> Result<String, NumberingError> {
        if self.requires_number(contract_type) {
            self.next(contract_type).await
        } else {
            Ok(contract_type.to_string())
        }
    }
}
