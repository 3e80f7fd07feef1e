//! Error types for draft reduction and validation.

use thiserror::Error;

use super::InstanceId;
use crate::Amount;
use crate::model::{CustomerId, DiscountId, DressId, MeasurementField};

/// Error returned by [`OrderDraft::apply`](super::OrderDraft::apply).
///
/// An action that fails leaves the draft exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error("dress {0} is not in the catalog")]
    UnknownDress(DressId),

    #[error("dress {0} has no units in the draft")]
    NotInDraft(DressId),

    #[error("line item {0} not found")]
    UnknownInstance(InstanceId),

    #[error("discount {0} is not offered")]
    UnknownDiscount(DiscountId),

    #[error("catalog for customer {got} arrived after switching to {expected:?}")]
    StaleContext {
        expected: Option<CustomerId>,
        got: CustomerId,
    },

    #[error("extra charges cannot be negative: {0}")]
    NegativeExtraCharges(Amount),

    #[error("dress {dress} has a negative price: {price}")]
    NegativePrice { dress: DressId, price: Amount },
}

/// First reason a draft cannot be submitted. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please select a customer")]
    NoCustomer,

    #[error("please add at least one dress")]
    EmptyOrder,

    #[error("please upload an image for {dress} (item {position})")]
    MissingImage { position: usize, dress: String },

    #[error("please fill {field} for {dress} (item {position})")]
    MissingMeasurement {
        position: usize,
        dress: String,
        field: MeasurementField,
    },

    #[error("{field} for {dress} (item {position}) must be a number, got '{value}'")]
    InvalidMeasurement {
        position: usize,
        dress: String,
        field: MeasurementField,
        value: String,
    },
}
