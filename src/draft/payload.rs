//! Wire form of a validated draft: `orderData` metadata plus positional
//! `dressImages` attachments.

use serde::Serialize;

use super::Attachment;
use crate::Amount;
use crate::model::{AddressId, CustomerId, DiscountId, DressId, DressStatus, Measurements};

/// One dress of the order metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DressPayload {
    pub dress_id: DressId,
    pub dress_name: String,
    pub dress_price: Amount,
    pub dress_type: String,
    pub dress_status: DressStatus,
    pub measurements: Measurements,
}

/// The `orderData` JSON document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub user_id: CustomerId,
    pub address_id: Option<AddressId>,
    pub dresses: Vec<DressPayload>,
    pub amount_before_discount: Amount,
    pub amount_after_discount: Amount,
    pub extra_charges: Amount,
    pub remarks: String,
    pub discount_id: Option<DiscountId>,
}

/// Everything needed for the create-order request.
///
/// `images[i]` belongs to `payload.dresses[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSubmission {
    pub payload: OrderPayload,
    pub images: Vec<Attachment>,
}
