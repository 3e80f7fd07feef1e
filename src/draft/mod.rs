//! Order draft state machine.
//!
//! The draft accumulates dress instances for one customer, each with its
//! own measurements and image. Every UI event is a [`DraftAction`] applied
//! through [`OrderDraft::apply`]; pricing is derived on read so stored and
//! displayed totals cannot drift apart.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::Amount;
use crate::model::{
    Address, Customer, CustomerId, Discount, DiscountId, Dress, DressId, DressStatus,
    MeasurementField,
};

mod state;
pub use state::{Attachment, InstanceId, LineItem, Totals};

mod error;
pub use error::{DraftError, ValidationError};

mod payload;
pub use payload::{DressPayload, OrderPayload, OrderSubmission};

/// A single event of the create-order workflow.
#[derive(Debug, Clone)]
pub enum DraftAction {
    /// Start a fresh draft for this customer.
    SelectCustomer(Customer),
    /// Address and catalog fetched for `customer`.
    LoadContext {
        customer: CustomerId,
        address: Option<Address>,
        dresses: Vec<Dress>,
        discounts: Vec<Discount>,
    },
    IncreaseQuantity(DressId),
    DecreaseQuantity(DressId),
    SetImage {
        instance: InstanceId,
        image: Option<Attachment>,
    },
    SetMeasurement {
        instance: InstanceId,
        field: MeasurementField,
        value: String,
    },
    ApplyDiscount(Option<DiscountId>),
    SetExtraCharges(Amount),
    SetRemarks(String),
    Reset,
}

impl DraftAction {
    fn name(&self) -> &'static str {
        match self {
            DraftAction::SelectCustomer(_) => "select customer",
            DraftAction::LoadContext { .. } => "load context",
            DraftAction::IncreaseQuantity(_) => "increase quantity",
            DraftAction::DecreaseQuantity(_) => "decrease quantity",
            DraftAction::SetImage { .. } => "set image",
            DraftAction::SetMeasurement { .. } => "set measurement",
            DraftAction::ApplyDiscount(_) => "apply discount",
            DraftAction::SetExtraCharges(_) => "set extra charges",
            DraftAction::SetRemarks(_) => "set remarks",
            DraftAction::Reset => "reset",
        }
    }
}

/// The in-progress, unsubmitted order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderDraft {
    customer: Option<Customer>,
    address: Option<Address>,
    /// Catalog loaded for the current customer
    dresses: Vec<Dress>,
    discounts: Vec<Discount>,
    line_items: Vec<LineItem>,
    next_instance: u64,
    extra_charges: Amount,
    discount: Option<Discount>,
    remarks: String,
}

/// Apply `action` to `draft` and return the resulting draft.
///
/// Failed actions return the draft unchanged.
pub fn reduce(mut draft: OrderDraft, action: DraftAction) -> OrderDraft {
    let _ = draft.apply(action);
    draft
}

/// Public API
impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single action on top of the current draft.
    pub fn apply(&mut self, action: DraftAction) -> Result<(), DraftError> {
        let name = action.name();
        let result = match action {
            DraftAction::SelectCustomer(customer) => {
                self.select_customer(customer);
                Ok(())
            }
            DraftAction::LoadContext {
                customer,
                address,
                dresses,
                discounts,
            } => self.load_context(customer, address, dresses, discounts),
            DraftAction::IncreaseQuantity(dress) => self.increase(&dress),
            DraftAction::DecreaseQuantity(dress) => self.decrease(&dress),
            DraftAction::SetImage { instance, image } => self.set_image(instance, image),
            DraftAction::SetMeasurement {
                instance,
                field,
                value,
            } => self.set_measurement(instance, field, value),
            DraftAction::ApplyDiscount(discount) => self.apply_discount(discount),
            DraftAction::SetExtraCharges(amount) => self.set_extra_charges(amount),
            DraftAction::SetRemarks(remarks) => {
                self.remarks = remarks;
                Ok(())
            }
            DraftAction::Reset => {
                *self = Self::default();
                Ok(())
            }
        };
        match &result {
            Ok(()) => debug!(items = self.line_items.len(), "{name} applied"),
            Err(e) => info!(reason = %e, "{name} skipped"),
        }
        result
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.as_ref()
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn dresses(&self) -> &[Dress] {
        &self.dresses
    }

    pub fn discounts(&self) -> &[Discount] {
        &self.discounts
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn line_item(&self, instance: InstanceId) -> Option<&LineItem> {
        self.line_items.iter().find(|i| i.instance_id == instance)
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }

    /// Units of `dress` currently in the draft.
    pub fn quantity(&self, dress: &str) -> usize {
        self.line_items.iter().filter(|i| i.dress.id == dress).count()
    }

    /// Units per dress, for every dress with at least one unit.
    pub fn quantities(&self) -> BTreeMap<DressId, usize> {
        let mut quantities = BTreeMap::new();
        for item in &self.line_items {
            *quantities.entry(item.dress.id.clone()).or_insert(0) += 1;
        }
        quantities
    }

    pub fn extra_charges(&self) -> Amount {
        self.extra_charges
    }

    pub fn selected_discount(&self) -> Option<&Discount> {
        self.discount.as_ref()
    }

    pub fn remarks(&self) -> &str {
        &self.remarks
    }

    /// Sum of the catalog prices of all line items.
    pub fn base_total(&self) -> Amount {
        self.line_items.iter().map(|i| i.dress.dress_price).sum()
    }

    /// Pricing for display and submission.
    ///
    /// The discount applies to `base_total + extra_charges`.
    pub fn totals(&self) -> Totals {
        let base_total = self.base_total();
        let before_discount = base_total + self.extra_charges;
        let discount_percent = self.discount.as_ref().map(|d| d.discount_per);
        let after_discount = match discount_percent {
            Some(percent) => before_discount.saturating_sub(before_discount.percent(percent)),
            None => before_discount,
        };
        Totals {
            base_total,
            extra_charges: self.extra_charges,
            discount_percent,
            before_discount,
            after_discount,
        }
    }

    /// Check the draft is complete, reporting the first gap:
    /// - A customer is selected and at least one dress is added
    /// - Every line item has an image
    /// - Every line item has all eleven measurements, each a number
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer.is_none() {
            return Err(ValidationError::NoCustomer);
        }
        if self.line_items.is_empty() {
            return Err(ValidationError::EmptyOrder);
        }

        for (idx, item) in self.line_items.iter().enumerate() {
            let position = idx + 1;
            let dress = &item.dress.dress_name;

            if item.image.is_none() {
                return Err(ValidationError::MissingImage {
                    position,
                    dress: dress.clone(),
                });
            }

            for (field, value) in item.measurements.iter() {
                let value = value.trim();
                if value.is_empty() {
                    return Err(ValidationError::MissingMeasurement {
                        position,
                        dress: dress.clone(),
                        field,
                    });
                }
                let numeric = value
                    .parse::<f64>()
                    .is_ok_and(|v| v.is_finite() && v >= 0.0);
                if !numeric {
                    return Err(ValidationError::InvalidMeasurement {
                        position,
                        dress: dress.clone(),
                        field,
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate and convert the draft into its wire form.
    pub fn to_submission(&self) -> Result<OrderSubmission, ValidationError> {
        self.validate()?;

        let customer = self.customer.as_ref().ok_or(ValidationError::NoCustomer)?;
        let totals = self.totals();

        let mut dresses = Vec::with_capacity(self.line_items.len());
        let mut images = Vec::with_capacity(self.line_items.len());
        for item in &self.line_items {
            dresses.push(DressPayload {
                dress_id: item.dress.id.clone(),
                dress_name: item.dress.dress_name.clone(),
                dress_price: item.dress.dress_price,
                dress_type: item.dress.dress_type.clone(),
                dress_status: DressStatus::default(),
                measurements: item.measurements.clone(),
            });
            // validate() guarantees every image is present
            if let Some(image) = &item.image {
                images.push(image.clone());
            }
        }

        Ok(OrderSubmission {
            payload: OrderPayload {
                user_id: customer.id.clone(),
                address_id: self.address.as_ref().map(|a| a.id.clone()),
                dresses,
                amount_before_discount: totals.before_discount,
                amount_after_discount: totals.after_discount,
                extra_charges: totals.extra_charges,
                remarks: self.remarks.clone(),
                discount_id: self.discount.as_ref().map(|d| d.id.clone()),
            },
            images,
        })
    }
}

/// Private API
impl OrderDraft {
    /// A new customer starts a brand-new draft; nothing carries over.
    fn select_customer(&mut self, customer: Customer) {
        *self = Self {
            customer: Some(customer),
            ..Self::default()
        };
    }

    /// Install address and catalog, unless they belong to a customer that is
    /// no longer selected or a dress is priced below zero.
    fn load_context(
        &mut self,
        customer: CustomerId,
        address: Option<Address>,
        dresses: Vec<Dress>,
        discounts: Vec<Discount>,
    ) -> Result<(), DraftError> {
        let current = self.customer.as_ref().map(|c| c.id.clone());
        if current.as_deref() != Some(customer.as_str()) {
            return Err(DraftError::StaleContext {
                expected: current,
                got: customer,
            });
        }
        if let Some(dress) = dresses.iter().find(|d| d.dress_price.is_negative()) {
            return Err(DraftError::NegativePrice {
                dress: dress.id.clone(),
                price: dress.dress_price,
            });
        }

        self.address = address;
        self.dresses = dresses;
        self.discounts = discounts;

        // A refreshed discount list may no longer offer the selection
        let still_offered = self
            .discount
            .as_ref()
            .is_none_or(|selected| self.discounts.iter().any(|d| d.id == selected.id));
        if !still_offered {
            self.discount = None;
        }
        Ok(())
    }

    /// Append a new instance of a catalog dress.
    fn increase(&mut self, dress: &str) -> Result<(), DraftError> {
        let dress = self
            .dresses
            .iter()
            .find(|d| d.id == dress)
            .cloned()
            .ok_or_else(|| DraftError::UnknownDress(dress.to_string()))?;

        let instance_id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.line_items.push(LineItem::new(instance_id, dress));
        Ok(())
    }

    /// Remove the most recently added instance of a dress, along with its
    /// image and measurements.
    fn decrease(&mut self, dress: &str) -> Result<(), DraftError> {
        let idx = self
            .line_items
            .iter()
            .rposition(|i| i.dress.id == dress)
            .ok_or_else(|| DraftError::NotInDraft(dress.to_string()))?;
        self.line_items.remove(idx);
        Ok(())
    }

    fn item_mut(&mut self, instance: InstanceId) -> Result<&mut LineItem, DraftError> {
        self.line_items
            .iter_mut()
            .find(|i| i.instance_id == instance)
            .ok_or(DraftError::UnknownInstance(instance))
    }

    fn set_image(
        &mut self,
        instance: InstanceId,
        image: Option<Attachment>,
    ) -> Result<(), DraftError> {
        self.item_mut(instance)?.image = image;
        Ok(())
    }

    fn set_measurement(
        &mut self,
        instance: InstanceId,
        field: MeasurementField,
        value: String,
    ) -> Result<(), DraftError> {
        self.item_mut(instance)?.measurements.set(field, value);
        Ok(())
    }

    fn apply_discount(&mut self, discount: Option<DiscountId>) -> Result<(), DraftError> {
        self.discount = match discount {
            None => None,
            Some(id) => Some(
                self.discounts
                    .iter()
                    .find(|d| d.id == id)
                    .cloned()
                    .ok_or(DraftError::UnknownDiscount(id))?,
            ),
        };
        Ok(())
    }

    fn set_extra_charges(&mut self, amount: Amount) -> Result<(), DraftError> {
        if amount.is_negative() {
            return Err(DraftError::NegativeExtraCharges(amount));
        }
        self.extra_charges = amount;
        Ok(())
    }
}
