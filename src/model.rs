//! Core domain types shared by the session layer and the order composer.
//!
//! Field names follow the backend's JSON (camelCase, Mongo-style `_id`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Amount;

/// Customer identifier.
pub type CustomerId = String;

/// Catalog dress identifier.
pub type DressId = String;

/// Discount identifier.
pub type DiscountId = String;

/// Address identifier.
pub type AddressId = String;

/// Order identifier as used in order URLs (the human-facing `orderID`).
pub type OrderId = String;

/// The authenticated admin, as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    pub fn display_name(&self) -> String {
        match (&self.firstname, &self.lastname) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.mobile.clone().unwrap_or_default(),
        }
    }
}

/// A shop customer an order is composed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "_id", alias = "id")]
    pub id: CustomerId,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Either a bare customer id or the populated customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomerRef {
    Populated(Customer),
    Id(CustomerId),
}

impl CustomerRef {
    pub fn id(&self) -> &str {
        match self {
            CustomerRef::Populated(customer) => &customer.id,
            CustomerRef::Id(id) => id,
        }
    }
}

/// Delivery address of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "_id")]
    pub id: AddressId,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pin_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub address_type: Option<String>,
}

/// A garment type from the backend catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dress {
    #[serde(rename = "_id")]
    pub id: DressId,
    #[serde(alias = "name")]
    pub dress_name: String,
    #[serde(alias = "price")]
    pub dress_price: Amount,
    #[serde(alias = "type", default)]
    pub dress_type: String,
}

/// A percentage discount offered by the shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    #[serde(rename = "_id")]
    pub id: DiscountId,
    pub discount_per: f64,
    #[serde(default)]
    pub discount_desc: Option<String>,
}

/// Which half of a garment a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementCategory {
    Top,
    Bottom,
}

/// The eleven measurements taken for every dress instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurementField {
    Neck,
    Bust,
    Waist,
    ArmHole,
    ShoulderW,
    ArmL,
    Hip,
    Thigh,
    Rise,
    Inseam,
    Outseam,
}

impl MeasurementField {
    pub const ALL: [MeasurementField; 11] = [
        MeasurementField::Neck,
        MeasurementField::Bust,
        MeasurementField::Waist,
        MeasurementField::ArmHole,
        MeasurementField::ShoulderW,
        MeasurementField::ArmL,
        MeasurementField::Hip,
        MeasurementField::Thigh,
        MeasurementField::Rise,
        MeasurementField::Inseam,
        MeasurementField::Outseam,
    ];

    /// The key used on the wire and in CSV headers.
    pub fn key(self) -> &'static str {
        match self {
            MeasurementField::Neck => "neck",
            MeasurementField::Bust => "bust",
            MeasurementField::Waist => "waist",
            MeasurementField::ArmHole => "armHole",
            MeasurementField::ShoulderW => "shoulderW",
            MeasurementField::ArmL => "armL",
            MeasurementField::Hip => "hip",
            MeasurementField::Thigh => "thigh",
            MeasurementField::Rise => "rise",
            MeasurementField::Inseam => "inseam",
            MeasurementField::Outseam => "outseam",
        }
    }

    pub fn category(self) -> MeasurementCategory {
        match self {
            MeasurementField::Neck
            | MeasurementField::Bust
            | MeasurementField::Waist
            | MeasurementField::ArmHole
            | MeasurementField::ShoulderW
            | MeasurementField::ArmL => MeasurementCategory::Top,
            _ => MeasurementCategory::Bottom,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MeasurementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MeasurementField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementField::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown measurement field '{s}'"))
    }
}

/// One measurement on the wire: `{"type": "Top", "val": "14"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementEntry {
    #[serde(rename = "type")]
    pub category: MeasurementCategory,
    pub val: String,
}

/// Text values for all eleven measurement fields, initialised empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Measurements([String; 11]);

impl Measurements {
    pub fn get(&self, field: MeasurementField) -> &str {
        &self.0[field.index()]
    }

    pub fn set(&mut self, field: MeasurementField, value: impl Into<String>) {
        self.0[field.index()] = value.into();
    }

    /// First field, in canonical order, whose value is blank.
    pub fn first_empty(&self) -> Option<MeasurementField> {
        MeasurementField::ALL
            .into_iter()
            .find(|field| self.get(*field).trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasurementField, &str)> + '_ {
        MeasurementField::ALL
            .into_iter()
            .map(move |field| (field, self.get(field)))
    }
}

impl Serialize for Measurements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(MeasurementField::ALL.len()))?;
        for (field, val) in self.iter() {
            let entry = MeasurementEntry {
                category: field.category(),
                val: val.to_string(),
            };
            map.serialize_entry(field.key(), &entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Measurements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, MeasurementEntry>::deserialize(deserializer)?;
        let mut measurements = Measurements::default();
        for (key, entry) in raw {
            // Unknown keys from older records are dropped.
            if let Ok(field) = key.parse::<MeasurementField>() {
                measurements.set(field, entry.val);
            }
        }
        Ok(measurements)
    }
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// Workshop progress of one dress within an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DressStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "fabric picked")]
    FabricPicked,
    #[serde(rename = "cutting")]
    Cutting,
    #[serde(rename = "top stitch")]
    TopStitch,
    #[serde(rename = "bottom stitch")]
    BottomStitch,
    #[serde(rename = "hemming")]
    Hemming,
    #[serde(rename = "stitched")]
    Stitched,
}

/// Row of an order listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "orderID")]
    pub order_id: OrderId,
    #[serde(rename = "userId", default)]
    pub customer: Option<CustomerRef>,
    pub status: OrderStatus,
    #[serde(default)]
    pub dress_count: Option<u32>,
    #[serde(default)]
    pub amount_before_discount: Option<Amount>,
    #[serde(default)]
    pub amount_after_discount: Option<Amount>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl OrderSummary {
    /// Amount shown in listings: after-discount when known.
    pub fn payable(&self) -> Amount {
        self.amount_after_discount
            .or(self.amount_before_discount)
            .unwrap_or_default()
    }
}

/// A dress as stored on a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedDress {
    #[serde(rename = "_id")]
    pub id: String,
    pub dress_name: String,
    #[serde(default)]
    pub dress_type: String,
    pub dress_price: Amount,
    #[serde(default)]
    pub dress_status: DressStatus,
    #[serde(default)]
    pub measurements: Option<Measurements>,
}

/// Full order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "orderID")]
    pub order_id: OrderId,
    #[serde(rename = "userId", default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub dresses: Vec<OrderedDress>,
    pub status: OrderStatus,
    #[serde(default)]
    pub amount_before_discount: Amount,
    #[serde(default)]
    pub amount_after_discount: Amount,
    #[serde(default)]
    pub extra_charges: Amount,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Per-dress status change inside an [`OrderUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DressStatusUpdate {
    #[serde(rename = "_id")]
    pub id: String,
    pub dress_status: DressStatus,
}

/// Partial update of a placed order; unset fields are left alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_charges: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dresses: Option<Vec<DressStatusUpdate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
