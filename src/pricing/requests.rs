//! Request DTOs for pricing API endpoints.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::error::PricingError;
use super::models::{normalize_options, parse_quantity, CustomerContact, ProductRef};
use super::services::{CheckoutDetails, LineChanges, NewLine};

/// Request to check a ZIP code
#[derive(Debug, Deserialize)]
pub struct ZipCheckRequest {
    pub zip_code: String,
}

/// Request for the distance between two ZIPs
#[derive(Debug, Deserialize)]
pub struct DistanceRequest {
    pub from_zip: String,
    pub to_zip: String,
}

/// Request to start a cart
#[derive(Debug, Default, Deserialize)]
pub struct CreateCartRequest {
    #[serde(default)]
    pub zip_code: Option<String>,
}

/// Request to reprice an order
#[derive(Debug, Default, Deserialize)]
pub struct QuoteRequest {
    /// Skip location lookup and price at this many miles
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub distance_override: Option<Decimal>,
}

/// Request to add a line to a cart
#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub pool_package_id: Option<Uuid>,
    #[serde(default)]
    pub equipment_item_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub install_selected: bool,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

fn default_quantity() -> i64 {
    1
}

impl TryFrom<AddLineRequest> for NewLine {
    type Error = PricingError;

    fn try_from(req: AddLineRequest) -> Result<Self, Self::Error> {
        let product = match (req.pool_package_id, req.equipment_item_id) {
            (Some(id), None) => ProductRef::Package(id),
            (None, Some(id)) => ProductRef::Equipment(id),
            (Some(_), Some(_)) => {
                return Err(PricingError::invalid_input(
                    "product",
                    "give either pool_package_id or equipment_item_id, not both",
                ))
            }
            (None, None) => {
                return Err(PricingError::invalid_input(
                    "product",
                    "either pool_package_id or equipment_item_id is required",
                ))
            }
        };

        Ok(NewLine {
            zip_code: req.zip_code,
            product,
            quantity: parse_quantity(req.quantity)?,
            install_selected: req.install_selected,
            options: req.options.map(normalize_options).transpose()?,
        })
    }
}

/// Request to change a cart line
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLineRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub install_selected: Option<bool>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

impl TryFrom<UpdateLineRequest> for LineChanges {
    type Error = PricingError;

    fn try_from(req: UpdateLineRequest) -> Result<Self, Self::Error> {
        Ok(LineChanges {
            quantity: req.quantity.map(parse_quantity).transpose()?,
            install_selected: req.install_selected,
            options: req.options.map(normalize_options).transpose()?,
        })
    }
}

/// Request to move a cart to another ZIP
#[derive(Debug, Deserialize)]
pub struct UpdateZipRequest {
    pub zip_code: String,
}

/// Request to check out a cart
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub zip_code: String,
    #[serde(default)]
    pub install_disclaimer_accepted: bool,
}

impl From<CheckoutRequest> for CheckoutDetails {
    fn from(req: CheckoutRequest) -> Self {
        CheckoutDetails {
            contact: CustomerContact {
                full_name: req.full_name,
                email: req.email,
                phone: req.phone,
            },
            zip_code: req.zip_code,
            install_disclaimer_accepted: req.install_disclaimer_accepted,
        }
    }
}
