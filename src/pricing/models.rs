//! Domain and database models for order pricing.
//!
//! Reference data (locations, service areas, catalog products) is read-only to
//! the pricing engine. Orders and their lines carry the computed amounts.
//! Row types use sqlx's FromRow derive and are converted into domain types
//! with `TryFrom`, which is where the "exactly one product" rule is enforced.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::error::PricingError;

/// ZIP code reference data from store_zip_locations
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Location {
    pub id: Uuid,
    pub zip_code: String,
    pub city: String,
    pub county: String,
    pub state: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_area_id: Option<Uuid>,
    pub install_allowed: bool,
}

impl Location {
    /// (latitude, longitude), or `None` if either is missing
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Which permit schedule and install permission applies to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
    Pool,
    Accessory,
}

/// Billing/permitting region (a county or group of counties)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ServiceArea {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub allow_pool_installs: bool,
    pub allow_accessory_installs: bool,
    pub permit_pool_fee_base: Decimal,
    pub permit_accessory_fee_base: Decimal,
    pub permit_pool_labor_hours: Decimal,
    pub permit_accessory_labor_hours: Decimal,
}

impl ServiceArea {
    /// (base fee, labor hours) for the given install kind
    pub fn permit_schedule(&self, kind: InstallKind) -> (Decimal, Decimal) {
        match kind {
            InstallKind::Pool => (self.permit_pool_fee_base, self.permit_pool_labor_hours),
            InstallKind::Accessory => (
                self.permit_accessory_fee_base,
                self.permit_accessory_labor_hours,
            ),
        }
    }

    pub fn allows_install(&self, kind: InstallKind) -> bool {
        match kind {
            InstallKind::Pool => self.allow_pool_installs,
            InstallKind::Accessory => self.allow_accessory_installs,
        }
    }
}

/// Shipping rule attached to a product
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ShippingProfile {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub base_flat_rate: Decimal,
    pub per_mile_rate: Decimal,
    pub free_with_install: bool,
}

/// Install labor pricing.
///
/// `rate` is a flat base rate for equipment and a daily rate for packages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallProfile {
    pub rate: Decimal,
    pub included_miles: Decimal,
    pub per_mile_rate: Decimal,
}

/// Pool package (bundled product with day-based install labor)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolPackage {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub install_days: Decimal,
    pub install: Option<InstallProfile>,
    pub shipping: Option<ShippingProfile>,
}

/// Equipment or accessory item (base + mileage install labor)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentItem {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub install: Option<InstallProfile>,
    pub shipping: Option<ShippingProfile>,
}

/// A sellable unit priced per order line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Priceable {
    Package(PoolPackage),
    Equipment(EquipmentItem),
}

impl Priceable {
    pub fn product_ref(&self) -> ProductRef {
        match self {
            Priceable::Package(p) => ProductRef::Package(p.id),
            Priceable::Equipment(e) => ProductRef::Equipment(e.id),
        }
    }

    /// Current catalog price
    pub fn price(&self) -> Decimal {
        match self {
            Priceable::Package(p) => p.price,
            Priceable::Equipment(e) => e.price,
        }
    }

    pub fn shipping(&self) -> Option<&ShippingProfile> {
        match self {
            Priceable::Package(p) => p.shipping.as_ref(),
            Priceable::Equipment(e) => e.shipping.as_ref(),
        }
    }

    pub fn install(&self) -> Option<&InstallProfile> {
        match self {
            Priceable::Package(p) => p.install.as_ref(),
            Priceable::Equipment(e) => e.install.as_ref(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Priceable::Package(p) => &p.name,
            Priceable::Equipment(e) => &e.name,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Priceable::Package(p) => p.is_active,
            Priceable::Equipment(e) => e.is_active,
        }
    }
}

/// Reference from an order line to exactly one catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    Package(Uuid),
    Equipment(Uuid),
}

impl ProductRef {
    pub fn install_kind(&self) -> InstallKind {
        match self {
            ProductRef::Package(_) => InstallKind::Pool,
            ProductRef::Equipment(_) => InstallKind::Accessory,
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductRef::Package(id) => write!(f, "package:{}", id),
            ProductRef::Equipment(id) => write!(f, "equipment:{}", id),
        }
    }
}

/// Largest quantity a line can hold; quantities are stored as INTEGER.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// Validate a raw quantity from the outside world.
pub fn parse_quantity(raw: i64) -> Result<u32, PricingError> {
    if raw < 1 {
        return Err(PricingError::invalid_input(
            "quantity",
            format!("must be at least 1, got {}", raw),
        ));
    }
    u32::try_from(raw)
        .ok()
        .filter(|quantity| *quantity <= MAX_QUANTITY)
        .ok_or_else(|| {
            PricingError::invalid_input(
                "quantity",
                format!("must be at most {}, got {}", MAX_QUANTITY, raw),
            )
        })
}

/// Validate a line options payload.
///
/// The payload must be a JSON object. A `selected_components` key, when
/// present, must be an array; its entries are normalized to
/// `{"component_id", "quantity"}` with quantity at least 1, and entries
/// without an integer `component_id` are dropped. Other keys pass through.
pub fn normalize_options(options: serde_json::Value) -> Result<serde_json::Value, PricingError> {
    use serde_json::{json, Value};

    let Value::Object(mut map) = options else {
        return Err(PricingError::invalid_input("options", "must be a JSON object"));
    };

    if let Some(selected) = map.remove("selected_components") {
        let Value::Array(entries) = selected else {
            return Err(PricingError::invalid_input(
                "options",
                "selected_components must be an array",
            ));
        };
        let normalized: Vec<Value> = entries
            .iter()
            .filter_map(|entry| {
                let component_id = entry.get("component_id").and_then(json_int)?;
                let quantity = entry
                    .get("quantity")
                    .and_then(json_int)
                    .unwrap_or(1)
                    .max(1);
                Some(json!({ "component_id": component_id, "quantity": quantity }))
            })
            .collect();
        map.insert("selected_components".to_string(), Value::Array(normalized));
    }

    Ok(Value::Object(map))
}

/// Integer from a JSON number or numeric string
fn json_int(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Single line item in an order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub product: ProductRef,
    pub quantity: u32,
    pub install_selected: bool,
    /// Price snapshot from the last pricing run
    pub unit_price: Decimal,
    pub line_subtotal: Decimal,
    pub line_install_amount: Decimal,
    pub line_shipping_amount: Decimal,
    pub options: Option<serde_json::Value>,
}

impl OrderLine {
    /// New unpriced line; amounts are filled in by the next pricing run.
    pub fn new(product: ProductRef, quantity: u32, install_selected: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            product,
            quantity,
            install_selected,
            unit_price: Decimal::ZERO,
            line_subtotal: Decimal::ZERO,
            line_install_amount: Decimal::ZERO,
            line_shipping_amount: Decimal::ZERO,
            options: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Cart,
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Cart => "cart",
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// cart -> pending -> {paid, cancelled, refunded}
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Cart, OrderStatus::Pending)
                | (
                    OrderStatus::Pending,
                    OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Refunded
                )
        )
    }
}

impl FromStr for OrderStatus {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(OrderStatus::Cart),
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(PricingError::invalid_state(format!(
                "unknown order status '{}'",
                other
            ))),
        }
    }
}

/// Basic customer contact captured at checkout
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerContact {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

/// Order-level aggregate amounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub install_total: Decimal,
    pub permit_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

impl OrderTotals {
    /// Build totals with `grand_total` derived from the parts.
    pub fn compose(
        subtotal: Decimal,
        shipping_total: Decimal,
        install_total: Decimal,
        permit_total: Decimal,
        tax_total: Decimal,
    ) -> Result<Self, PricingError> {
        let grand_total = [shipping_total, install_total, permit_total, tax_total]
            .into_iter()
            .try_fold(subtotal, |sum, part| sum.checked_add(part))
            .ok_or_else(|| PricingError::invalid_input("grand_total", "amount out of range"))?;

        Ok(Self {
            subtotal,
            shipping_total,
            install_total,
            permit_total,
            tax_total,
            grand_total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub zip_code: Option<String>,
    pub location_id: Option<Uuid>,
    pub install_service_area_id: Option<Uuid>,
    /// Write-once once assigned
    pub install_queue_position: Option<u32>,
    pub install_disclaimer_accepted: bool,
    pub contact: CustomerContact,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Empty cart
    pub fn new_cart(zip_code: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Cart,
            zip_code,
            location_id: None,
            install_service_area_id: None,
            install_queue_position: None,
            install_disclaimer_accepted: false,
            contact: CustomerContact::default(),
            lines: Vec::new(),
            totals: OrderTotals::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_install_selected(&self) -> bool {
        self.lines.iter().any(|line| line.install_selected)
    }

    pub fn product_refs(&self) -> Vec<ProductRef> {
        self.lines.iter().map(|line| line.product).collect()
    }

    pub fn line_mut(&mut self, line_id: Uuid) -> Result<&mut OrderLine, PricingError> {
        self.lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .ok_or_else(|| PricingError::not_found("order line", line_id))
    }

    pub fn ensure_cart(&self) -> Result<(), PricingError> {
        if self.status != OrderStatus::Cart {
            return Err(PricingError::invalid_state(format!(
                "order {} is {}, only carts can be modified",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Move a priced cart to pending.
    ///
    /// The cart must have lines, and the install disclaimer must be accepted
    /// when any line has install selected. The disclaimer is recorded only
    /// when an install exists. Nothing is changed on error.
    pub fn finalize(&mut self, disclaimer_accepted: bool) -> Result<(), PricingError> {
        self.ensure_cart()?;
        if self.lines.is_empty() {
            return Err(PricingError::invalid_input("lines", "cart is empty"));
        }

        let has_install = self.has_install_selected();
        if has_install && !disclaimer_accepted {
            return Err(PricingError::invalid_input(
                "install_disclaimer_accepted",
                "install dates are not guaranteed and must be acknowledged before checkout",
            ));
        }
        if !self.status.can_transition_to(OrderStatus::Pending) {
            return Err(PricingError::invalid_state(format!(
                "order {} cannot move from {} to pending",
                self.id,
                self.status.as_str()
            )));
        }

        self.install_disclaimer_accepted = has_install;
        self.status = OrderStatus::Pending;
        Ok(())
    }
}

// ==================== database rows ====================

/// Order from store_orders
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub status: String,
    pub zip_code: Option<String>,
    pub zip_location_id: Option<Uuid>,
    pub install_service_area_id: Option<Uuid>,
    pub install_queue_position: Option<i32>,
    pub install_disclaimer_accepted: bool,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub install_total: Decimal,
    pub permit_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, PricingError> {
        let install_queue_position = self
            .install_queue_position
            .map(|p| {
                u32::try_from(p).map_err(|_| {
                    PricingError::invalid_state(format!("negative queue position {}", p))
                })
            })
            .transpose()?;

        Ok(Order {
            id: self.id,
            status: self.status.parse()?,
            zip_code: self.zip_code,
            location_id: self.zip_location_id,
            install_service_area_id: self.install_service_area_id,
            install_queue_position,
            install_disclaimer_accepted: self.install_disclaimer_accepted,
            contact: CustomerContact {
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
            },
            lines,
            totals: OrderTotals {
                subtotal: self.subtotal,
                shipping_total: self.shipping_total,
                install_total: self.install_total,
                permit_total: self.permit_total,
                tax_total: self.tax_total,
                grand_total: self.grand_total,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Line from store_order_lines
#[derive(Debug, Clone, FromRow)]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub pool_package_id: Option<Uuid>,
    pub equipment_item_id: Option<Uuid>,
    pub quantity: i32,
    pub install_selected: bool,
    pub unit_price: Decimal,
    pub line_subtotal: Decimal,
    pub line_install_amount: Decimal,
    pub line_shipping_amount: Decimal,
    pub config_json: Option<serde_json::Value>,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = PricingError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let product = match (row.pool_package_id, row.equipment_item_id) {
            (Some(id), None) => ProductRef::Package(id),
            (None, Some(id)) => ProductRef::Equipment(id),
            _ => {
                return Err(PricingError::invalid_state(format!(
                    "order line {} must reference exactly one product",
                    row.id
                )))
            }
        };

        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| {
                PricingError::invalid_state(format!(
                    "order line {} has quantity {}",
                    row.id, row.quantity
                ))
            })?;

        Ok(OrderLine {
            id: row.id,
            product,
            quantity,
            install_selected: row.install_selected,
            unit_price: row.unit_price,
            line_subtotal: row.line_subtotal,
            line_install_amount: row.line_install_amount,
            line_shipping_amount: row.line_shipping_amount,
            options: row.config_json,
        })
    }
}

/// Pool package joined with its shipping profile
#[derive(Debug, Clone, FromRow)]
pub struct PoolPackageRow {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub install_days: Decimal,
    pub install_daily_rate: Decimal,
    pub install_included_miles: i32,
    pub install_per_mile_rate: Decimal,
    pub shipping_profile_id: Option<Uuid>,
    pub shipping_code: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_base_flat_rate: Option<Decimal>,
    pub shipping_per_mile_rate: Option<Decimal>,
    pub shipping_free_with_install: Option<bool>,
}

/// Equipment item joined with its shipping profile
#[derive(Debug, Clone, FromRow)]
pub struct EquipmentItemRow {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub is_installable: bool,
    pub install_base_rate: Decimal,
    pub install_included_miles: i32,
    pub install_per_mile_rate: Decimal,
    pub shipping_profile_id: Option<Uuid>,
    pub shipping_code: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_base_flat_rate: Option<Decimal>,
    pub shipping_per_mile_rate: Option<Decimal>,
    pub shipping_free_with_install: Option<bool>,
}

fn joined_shipping(
    id: Option<Uuid>,
    code: Option<String>,
    name: Option<String>,
    base_flat_rate: Option<Decimal>,
    per_mile_rate: Option<Decimal>,
    free_with_install: Option<bool>,
) -> Option<ShippingProfile> {
    id.map(|id| ShippingProfile {
        id,
        code: code.unwrap_or_default(),
        name: name.unwrap_or_default(),
        base_flat_rate: base_flat_rate.unwrap_or(Decimal::ZERO),
        per_mile_rate: per_mile_rate.unwrap_or(Decimal::ZERO),
        free_with_install: free_with_install.unwrap_or(false),
    })
}

impl From<PoolPackageRow> for Priceable {
    fn from(row: PoolPackageRow) -> Self {
        Priceable::Package(PoolPackage {
            id: row.id,
            name: row.name,
            sku: row.sku,
            price: row.price,
            is_active: row.is_active,
            install_days: row.install_days,
            // Packages are always install-eligible
            install: Some(InstallProfile {
                rate: row.install_daily_rate,
                included_miles: Decimal::from(row.install_included_miles),
                per_mile_rate: row.install_per_mile_rate,
            }),
            shipping: joined_shipping(
                row.shipping_profile_id,
                row.shipping_code,
                row.shipping_name,
                row.shipping_base_flat_rate,
                row.shipping_per_mile_rate,
                row.shipping_free_with_install,
            ),
        })
    }
}

impl From<EquipmentItemRow> for Priceable {
    fn from(row: EquipmentItemRow) -> Self {
        let install = row.is_installable.then(|| InstallProfile {
            rate: row.install_base_rate,
            included_miles: Decimal::from(row.install_included_miles),
            per_mile_rate: row.install_per_mile_rate,
        });

        Priceable::Equipment(EquipmentItem {
            id: row.id,
            name: row.name,
            sku: row.sku,
            price: row.price,
            is_active: row.is_active,
            install,
            shipping: joined_shipping(
                row.shipping_profile_id,
                row.shipping_code,
                row.shipping_name,
                row.shipping_base_flat_rate,
                row.shipping_per_mile_rate,
                row.shipping_free_with_install,
            ),
        })
    }
}
