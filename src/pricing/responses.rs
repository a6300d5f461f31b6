//! Response DTOs for pricing API endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::CacheStats;

use super::engine::DistanceSource;
use super::models::{InstallKind, OrderLine, OrderStatus, OrderTotals, ProductRef};
use super::services::{DistanceResult, OrderView, PricingSummary, ZipCheckResult};

/// Order-level amounts
#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub shipping_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub install_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub permit_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub grand_total: Decimal,
}

impl From<&OrderTotals> for TotalsResponse {
    fn from(totals: &OrderTotals) -> Self {
        TotalsResponse {
            subtotal: totals.subtotal,
            shipping_total: totals.shipping_total,
            install_total: totals.install_total,
            permit_total: totals.permit_total,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
        }
    }
}

/// Single cart/order line
#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product: ProductRef,
    pub display_name: String,
    pub quantity: u32,
    pub install_selected: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_install_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_shipping_amount: Decimal,
    pub options: serde_json::Value,
}

impl OrderLineResponse {
    fn new(line: &OrderLine, display_name: &str) -> Self {
        OrderLineResponse {
            id: line.id,
            product: line.product,
            display_name: display_name.to_string(),
            quantity: line.quantity,
            install_selected: line.install_selected,
            unit_price: line.unit_price,
            line_subtotal: line.line_subtotal,
            line_install_amount: line.line_install_amount,
            line_shipping_amount: line.line_shipping_amount,
            options: line
                .options
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

/// How the last pricing run was computed
#[derive(Debug, Serialize)]
pub struct PricingSummaryResponse {
    #[serde(with = "rust_decimal::serde::str")]
    pub distance_miles: Decimal,
    pub distance_source: DistanceSource,
    pub permit_kind: Option<InstallKind>,
}

impl From<PricingSummary> for PricingSummaryResponse {
    fn from(summary: PricingSummary) -> Self {
        PricingSummaryResponse {
            distance_miles: summary.distance_miles,
            distance_source: summary.distance_source,
            permit_kind: summary.permit_kind,
        }
    }
}

/// Full order (cart) response
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub zip_code: Option<String>,
    pub install_service_area_id: Option<Uuid>,
    pub install_service_area: Option<String>,
    pub install_queue_position: Option<u32>,
    pub install_disclaimer_accepted: bool,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub items: Vec<OrderLineResponse>,
    pub totals: TotalsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingSummaryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderView> for OrderResponse {
    fn from(view: OrderView) -> Self {
        let OrderView {
            order,
            catalog,
            service_area,
            pricing,
        } = view;

        let items = order
            .lines
            .iter()
            .map(|line| OrderLineResponse::new(line, catalog.display_name(&line.product)))
            .collect();

        OrderResponse {
            id: order.id,
            status: order.status,
            zip_code: order.zip_code,
            install_service_area_id: order.install_service_area_id,
            install_service_area: service_area.map(|area| area.name.clone()),
            install_queue_position: order.install_queue_position,
            install_disclaimer_accepted: order.install_disclaimer_accepted,
            full_name: order.contact.full_name,
            email: order.contact.email,
            phone: order.contact.phone,
            items,
            totals: TotalsResponse::from(&order.totals),
            pricing: pricing.map(PricingSummaryResponse::from),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Response for a ZIP check
#[derive(Debug, Serialize)]
pub struct ZipCheckResponse {
    pub zip_code: String,
    pub city: String,
    pub county: String,
    pub state: String,
    pub service_area: Option<String>,
    pub service_area_active: bool,
    pub serviceable: bool,
    pub install_allowed_for_zip: bool,
    pub pool_installs_allowed: bool,
    pub accessory_installs_allowed: bool,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub pool_permit_charge: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub accessory_permit_charge: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub distance_miles: Option<Decimal>,
}

impl From<ZipCheckResult> for ZipCheckResponse {
    fn from(result: ZipCheckResult) -> Self {
        let serviceable = result.is_serviceable();
        let area = result.service_area.as_deref();

        ZipCheckResponse {
            zip_code: result.location.zip_code.clone(),
            city: result.location.city.clone(),
            county: result.location.county.clone(),
            state: result.location.state.clone(),
            service_area: area.map(|a| a.name.clone()),
            service_area_active: area.is_some_and(|a| a.is_active),
            serviceable,
            install_allowed_for_zip: result.install_allowed_for_zip,
            pool_installs_allowed: area.is_some_and(|a| a.allow_pool_installs),
            accessory_installs_allowed: area.is_some_and(|a| a.allow_accessory_installs),
            pool_permit_charge: result.pool_permit_charge,
            accessory_permit_charge: result.accessory_permit_charge,
            distance_miles: result.distance_miles,
        }
    }
}

/// Response for a distance lookup
#[derive(Debug, Serialize)]
pub struct DistanceResponse {
    pub from_zip: String,
    pub to_zip: String,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub distance_miles: Option<Decimal>,
}

impl From<DistanceResult> for DistanceResponse {
    fn from(result: DistanceResult) -> Self {
        DistanceResponse {
            from_zip: result.from_zip,
            to_zip: result.to_zip,
            distance_miles: result.distance_miles,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: CacheStats,
}

/// Generic pricing error response
#[derive(Debug, Serialize)]
pub struct PricingErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PricingErrorResponse {
    pub fn internal(message: &str) -> Self {
        PricingErrorResponse {
            error_type: "internal_error".to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}
