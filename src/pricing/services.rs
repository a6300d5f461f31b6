//! Pricing service functions with database access.
//!
//! Host side of the engine: resolves locations, service areas and catalog
//! entries (through the cache where possible), calls the pure engine and
//! persists the result. Every operation that touches an order runs in one
//! transaction holding the order's row lock.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::cache::AppCache;
use crate::config::PricingConfig;
use crate::error::AppError;

use super::calculators::{permit_charge, round_money};
use super::engine::{apply_pricing, CatalogSnapshot, DistanceSource, PricingContext};
use super::error::PricingError;
use super::geo::resolve_distance;
use super::models::{
    CustomerContact, InstallKind, Location, Order, OrderLine, Priceable, ProductRef,
    ServiceArea,
};
use super::queries;
use super::queue::{plan_queue_assignment, QueuePlan};

/// Order plus the reference data needed to present it
#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
    pub catalog: CatalogSnapshot,
    pub service_area: Option<Arc<ServiceArea>>,
    /// Present when the order was repriced by this call
    pub pricing: Option<PricingSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingSummary {
    pub distance_miles: Decimal,
    pub distance_source: DistanceSource,
    pub permit_kind: Option<InstallKind>,
}

/// Result of a ZIP check
#[derive(Debug, Clone)]
pub struct ZipCheckResult {
    pub location: Arc<Location>,
    pub service_area: Option<Arc<ServiceArea>>,
    pub install_allowed_for_zip: bool,
    pub pool_permit_charge: Option<Decimal>,
    pub accessory_permit_charge: Option<Decimal>,
    pub distance_miles: Option<Decimal>,
}

impl ZipCheckResult {
    pub fn is_serviceable(&self) -> bool {
        self.service_area.as_ref().is_some_and(|area| area.is_active)
    }
}

/// Result of a distance lookup between two ZIPs
#[derive(Debug, Clone)]
pub struct DistanceResult {
    pub from_zip: String,
    pub to_zip: String,
    pub distance_miles: Option<Decimal>,
}

/// New line for `add_line`
#[derive(Debug, Clone)]
pub struct NewLine {
    pub zip_code: Option<String>,
    pub product: ProductRef,
    pub quantity: u32,
    pub install_selected: bool,
    pub options: Option<serde_json::Value>,
}

/// Partial update for `update_line`
#[derive(Debug, Clone, Default)]
pub struct LineChanges {
    pub quantity: Option<u32>,
    pub install_selected: Option<bool>,
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CheckoutDetails {
    pub contact: CustomerContact,
    pub zip_code: String,
    pub install_disclaimer_accepted: bool,
}

// ==================== reference data ====================

fn normalize_zip(zip_code: &str) -> Result<String, PricingError> {
    let zip = zip_code.trim();
    if zip.is_empty() {
        return Err(PricingError::invalid_input("zip_code", "ZIP code is required"));
    }
    Ok(zip.to_string())
}

/// Look up a ZIP, cache first
async fn find_location(
    conn: &mut PgConnection,
    cache: &AppCache,
    zip_code: &str,
) -> Result<Option<Arc<Location>>, AppError> {
    if let Some(cached) = cache.get_location(zip_code).await {
        tracing::debug!("Cache HIT for ZIP: {}", zip_code);
        return Ok(Some(cached));
    }

    tracing::debug!("Cache MISS for ZIP: {}", zip_code);
    match queries::find_location_by_zip(conn, zip_code).await? {
        Some(location) => Ok(Some(cache.put_location(location).await)),
        None => Ok(None),
    }
}

async fn require_location(
    conn: &mut PgConnection,
    cache: &AppCache,
    zip_code: &str,
) -> Result<Arc<Location>, AppError> {
    find_location(conn, cache, zip_code)
        .await?
        .ok_or_else(|| PricingError::not_found("zip location", zip_code).into())
}

/// Look up a service area, cache first
async fn find_service_area(
    conn: &mut PgConnection,
    cache: &AppCache,
    id: Uuid,
) -> Result<Option<Arc<ServiceArea>>, AppError> {
    if let Some(cached) = cache.get_service_area(id).await {
        return Ok(Some(cached));
    }

    match queries::get_service_area(conn, id).await? {
        Some(area) => Ok(Some(cache.put_service_area(area).await)),
        None => {
            tracing::warn!("Service area {} referenced but missing", id);
            Ok(None)
        }
    }
}

async fn area_for_location(
    conn: &mut PgConnection,
    cache: &AppCache,
    location: &Location,
) -> Result<Option<Arc<ServiceArea>>, AppError> {
    match location.service_area_id {
        Some(id) => find_service_area(conn, cache, id).await,
        None => Ok(None),
    }
}

/// Location of the configured base ZIP. Missing is fatal.
async fn base_location(
    conn: &mut PgConnection,
    cache: &AppCache,
    config: &PricingConfig,
) -> Result<Arc<Location>, AppError> {
    find_location(conn, cache, &config.base_zip_code)
        .await?
        .ok_or_else(|| {
            PricingError::configuration(format!(
                "base ZIP {} has no location record",
                config.base_zip_code
            ))
            .into()
        })
}

/// Ways to find an order's location, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationLookup<'a> {
    Linked { id: Uuid, zip_code: Option<&'a str> },
    Zip(&'a str),
}

/// The linked location comes first; the raw ZIP is the fallback.
fn location_lookups(order: &Order) -> Vec<LocationLookup<'_>> {
    let zip_code = order.zip_code.as_deref();
    let mut lookups = Vec::with_capacity(2);
    if let Some(id) = order.location_id {
        lookups.push(LocationLookup::Linked { id, zip_code });
    }
    if let Some(zip) = zip_code {
        lookups.push(LocationLookup::Zip(zip));
    }
    lookups
}

/// Resolve the order's location: by stored link when set, else by ZIP code.
async fn resolve_order_location(
    conn: &mut PgConnection,
    cache: &AppCache,
    order: &Order,
) -> Result<Option<Arc<Location>>, AppError> {
    for lookup in location_lookups(order) {
        let found = match lookup {
            LocationLookup::Linked { id, zip_code } => {
                let cached = match zip_code {
                    Some(zip) => cache.get_location(zip).await.filter(|l| l.id == id),
                    None => None,
                };
                match cached {
                    Some(location) => Some(location),
                    None => match queries::find_location_by_id(conn, id).await? {
                        Some(location) => Some(cache.put_location(location).await),
                        None => None,
                    },
                }
            }
            LocationLookup::Zip(zip_code) => find_location(conn, cache, zip_code).await?,
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// The ZIP's service area, which must exist and be active.
fn ensure_serviceable<'a>(
    zip_code: &str,
    service_area: Option<&'a ServiceArea>,
) -> Result<&'a ServiceArea, PricingError> {
    service_area
        .filter(|area| area.is_active)
        .ok_or_else(|| PricingError::Unserviceable {
            zip_code: zip_code.to_string(),
        })
}

fn ensure_install_permitted(
    location: &Location,
    service_area: &ServiceArea,
    priceable: &Priceable,
) -> Result<(), PricingError> {
    let kind = priceable.product_ref().install_kind();

    if priceable.install().is_none() {
        return Err(PricingError::invalid_input(
            "install_selected",
            format!("{} cannot be installed", priceable.display_name()),
        ));
    }
    if !location.install_allowed {
        return Err(PricingError::invalid_input(
            "install_selected",
            format!("installs are not offered in ZIP {}", location.zip_code),
        ));
    }
    if !service_area.allows_install(kind) {
        let what = match kind {
            InstallKind::Pool => "pool",
            InstallKind::Accessory => "accessory",
        };
        return Err(PricingError::invalid_input(
            "install_selected",
            format!("{} installs are not offered in {}", what, service_area.name),
        ));
    }
    Ok(())
}

// ==================== order helpers ====================

async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Order, AppError> {
    queries::lock_order(conn, order_id)
        .await?
        .ok_or_else(|| PricingError::not_found("order", order_id).into())
}

/// Reprice an order against freshly loaded reference data.
///
/// A location discovered from the order's ZIP is linked to the order so the
/// caller persists it along with the new amounts.
async fn reprice(
    conn: &mut PgConnection,
    cache: &AppCache,
    config: &PricingConfig,
    mut order: Order,
    distance_override: Option<Decimal>,
) -> Result<OrderView, AppError> {
    let destination = resolve_order_location(conn, cache, &order).await?;
    if let Some(location) = &destination {
        if order.location_id != Some(location.id) {
            tracing::debug!(order_id = %order.id, zip = %location.zip_code, "linking order to ZIP location");
            order.location_id = Some(location.id);
        }
    }

    let origin = base_location(conn, cache, config).await?;
    let service_area = match &destination {
        Some(location) => area_for_location(conn, cache, location).await?,
        None => None,
    };
    let catalog = queries::load_catalog(conn, &order.product_refs()).await?;

    let ctx = PricingContext {
        origin: Some(origin.as_ref()),
        destination: destination.as_deref(),
        service_area: service_area.as_deref(),
        catalog: &catalog,
        distance_override,
    };
    let outcome = apply_pricing(&order, &ctx, config)?;

    Ok(OrderView {
        order: outcome.order,
        catalog,
        service_area,
        pricing: Some(PricingSummary {
            distance_miles: outcome.distance_miles,
            distance_source: outcome.distance_source,
            permit_kind: outcome.permit_kind,
        }),
    })
}

// ==================== operations ====================

/// Look up a ZIP and preview what ordering there would cost.
pub async fn zip_check(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    zip_code: &str,
) -> Result<ZipCheckResult, AppError> {
    let zip_code = normalize_zip(zip_code)?;
    let mut conn = pool.acquire().await?;

    let location = require_location(&mut conn, cache, &zip_code).await?;
    let origin = base_location(&mut conn, cache, config).await?;
    let service_area = area_for_location(&mut conn, cache, &location).await?;

    let charge = |kind| {
        service_area
            .as_deref()
            .map(|area| {
                permit_charge(area, kind, config.permit_labor_hourly_rate)
                    .map(|amount| round_money(amount, 2))
            })
            .transpose()
    };

    Ok(ZipCheckResult {
        install_allowed_for_zip: location.install_allowed,
        pool_permit_charge: charge(InstallKind::Pool)?,
        accessory_permit_charge: charge(InstallKind::Accessory)?,
        distance_miles: resolve_distance(&origin, &location),
        service_area,
        location,
    })
}

/// Great-circle distance between two known ZIPs.
pub async fn distance_between_zips(
    pool: &PgPool,
    cache: &AppCache,
    from_zip: &str,
    to_zip: &str,
) -> Result<DistanceResult, AppError> {
    let from_zip = normalize_zip(from_zip)?;
    let to_zip = normalize_zip(to_zip)?;
    let mut conn = pool.acquire().await?;

    let from = require_location(&mut conn, cache, &from_zip).await?;
    let to = require_location(&mut conn, cache, &to_zip).await?;

    Ok(DistanceResult {
        distance_miles: resolve_distance(&from, &to),
        from_zip,
        to_zip,
    })
}

/// Start an empty cart.
pub async fn create_cart(pool: &PgPool, zip_code: Option<&str>) -> Result<OrderView, AppError> {
    let zip_code = zip_code.map(normalize_zip).transpose()?;
    let order = Order::new_cart(zip_code);

    let mut conn = pool.acquire().await?;
    queries::insert_order(&mut conn, &order).await?;
    tracing::info!(order_id = %order.id, "cart created");

    Ok(OrderView {
        order,
        catalog: CatalogSnapshot::new(),
        service_area: None,
        pricing: None,
    })
}

/// Load an order as last priced, without repricing.
pub async fn get_order(
    pool: &PgPool,
    cache: &AppCache,
    order_id: Uuid,
) -> Result<OrderView, AppError> {
    let mut conn = pool.acquire().await?;
    let order = queries::get_order(&mut conn, order_id)
        .await?
        .ok_or_else(|| PricingError::not_found("order", order_id))?;

    let catalog = queries::load_catalog(&mut conn, &order.product_refs()).await?;
    let service_area = match order.install_service_area_id {
        Some(id) => find_service_area(&mut conn, cache, id).await?,
        None => match resolve_order_location(&mut conn, cache, &order).await? {
            Some(location) => area_for_location(&mut conn, cache, &location).await?,
            None => None,
        },
    };

    Ok(OrderView {
        order,
        catalog,
        service_area,
        pricing: None,
    })
}

/// Reprice an order and store the result.
pub async fn quote_order(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    distance_override: Option<Decimal>,
) -> Result<OrderView, AppError> {
    let mut tx = pool.begin().await?;
    let order = lock_order(&mut tx, order_id).await?;

    let view = reprice(&mut tx, cache, config, order, distance_override).await?;
    queries::save_order(&mut tx, &view.order).await?;
    tx.commit().await?;

    Ok(view)
}

/// Add a product to a cart and reprice it.
pub async fn add_line(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    new_line: NewLine,
) -> Result<OrderView, AppError> {
    if new_line.quantity == 0 {
        return Err(PricingError::invalid_input("quantity", "must be at least 1").into());
    }

    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    order.ensure_cart()?;

    let zip_code = match new_line.zip_code.as_deref().or(order.zip_code.as_deref()) {
        Some(zip) => normalize_zip(zip)?,
        None => return Err(PricingError::invalid_input("zip_code", "ZIP code is required").into()),
    };

    let location = find_location(&mut tx, cache, &zip_code)
        .await?
        .ok_or_else(|| PricingError::Unserviceable {
            zip_code: zip_code.clone(),
        })?;
    let service_area = area_for_location(&mut tx, cache, &location).await?;
    let service_area = ensure_serviceable(&zip_code, service_area.as_deref())?;

    let priceable = queries::find_priceable(&mut tx, new_line.product)
        .await?
        .filter(Priceable::is_active)
        .ok_or_else(|| PricingError::not_found("product", new_line.product))?;

    if new_line.install_selected {
        ensure_install_permitted(&location, service_area, &priceable)?;
    }

    order.zip_code = Some(zip_code);
    order.location_id = Some(location.id);

    let mut line = OrderLine::new(new_line.product, new_line.quantity, new_line.install_selected);
    line.options = new_line.options;
    tracing::info!(
        order_id = %order.id,
        line_id = %line.id,
        product = %line.product,
        quantity = line.quantity,
        install = line.install_selected,
        "line added"
    );
    order.lines.push(line);

    let view = reprice(&mut tx, cache, config, order, None).await?;
    queries::save_order(&mut tx, &view.order).await?;
    tx.commit().await?;

    Ok(view)
}

/// Change quantity, install choice or options on a cart line and reprice.
pub async fn update_line(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    line_id: Uuid,
    changes: LineChanges,
) -> Result<OrderView, AppError> {
    if changes.quantity == Some(0) {
        return Err(PricingError::invalid_input("quantity", "must be at least 1").into());
    }

    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    order.ensure_cart()?;

    let product = order.line_mut(line_id)?.product;
    let enabling_install = changes.install_selected == Some(true);
    if enabling_install {
        let zip_code = order
            .zip_code
            .clone()
            .ok_or_else(|| PricingError::invalid_input("zip_code", "ZIP code is required"))?;
        let location = require_location(&mut tx, cache, &zip_code).await?;
        let service_area = area_for_location(&mut tx, cache, &location).await?;
        let service_area = ensure_serviceable(&zip_code, service_area.as_deref())?;
        let priceable = queries::find_priceable(&mut tx, product)
            .await?
            .ok_or_else(|| PricingError::not_found("product", product))?;
        ensure_install_permitted(&location, service_area, &priceable)?;
    }

    let line = order.line_mut(line_id)?;
    if let Some(quantity) = changes.quantity {
        line.quantity = quantity;
    }
    if let Some(install_selected) = changes.install_selected {
        line.install_selected = install_selected;
    }
    if let Some(options) = changes.options {
        line.options = Some(options);
    }

    let view = reprice(&mut tx, cache, config, order, None).await?;
    queries::save_order(&mut tx, &view.order).await?;
    tx.commit().await?;

    Ok(view)
}

/// Drop a line from a cart and reprice the rest.
pub async fn remove_line(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    line_id: Uuid,
) -> Result<OrderView, AppError> {
    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    order.ensure_cart()?;

    let before = order.lines.len();
    order.lines.retain(|line| line.id != line_id);
    if order.lines.len() == before {
        return Err(PricingError::not_found("order line", line_id).into());
    }
    tracing::info!(order_id = %order.id, line_id = %line_id, "line removed");

    let view = reprice(&mut tx, cache, config, order, None).await?;
    queries::save_order(&mut tx, &view.order).await?;
    tx.commit().await?;

    Ok(view)
}

/// Move a cart to another ZIP and reprice it.
pub async fn update_zip(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    zip_code: &str,
) -> Result<OrderView, AppError> {
    let zip_code = normalize_zip(zip_code)?;

    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    order.ensure_cart()?;

    let location = find_location(&mut tx, cache, &zip_code)
        .await?
        .filter(|location| location.install_allowed)
        .ok_or_else(|| PricingError::Unserviceable {
            zip_code: zip_code.clone(),
        })?;
    let service_area = area_for_location(&mut tx, cache, &location).await?;
    ensure_serviceable(&zip_code, service_area.as_deref())?;

    order.zip_code = Some(zip_code);
    order.location_id = Some(location.id);

    let view = reprice(&mut tx, cache, config, order, None).await?;
    queries::save_order(&mut tx, &view.order).await?;
    tx.commit().await?;

    Ok(view)
}

/// Finalize a cart: price it, move it to pending and queue the install.
pub async fn checkout(
    pool: &PgPool,
    cache: &AppCache,
    config: &PricingConfig,
    order_id: Uuid,
    details: CheckoutDetails,
) -> Result<OrderView, AppError> {
    let zip_code = normalize_zip(&details.zip_code)?;

    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    order.ensure_cart()?;

    order.contact = CustomerContact {
        full_name: details.contact.full_name.trim().to_string(),
        email: details.contact.email.trim().to_string(),
        phone: details.contact.phone.trim().to_string(),
    };
    if order.zip_code.as_deref() != Some(zip_code.as_str()) {
        order.zip_code = Some(zip_code);
        order.location_id = None;
    }

    let mut view = reprice(&mut tx, cache, config, order, None).await?;
    let order = &mut view.order;
    order.finalize(details.install_disclaimer_accepted)?;

    match plan_queue_assignment(order, view.service_area.as_deref())? {
        QueuePlan::NeedsPosition { service_area_id } => {
            let position = queries::next_queue_position(&mut tx, service_area_id).await?;
            order.install_queue_position = Some(position);
            tracing::info!(
                order_id = %order.id,
                service_area_id = %service_area_id,
                position,
                "install queue position assigned"
            );
        }
        QueuePlan::AlreadyQueued { .. } | QueuePlan::NoServiceArea => {}
    }

    queries::save_order(&mut tx, order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %view.order.id,
        grand_total = %view.order.totals.grand_total,
        queue_position = ?view.order.install_queue_position,
        "checkout complete"
    );

    Ok(view)
}
