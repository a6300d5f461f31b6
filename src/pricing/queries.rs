//! Database queries for the pricing engine.
//!
//! Order-scoped queries take a `PgConnection` so callers can run them inside
//! the transaction that holds the order's row lock.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::AppError;

use super::engine::CatalogSnapshot;
use super::models::{
    EquipmentItemRow, Location, Order, OrderLine, OrderLineRow, OrderRow, PoolPackageRow,
    Priceable, ProductRef, ServiceArea,
};

const LOCATION_COLUMNS: &str = r#"
    id, zip_code, city, county, state, latitude, longitude,
    service_area_id, install_allowed
"#;

const SERVICE_AREA_COLUMNS: &str = r#"
    id, name, is_active, allow_pool_installs, allow_accessory_installs,
    permit_pool_fee_base, permit_accessory_fee_base,
    permit_pool_labor_hours, permit_accessory_labor_hours
"#;

const ORDER_COLUMNS: &str = r#"
    id, status, zip_code, zip_location_id, install_service_area_id,
    install_queue_position, install_disclaimer_accepted,
    full_name, email, phone,
    subtotal, shipping_total, install_total, permit_total, tax_total, grand_total,
    created_at, updated_at
"#;

/// Find a ZIP location by code
pub async fn find_location_by_zip(
    conn: &mut PgConnection,
    zip_code: &str,
) -> Result<Option<Location>, AppError> {
    let sql = format!(
        "SELECT {} FROM store_zip_locations WHERE zip_code = $1",
        LOCATION_COLUMNS
    );
    let location = sqlx::query_as::<_, Location>(&sql)
        .bind(zip_code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(location)
}

/// Find a ZIP location by id
pub async fn find_location_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Location>, AppError> {
    let sql = format!("SELECT {} FROM store_zip_locations WHERE id = $1", LOCATION_COLUMNS);
    let location = sqlx::query_as::<_, Location>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(location)
}

/// Get a service area by id
pub async fn get_service_area(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<ServiceArea>, AppError> {
    let sql = format!(
        "SELECT {} FROM store_service_areas WHERE id = $1",
        SERVICE_AREA_COLUMNS
    );
    let area = sqlx::query_as::<_, ServiceArea>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(area)
}

/// Get all ZIP locations (for cache warming)
pub async fn get_all_locations(pool: &PgPool) -> Result<Vec<Location>, AppError> {
    let sql = format!("SELECT {} FROM store_zip_locations", LOCATION_COLUMNS);
    let locations = sqlx::query_as::<_, Location>(&sql).fetch_all(pool).await?;

    Ok(locations)
}

/// Get all service areas (for cache warming)
pub async fn get_all_service_areas(pool: &PgPool) -> Result<Vec<ServiceArea>, AppError> {
    let sql = format!("SELECT {} FROM store_service_areas", SERVICE_AREA_COLUMNS);
    let areas = sqlx::query_as::<_, ServiceArea>(&sql).fetch_all(pool).await?;

    Ok(areas)
}

/// Load pool packages joined with their shipping profiles
async fn get_pool_packages(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<Vec<PoolPackageRow>, AppError> {
    let rows = sqlx::query_as::<_, PoolPackageRow>(
        r#"
        SELECT
            p.id, p.name, p.sku, p.price, p.is_active,
            p.install_days, p.install_daily_rate,
            p.install_included_miles, p.install_per_mile_rate,
            s.id AS shipping_profile_id,
            s.code AS shipping_code,
            s.name AS shipping_name,
            s.base_flat_rate AS shipping_base_flat_rate,
            s.per_mile_rate AS shipping_per_mile_rate,
            s.free_with_install AS shipping_free_with_install
        FROM store_pool_packages p
        LEFT JOIN store_shipping_profiles s ON s.id = p.shipping_profile_id
        WHERE p.id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Load equipment items joined with their shipping profiles
async fn get_equipment_items(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<Vec<EquipmentItemRow>, AppError> {
    let rows = sqlx::query_as::<_, EquipmentItemRow>(
        r#"
        SELECT
            e.id, e.name, e.sku, e.price, e.is_active,
            e.is_installable, e.install_base_rate,
            e.install_included_miles, e.install_per_mile_rate,
            s.id AS shipping_profile_id,
            s.code AS shipping_code,
            s.name AS shipping_name,
            s.base_flat_rate AS shipping_base_flat_rate,
            s.per_mile_rate AS shipping_per_mile_rate,
            s.free_with_install AS shipping_free_with_install
        FROM store_equipment_items e
        LEFT JOIN store_shipping_profiles s ON s.id = e.shipping_profile_id
        WHERE e.id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Load the current catalog entries for a set of product references.
///
/// References with no catalog row are simply absent from the snapshot; the
/// engine reports them.
pub async fn load_catalog(
    conn: &mut PgConnection,
    products: &[ProductRef],
) -> Result<CatalogSnapshot, AppError> {
    let mut package_ids = Vec::new();
    let mut equipment_ids = Vec::new();
    for product in products {
        match product {
            ProductRef::Package(id) => package_ids.push(*id),
            ProductRef::Equipment(id) => equipment_ids.push(*id),
        }
    }

    let mut catalog = CatalogSnapshot::new();
    if !package_ids.is_empty() {
        for row in get_pool_packages(conn, &package_ids).await? {
            catalog.insert(Priceable::from(row));
        }
    }
    if !equipment_ids.is_empty() {
        for row in get_equipment_items(conn, &equipment_ids).await? {
            catalog.insert(Priceable::from(row));
        }
    }

    Ok(catalog)
}

/// Find a single catalog product
pub async fn find_priceable(
    conn: &mut PgConnection,
    product: ProductRef,
) -> Result<Option<Priceable>, AppError> {
    let priceable = match product {
        ProductRef::Package(id) => get_pool_packages(conn, &[id])
            .await?
            .into_iter()
            .next()
            .map(Priceable::from),
        ProductRef::Equipment(id) => get_equipment_items(conn, &[id])
            .await?
            .into_iter()
            .next()
            .map(Priceable::from),
    };

    Ok(priceable)
}

async fn get_order_lines(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Vec<OrderLine>, AppError> {
    let rows = sqlx::query_as::<_, OrderLineRow>(
        r#"
        SELECT
            id, order_id, pool_package_id, equipment_item_id, quantity,
            install_selected, unit_price, line_subtotal,
            line_install_amount, line_shipping_amount, config_json
        FROM store_order_lines
        WHERE order_id = $1
        ORDER BY added_at, id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let lines = rows
        .into_iter()
        .map(OrderLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines)
}

async fn fetch_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    for_update: bool,
) -> Result<Option<Order>, AppError> {
    let sql = format!(
        "SELECT {} FROM store_orders WHERE id = $1{}",
        ORDER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let Some(row) = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let lines = get_order_lines(conn, order_id).await?;
    Ok(Some(row.into_order(lines)?))
}

/// Load an order with its lines (read-only)
pub async fn get_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Order>, AppError> {
    fetch_order(conn, order_id, false).await
}

/// Load an order with its lines and lock the order row until the
/// surrounding transaction ends.
pub async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Order>, AppError> {
    fetch_order(conn, order_id, true).await
}

/// Insert a new (empty) order
pub async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO store_orders (id, status, zip_code, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.zip_code.as_deref())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn to_db_int(value: u32, field: &str) -> Result<i32, AppError> {
    i32::try_from(value).map_err(|_| AppError::Internal(format!("{} {} out of range", field, value)))
}

/// Persist an order and replace its line set.
///
/// Lines missing from `order.lines` are deleted; the rest are upserted.
pub async fn save_order(conn: &mut PgConnection, order: &Order) -> Result<(), AppError> {
    let queue_position = order
        .install_queue_position
        .map(|p| to_db_int(p, "queue position"))
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE store_orders SET
            status = $2,
            zip_code = $3,
            zip_location_id = $4,
            install_service_area_id = $5,
            install_queue_position = $6,
            install_disclaimer_accepted = $7,
            full_name = $8,
            email = $9,
            phone = $10,
            subtotal = $11,
            shipping_total = $12,
            install_total = $13,
            permit_total = $14,
            tax_total = $15,
            grand_total = $16,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.zip_code.as_deref())
    .bind(order.location_id)
    .bind(order.install_service_area_id)
    .bind(queue_position)
    .bind(order.install_disclaimer_accepted)
    .bind(&order.contact.full_name)
    .bind(&order.contact.email)
    .bind(&order.contact.phone)
    .bind(order.totals.subtotal)
    .bind(order.totals.shipping_total)
    .bind(order.totals.install_total)
    .bind(order.totals.permit_total)
    .bind(order.totals.tax_total)
    .bind(order.totals.grand_total)
    .execute(&mut *conn)
    .await?;

    let line_ids: Vec<Uuid> = order.lines.iter().map(|line| line.id).collect();
    sqlx::query("DELETE FROM store_order_lines WHERE order_id = $1 AND NOT (id = ANY($2))")
        .bind(order.id)
        .bind(&line_ids)
        .execute(&mut *conn)
        .await?;

    for line in &order.lines {
        let (pool_package_id, equipment_item_id) = match line.product {
            ProductRef::Package(id) => (Some(id), None),
            ProductRef::Equipment(id) => (None, Some(id)),
        };

        sqlx::query(
            r#"
            INSERT INTO store_order_lines (
                id, order_id, pool_package_id, equipment_item_id, quantity,
                install_selected, unit_price, line_subtotal,
                line_install_amount, line_shipping_amount, config_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                install_selected = EXCLUDED.install_selected,
                unit_price = EXCLUDED.unit_price,
                line_subtotal = EXCLUDED.line_subtotal,
                line_install_amount = EXCLUDED.line_install_amount,
                line_shipping_amount = EXCLUDED.line_shipping_amount,
                config_json = EXCLUDED.config_json
            "#,
        )
        .bind(line.id)
        .bind(order.id)
        .bind(pool_package_id)
        .bind(equipment_item_id)
        .bind(to_db_int(line.quantity, "quantity")?)
        .bind(line.install_selected)
        .bind(line.unit_price)
        .bind(line.line_subtotal)
        .bind(line.line_install_amount)
        .bind(line.line_shipping_amount)
        .bind(&line.options)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Take the next install queue position for a service area.
///
/// A single upsert, so concurrent callers serialize on the counter row. The
/// first use seeds the counter from orders already queued in the area.
pub async fn next_queue_position(
    conn: &mut PgConnection,
    service_area_id: Uuid,
) -> Result<u32, AppError> {
    let position = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO store_install_queue_counters (service_area_id, last_position)
        VALUES (
            $1,
            (
                SELECT COUNT(*)::INTEGER
                FROM store_orders
                WHERE install_service_area_id = $1
                  AND install_queue_position IS NOT NULL
            ) + 1
        )
        ON CONFLICT (service_area_id)
        DO UPDATE SET last_position = store_install_queue_counters.last_position + 1
        RETURNING last_position
        "#,
    )
    .bind(service_area_id)
    .fetch_one(&mut *conn)
    .await?;

    u32::try_from(position)
        .map_err(|_| AppError::Internal(format!("invalid queue position {}", position)))
}

/// Cheap connectivity check for the health endpoint
pub async fn ping(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
