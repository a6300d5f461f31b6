//! Order pricing engine.
//!
//! `apply_pricing` is a pure function of the order, the reference data the host
//! resolved for it, and the pricing configuration. It never performs lookups
//! of its own and never mutates its input: the repriced order is returned and
//! the host persists it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::PricingConfig;

use super::calculators::{
    calculate_totals, estimate_install, estimate_shipping, mul_money, permit_charge, round_money,
};
use super::error::PricingError;
use super::geo::resolve_distance;
use super::models::{
    InstallKind, Location, Order, OrderLine, Priceable, ProductRef, ServiceArea,
};

/// Read-only product lookup used to snapshot line prices.
pub trait Catalog {
    fn priceable(&self, product: &ProductRef) -> Option<&Priceable>;
}

/// In-memory catalog keyed by product reference
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    items: HashMap<ProductRef, Priceable>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, priceable: Priceable) {
        self.items.insert(priceable.product_ref(), priceable);
    }

    pub fn display_name(&self, product: &ProductRef) -> &str {
        self.items
            .get(product)
            .map(Priceable::display_name)
            .unwrap_or("Unknown Item")
    }
}

impl FromIterator<Priceable> for CatalogSnapshot {
    fn from_iter<I: IntoIterator<Item = Priceable>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for priceable in iter {
            snapshot.insert(priceable);
        }
        snapshot
    }
}

impl Catalog for CatalogSnapshot {
    fn priceable(&self, product: &ProductRef) -> Option<&Priceable> {
        self.items.get(product)
    }
}

/// Everything the engine reads besides the order itself.
pub struct PricingContext<'a, C: Catalog + ?Sized> {
    /// Location of the configured base ZIP
    pub origin: Option<&'a Location>,
    /// Order's resolved location
    pub destination: Option<&'a Location>,
    pub service_area: Option<&'a ServiceArea>,
    pub catalog: &'a C,
    pub distance_override: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    Override,
    Resolved,
    /// Distance unknown, priced as zero miles
    Fallback,
}

/// Which install kinds the order contains, across all lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallComposition {
    pub has_pool_install: bool,
    pub has_accessory_install: bool,
}

impl InstallComposition {
    pub fn of(lines: &[OrderLine]) -> Self {
        let installed = |kind: InstallKind| {
            lines
                .iter()
                .any(|line| line.install_selected && line.product.install_kind() == kind)
        };

        Self {
            has_pool_install: installed(InstallKind::Pool),
            has_accessory_install: installed(InstallKind::Accessory),
        }
    }

    /// Pool wins over accessory; fees are never summed.
    pub fn permit_kind(&self) -> Option<InstallKind> {
        if self.has_pool_install {
            Some(InstallKind::Pool)
        } else if self.has_accessory_install {
            Some(InstallKind::Accessory)
        } else {
            None
        }
    }
}

/// Result of a pricing run
#[derive(Debug, Clone, PartialEq)]
pub struct PricingOutcome {
    pub order: Order,
    pub distance_miles: Decimal,
    pub distance_source: DistanceSource,
    pub permit_kind: Option<InstallKind>,
}

/// Largest accepted distance override, roughly the Earth's circumference.
pub const MAX_DISTANCE_OVERRIDE_MILES: Decimal = dec!(25000);

/// Pick the distance used for pricing.
///
/// An override outside `0..=MAX_DISTANCE_OVERRIDE_MILES` is rejected. An
/// unresolvable distance degrades to zero.
pub fn pricing_distance<C: Catalog + ?Sized>(
    ctx: &PricingContext<'_, C>,
) -> Result<(Decimal, DistanceSource), PricingError> {
    if let Some(miles) = ctx.distance_override {
        if miles < Decimal::ZERO {
            return Err(PricingError::invalid_input(
                "distance_override",
                format!("must not be negative, got {}", miles),
            ));
        }
        if miles > MAX_DISTANCE_OVERRIDE_MILES {
            return Err(PricingError::invalid_input(
                "distance_override",
                format!("must be at most {} miles, got {}", MAX_DISTANCE_OVERRIDE_MILES, miles),
            ));
        }
        return Ok((miles, DistanceSource::Override));
    }

    let resolved = match (ctx.origin, ctx.destination) {
        (Some(origin), Some(destination)) => resolve_distance(origin, destination),
        _ => None,
    };

    match resolved {
        Some(miles) => Ok((miles, DistanceSource::Resolved)),
        None => {
            tracing::debug!("distance unknown, pricing as 0 miles");
            Ok((Decimal::ZERO, DistanceSource::Fallback))
        }
    }
}

/// Price a single line against the catalog.
fn price_line(
    line: &OrderLine,
    priceable: &Priceable,
    distance_miles: Decimal,
    composition: InstallComposition,
) -> Result<OrderLine, PricingError> {
    let quantity = Decimal::from(line.quantity);
    let unit_price = priceable.price();

    let line_install_amount = if line.install_selected {
        let per_unit = round_money(estimate_install(priceable, distance_miles)?, 2);
        mul_money(per_unit, quantity, "quantity")?
    } else {
        Decimal::ZERO
    };

    // A pool install anywhere in the order frees shipping on any line whose
    // profile opts in, even if that line has no install of its own.
    let line_shipping_amount = match priceable.shipping() {
        Some(profile) => {
            let with_install = line.install_selected
                || (composition.has_pool_install && profile.free_with_install);
            let per_unit = round_money(
                estimate_shipping(profile, Some(distance_miles), with_install)?,
                2,
            );
            mul_money(per_unit, quantity, "quantity")?
        }
        None => Decimal::ZERO,
    };

    Ok(OrderLine {
        unit_price,
        line_subtotal: mul_money(unit_price, quantity, "quantity")?,
        line_install_amount,
        line_shipping_amount,
        ..line.clone()
    })
}

/// Reprice every line of an order and recompute its totals.
///
/// Idempotent: the same inputs always produce the same output. Any line
/// failure aborts the whole run.
pub fn apply_pricing<C: Catalog + ?Sized>(
    order: &Order,
    ctx: &PricingContext<'_, C>,
    config: &PricingConfig,
) -> Result<PricingOutcome, PricingError> {
    config.validate()?;

    let (distance_miles, distance_source) = pricing_distance(ctx)?;
    let composition = InstallComposition::of(&order.lines);

    let lines = order
        .lines
        .iter()
        .map(|line| {
            if line.quantity == 0 {
                return Err(PricingError::invalid_input(
                    "quantity",
                    format!("line {} has quantity 0", line.id),
                ));
            }
            let priceable = ctx
                .catalog
                .priceable(&line.product)
                .ok_or_else(|| PricingError::not_found("product", line.product))?;
            price_line(line, priceable, distance_miles, composition)
        })
        .collect::<Result<Vec<_>, PricingError>>()?;

    let permit_kind = composition.permit_kind();
    let permit_total = match (ctx.service_area, permit_kind) {
        (Some(area), Some(kind)) => round_money(
            permit_charge(area, kind, config.permit_labor_hourly_rate)?,
            2,
        ),
        _ => Decimal::ZERO,
    };

    let totals = calculate_totals(&lines, permit_total)?;

    tracing::debug!(
        order_id = %order.id,
        distance = %distance_miles,
        permit_total = %totals.permit_total,
        grand_total = %totals.grand_total,
        "order priced"
    );

    Ok(PricingOutcome {
        order: Order {
            lines,
            totals,
            ..order.clone()
        },
        distance_miles,
        distance_source,
        permit_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::{
        EquipmentItem, InstallProfile, PoolPackage, ShippingProfile,
    };
    use uuid::Uuid;

    fn config() -> PricingConfig {
        PricingConfig::new(dec!(25.00), "34491").unwrap()
    }

    fn area() -> ServiceArea {
        ServiceArea {
            id: Uuid::new_v4(),
            name: "Marion County".to_string(),
            is_active: true,
            allow_pool_installs: true,
            allow_accessory_installs: true,
            permit_pool_fee_base: dec!(50.00),
            permit_accessory_fee_base: dec!(20.00),
            permit_pool_labor_hours: dec!(2),
            permit_accessory_labor_hours: dec!(1),
        }
    }

    fn profile(free_with_install: bool) -> ShippingProfile {
        ShippingProfile {
            id: Uuid::new_v4(),
            code: "ltl".to_string(),
            name: "LTL Pallet".to_string(),
            base_flat_rate: dec!(20.00),
            per_mile_rate: dec!(0.50),
            free_with_install,
        }
    }

    fn pool(shipping: Option<ShippingProfile>) -> Priceable {
        Priceable::Package(PoolPackage {
            id: Uuid::new_v4(),
            name: "18' Round".to_string(),
            sku: None,
            price: dec!(5000.00),
            is_active: true,
            install_days: dec!(2),
            install: Some(InstallProfile {
                rate: dec!(300.00),
                included_miles: dec!(30),
                per_mile_rate: dec!(2.00),
            }),
            shipping,
        })
    }

    fn pump(shipping: Option<ShippingProfile>) -> Priceable {
        Priceable::Equipment(EquipmentItem {
            id: Uuid::new_v4(),
            name: "Pump".to_string(),
            sku: None,
            price: dec!(450.00),
            is_active: true,
            install: Some(InstallProfile {
                rate: dec!(150.00),
                included_miles: dec!(50),
                per_mile_rate: dec!(1.50),
            }),
            shipping,
        })
    }

    fn order_with(lines: Vec<OrderLine>) -> Order {
        let mut order = Order::new_cart(Some("34470".to_string()));
        order.lines = lines;
        order
    }

    fn ctx<'a>(
        catalog: &'a CatalogSnapshot,
        service_area: Option<&'a ServiceArea>,
        distance: Option<Decimal>,
    ) -> PricingContext<'a, CatalogSnapshot> {
        PricingContext {
            origin: None,
            destination: None,
            service_area,
            catalog,
            distance_override: distance,
        }
    }

    #[test]
    fn test_line_amounts_scale_with_quantity() {
        let item = pump(Some(profile(false)));
        let line = OrderLine::new(item.product_ref(), 3, true);
        let catalog: CatalogSnapshot = [item].into_iter().collect();
        let order = order_with(vec![line]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(80))), &config()).unwrap();
        let priced = &outcome.order.lines[0];

        assert_eq!(priced.unit_price, dec!(450.00));
        assert_eq!(priced.line_subtotal, dec!(1350.00));
        assert_eq!(priced.line_install_amount, dec!(585.00)); // 195 * 3
        assert_eq!(priced.line_shipping_amount, dec!(180.00)); // 60 * 3
        assert_eq!(outcome.distance_source, DistanceSource::Override);
    }

    #[test]
    fn test_own_install_frees_opted_in_shipping() {
        let item = pump(Some(profile(true)));
        let line = OrderLine::new(item.product_ref(), 1, true);
        let catalog: CatalogSnapshot = [item].into_iter().collect();
        let order = order_with(vec![line]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(900))), &config()).unwrap();
        assert_eq!(outcome.order.lines[0].line_shipping_amount, dec!(0));
    }

    #[test]
    fn test_pool_install_frees_unrelated_opted_in_line() {
        let pool_item = pool(Some(profile(false)));
        let pump_item = pump(Some(profile(true)));
        let pool_line = OrderLine::new(pool_item.product_ref(), 1, true);
        let pump_line = OrderLine::new(pump_item.product_ref(), 1, false);
        let catalog: CatalogSnapshot = [pool_item, pump_item].into_iter().collect();
        let order = order_with(vec![pool_line, pump_line]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(40))), &config()).unwrap();
        assert_eq!(outcome.order.lines[1].line_shipping_amount, dec!(0));
        assert_eq!(outcome.order.lines[1].line_install_amount, dec!(0));
    }

    #[test]
    fn test_accessory_install_does_not_free_other_lines() {
        let pump_item = pump(Some(profile(false)));
        let other = pump(Some(profile(true)));
        let catalog: CatalogSnapshot = [pump_item.clone(), other.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(pump_item.product_ref(), 1, true),
            OrderLine::new(other.product_ref(), 1, false),
        ]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(40))), &config()).unwrap();
        assert_eq!(outcome.order.lines[1].line_shipping_amount, dec!(40.00));
    }

    #[test]
    fn test_permit_pool_wins_over_accessory() {
        let pool_item = pool(None);
        let pump_item = pump(None);
        let catalog: CatalogSnapshot = [pool_item.clone(), pump_item.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(pool_item.product_ref(), 1, true),
            OrderLine::new(pump_item.product_ref(), 1, true),
        ]);
        let area = area();

        let outcome =
            apply_pricing(&order, &ctx(&catalog, Some(&area), Some(dec!(10))), &config()).unwrap();
        assert_eq!(outcome.permit_kind, Some(InstallKind::Pool));
        assert_eq!(outcome.order.totals.permit_total, dec!(100.00));
    }

    #[test]
    fn test_permit_accessory_only() {
        let pump_item = pump(None);
        let catalog: CatalogSnapshot = [pump_item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(pump_item.product_ref(), 2, true)]);
        let area = area();

        let outcome =
            apply_pricing(&order, &ctx(&catalog, Some(&area), Some(dec!(10))), &config()).unwrap();
        // 20 + 1 * 25, charged once regardless of line count
        assert_eq!(outcome.order.totals.permit_total, dec!(45.00));
    }

    #[test]
    fn test_pool_without_install_next_to_accessory_install_charges_accessory_permit() {
        let pool_item = pool(None);
        let pump_item = pump(None);
        let catalog: CatalogSnapshot = [pool_item.clone(), pump_item.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(pool_item.product_ref(), 1, false),
            OrderLine::new(pump_item.product_ref(), 1, true),
        ]);
        let area = area();

        let outcome =
            apply_pricing(&order, &ctx(&catalog, Some(&area), Some(dec!(10))), &config()).unwrap();
        assert_eq!(outcome.permit_kind, Some(InstallKind::Accessory));
        assert_eq!(outcome.order.totals.permit_total, dec!(45.00));
    }

    #[test]
    fn test_missing_service_area_means_no_permit() {
        let pool_item = pool(None);
        let catalog: CatalogSnapshot = [pool_item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(pool_item.product_ref(), 1, true)]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(10))), &config()).unwrap();
        assert_eq!(outcome.order.totals.permit_total, dec!(0));
    }

    #[test]
    fn test_unknown_distance_prices_as_zero_miles() {
        let item = pump(Some(profile(false)));
        let catalog: CatalogSnapshot = [item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(item.product_ref(), 1, false)]);

        let outcome = apply_pricing(&order, &ctx(&catalog, None, None), &config()).unwrap();
        assert_eq!(outcome.distance_source, DistanceSource::Fallback);
        assert_eq!(outcome.distance_miles, dec!(0));
        assert_eq!(outcome.order.lines[0].line_shipping_amount, dec!(20.00));
    }

    #[test]
    fn test_resolved_distance_from_locations() {
        let item = pump(Some(profile(false)));
        let catalog: CatalogSnapshot = [item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(item.product_ref(), 1, false)]);
        let origin = Location {
            id: Uuid::new_v4(),
            zip_code: "00000".to_string(),
            city: String::new(),
            county: String::new(),
            state: String::new(),
            latitude: Some(0.0),
            longitude: Some(0.0),
            service_area_id: None,
            install_allowed: true,
        };
        let destination = Location {
            zip_code: "00001".to_string(),
            longitude: Some(1.0),
            ..origin.clone()
        };
        let context = PricingContext {
            origin: Some(&origin),
            destination: Some(&destination),
            service_area: None,
            catalog: &catalog,
            distance_override: None,
        };

        let outcome = apply_pricing(&order, &context, &config()).unwrap();
        assert_eq!(outcome.distance_source, DistanceSource::Resolved);
        assert_eq!(outcome.distance_miles, dec!(69.09));
        // 20 + 69.09 * 0.5 = 54.545 -> 54.54 (half-even)
        assert_eq!(outcome.order.lines[0].line_shipping_amount, dec!(54.54));
    }

    #[test]
    fn test_negative_distance_override_is_rejected() {
        let catalog = CatalogSnapshot::new();
        let order = order_with(vec![]);
        let result = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(-1))), &config());
        assert!(matches!(
            result,
            Err(PricingError::InvalidInput { ref field, .. }) if field == "distance_override"
        ));
    }

    #[test]
    fn test_oversized_distance_override_is_rejected() {
        let item = pool(Some(profile(false)));
        let catalog: CatalogSnapshot = [item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(item.product_ref(), 1, true)]);

        for miles in [Decimal::MAX, MAX_DISTANCE_OVERRIDE_MILES + dec!(0.01)] {
            let result = apply_pricing(&order, &ctx(&catalog, None, Some(miles)), &config());
            assert!(matches!(
                result,
                Err(PricingError::InvalidInput { ref field, .. }) if field == "distance_override"
            ));
        }

        let at_limit = ctx(&catalog, None, Some(MAX_DISTANCE_OVERRIDE_MILES));
        assert!(apply_pricing(&order, &at_limit, &config()).is_ok());
    }

    #[test]
    fn test_amount_overflow_is_invalid_input() {
        let Priceable::Equipment(mut item) = pump(None) else {
            unreachable!()
        };
        item.price = Decimal::MAX;
        let item = Priceable::Equipment(item);
        let catalog: CatalogSnapshot = [item.clone()].into_iter().collect();
        let order = order_with(vec![OrderLine::new(item.product_ref(), u32::MAX, false)]);

        let result = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(10))), &config());
        assert!(matches!(
            result,
            Err(PricingError::InvalidInput { ref field, .. }) if field == "quantity"
        ));
    }

    #[test]
    fn test_missing_catalog_reference_fails_fast() {
        let known = pump(None);
        let catalog: CatalogSnapshot = [known.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(known.product_ref(), 1, false),
            OrderLine::new(ProductRef::Package(Uuid::new_v4()), 1, false),
        ]);

        let result = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(5))), &config());
        assert!(matches!(result, Err(PricingError::NotFound { entity: "product", .. })));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let catalog = CatalogSnapshot::new();
        let order = order_with(vec![]);
        let bad = PricingConfig {
            permit_labor_hourly_rate: dec!(25.00),
            base_zip_code: String::new(),
        };
        let result = apply_pricing(&order, &ctx(&catalog, None, Some(dec!(5))), &bad);
        assert!(matches!(result, Err(PricingError::Configuration { .. })));
    }

    #[test]
    fn test_repricing_is_idempotent() {
        let pool_item = pool(Some(profile(true)));
        let pump_item = pump(Some(profile(true)));
        let catalog: CatalogSnapshot = [pool_item.clone(), pump_item.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(pool_item.product_ref(), 1, true),
            OrderLine::new(pump_item.product_ref(), 2, false),
        ]);
        let area = area();
        let context = ctx(&catalog, Some(&area), Some(dec!(57.33)));

        let once = apply_pricing(&order, &context, &config()).unwrap();
        let twice = apply_pricing(&once.order, &context, &config()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unit_price_snapshot_refreshes_on_rerun() {
        let item = pump(None);
        let line = OrderLine::new(item.product_ref(), 1, false);
        let catalog: CatalogSnapshot = [item.clone()].into_iter().collect();
        let first = apply_pricing(&order_with(vec![line]), &ctx(&catalog, None, Some(dec!(0))), &config())
            .unwrap();

        let Priceable::Equipment(mut repriced) = item else {
            unreachable!()
        };
        repriced.price = dec!(475.00);
        let catalog: CatalogSnapshot = [Priceable::Equipment(repriced)].into_iter().collect();

        // The stored snapshot is untouched until pricing runs again
        assert_eq!(first.order.lines[0].unit_price, dec!(450.00));
        let second = apply_pricing(&first.order, &ctx(&catalog, None, Some(dec!(0))), &config()).unwrap();
        assert_eq!(second.order.lines[0].unit_price, dec!(475.00));
    }

    #[test]
    fn test_grand_total_matches_sum_of_parts() {
        let pool_item = pool(Some(profile(false)));
        let pump_item = pump(Some(profile(false)));
        let catalog: CatalogSnapshot = [pool_item.clone(), pump_item.clone()].into_iter().collect();
        let order = order_with(vec![
            OrderLine::new(pool_item.product_ref(), 1, true),
            OrderLine::new(pump_item.product_ref(), 3, true),
        ]);
        let area = area();

        for miles in [dec!(0), dec!(12.37), dec!(49.99), dec!(133.33)] {
            let totals = apply_pricing(&order, &ctx(&catalog, Some(&area), Some(miles)), &config())
                .unwrap()
                .order
                .totals;
            assert_eq!(
                totals.grand_total,
                totals.subtotal
                    + totals.shipping_total
                    + totals.install_total
                    + totals.permit_total
                    + totals.tax_total
            );
            assert_eq!(totals.grand_total, round_money(totals.grand_total, 2));
        }
    }

    #[test]
    fn test_install_composition() {
        let lines = vec![
            OrderLine::new(ProductRef::Package(Uuid::new_v4()), 1, false),
            OrderLine::new(ProductRef::Equipment(Uuid::new_v4()), 1, true),
        ];
        let composition = InstallComposition::of(&lines);
        assert!(!composition.has_pool_install);
        assert!(composition.has_accessory_install);
        assert_eq!(composition.permit_kind(), Some(InstallKind::Accessory));
        assert_eq!(InstallComposition::of(&[]).permit_kind(), None);
    }
}
