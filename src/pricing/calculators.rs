//! Core pricing calculation functions.
//!
//! Pure functions for pricing math - no database access.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

use super::error::PricingError;
use super::models::{InstallKind, OrderLine, OrderTotals, Priceable, ServiceArea, ShippingProfile};

/// Round to specified decimal places using banker's rounding (ROUND_HALF_EVEN).
///
/// Banker's rounding rounds to the nearest even number when the value is exactly
/// halfway between two possibilities. This reduces cumulative rounding bias.
///
/// # Examples
/// ```
/// use rust_decimal_macros::dec;
/// use poolco_pricing::pricing::round_money;
///
/// assert_eq!(round_money(dec!(2.5), 0), dec!(2));   // rounds to even
/// assert_eq!(round_money(dec!(3.5), 0), dec!(4));   // rounds to even
/// assert_eq!(round_money(dec!(1.234), 2), dec!(1.23));
/// ```
pub fn round_money(amount: Decimal, places: u32) -> Decimal {
    amount.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

/// `a * b`, or `InvalidInput` on `field` when the product overflows.
pub fn mul_money(a: Decimal, b: Decimal, field: &str) -> Result<Decimal, PricingError> {
    a.checked_mul(b)
        .ok_or_else(|| PricingError::invalid_input(field, "amount out of range"))
}

/// `a + b`, or `InvalidInput` on `field` when the sum overflows.
pub fn add_money(a: Decimal, b: Decimal, field: &str) -> Result<Decimal, PricingError> {
    a.checked_add(b)
        .ok_or_else(|| PricingError::invalid_input(field, "amount out of range"))
}

/// Miles beyond the included allowance, clamped at zero.
pub fn excess_miles(distance_miles: Decimal, included_miles: Decimal) -> Decimal {
    if distance_miles <= included_miles {
        return Decimal::ZERO;
    }
    // Saturates; the per-mile multiply then reports the overflow
    distance_miles
        .checked_sub(included_miles)
        .unwrap_or(Decimal::MAX)
}

/// Per-unit shipping estimate for a shipping profile.
///
/// Free when the profile opts in and `with_install` is set. Otherwise
/// `base_flat_rate + distance * per_mile_rate`, with an unknown distance
/// contributing nothing.
pub fn estimate_shipping(
    profile: &ShippingProfile,
    distance_miles: Option<Decimal>,
    with_install: bool,
) -> Result<Decimal, PricingError> {
    if profile.free_with_install && with_install {
        return Ok(Decimal::ZERO);
    }

    let mileage = match distance_miles {
        Some(miles) => mul_money(miles, profile.per_mile_rate, "shipping")?,
        None => Decimal::ZERO,
    };

    add_money(profile.base_flat_rate, mileage, "shipping")
}

/// Per-unit install estimate.
///
/// Equipment: `base_rate + excess_miles * per_mile_rate`.
/// Package: `install_days * daily_rate + excess_miles * per_mile_rate`.
/// Zero when the product has no install profile.
pub fn estimate_install(
    priceable: &Priceable,
    distance_miles: Decimal,
) -> Result<Decimal, PricingError> {
    let Some(profile) = priceable.install() else {
        return Ok(Decimal::ZERO);
    };

    let labor = match priceable {
        Priceable::Package(package) => mul_money(package.install_days, profile.rate, "install")?,
        Priceable::Equipment(_) => profile.rate,
    };
    let mileage = mul_money(
        excess_miles(distance_miles, profile.included_miles),
        profile.per_mile_rate,
        "install",
    )?;

    add_money(labor, mileage, "install")
}

/// Permit charge for a service area: `base_fee + labor_hours * hourly_rate`.
pub fn permit_charge(
    area: &ServiceArea,
    kind: InstallKind,
    hourly_rate: Decimal,
) -> Result<Decimal, PricingError> {
    let (base_fee, labor_hours) = area.permit_schedule(kind);
    let labor = mul_money(labor_hours, hourly_rate, "permit")?;
    add_money(base_fee, labor, "permit")
}

/// Aggregate priced lines into order totals.
///
/// Tax is a placeholder and always zero.
pub fn calculate_totals(
    lines: &[OrderLine],
    permit_total: Decimal,
) -> Result<OrderTotals, PricingError> {
    let mut subtotal = Decimal::ZERO;
    let mut shipping_total = Decimal::ZERO;
    let mut install_total = Decimal::ZERO;

    for line in lines {
        subtotal = add_money(subtotal, line.line_subtotal, "subtotal")?;
        shipping_total = add_money(shipping_total, line.line_shipping_amount, "shipping_total")?;
        install_total = add_money(install_total, line.line_install_amount, "install_total")?;
    }

    OrderTotals::compose(
        subtotal,
        shipping_total,
        install_total,
        permit_total,
        Decimal::ZERO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::{EquipmentItem, InstallProfile, PoolPackage, ProductRef};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn shipping(flat: Decimal, per_mile: Decimal, free_with_install: bool) -> ShippingProfile {
        ShippingProfile {
            id: Uuid::new_v4(),
            code: "pool_freight".to_string(),
            name: "Pool Freight".to_string(),
            base_flat_rate: flat,
            per_mile_rate: per_mile,
            free_with_install,
        }
    }

    fn equipment(install: Option<InstallProfile>) -> Priceable {
        Priceable::Equipment(EquipmentItem {
            id: Uuid::new_v4(),
            name: "Variable Speed Pump".to_string(),
            sku: Some("VSP-150".to_string()),
            price: dec!(899.00),
            is_active: true,
            install,
            shipping: None,
        })
    }

    fn package(days: Decimal, install: InstallProfile) -> Priceable {
        Priceable::Package(PoolPackage {
            id: Uuid::new_v4(),
            name: "24' Round Above-Ground".to_string(),
            sku: None,
            price: dec!(7999.00),
            is_active: true,
            install_days: days,
            install: Some(install),
            shipping: None,
        })
    }

    fn service_area() -> ServiceArea {
        ServiceArea {
            id: Uuid::new_v4(),
            name: "Marion County".to_string(),
            is_active: true,
            allow_pool_installs: true,
            allow_accessory_installs: true,
            permit_pool_fee_base: dec!(50.00),
            permit_accessory_fee_base: dec!(20.00),
            permit_pool_labor_hours: dec!(2),
            permit_accessory_labor_hours: dec!(0.5),
        }
    }

    // ==================== round_money tests ====================

    #[test]
    fn test_round_money_bankers_rounding_to_even() {
        assert_eq!(round_money(dec!(2.5), 0), dec!(2));
        assert_eq!(round_money(dec!(3.5), 0), dec!(4));
        assert_eq!(round_money(dec!(2.25), 1), dec!(2.2));
        assert_eq!(round_money(dec!(2.35), 1), dec!(2.4));
    }

    #[test]
    fn test_round_money_normal_rounding() {
        assert_eq!(round_money(dec!(1.234), 2), dec!(1.23));
        assert_eq!(round_money(dec!(1.236), 2), dec!(1.24));
        assert_eq!(round_money(dec!(999999.995), 2), dec!(1000000.00));
    }

    // ==================== shipping tests ====================

    #[test]
    fn test_shipping_flat_plus_mileage() {
        let profile = shipping(dec!(20.00), dec!(0.50), false);
        assert_eq!(estimate_shipping(&profile, Some(dec!(40)), false).unwrap(), dec!(40.00));
    }

    #[test]
    fn test_shipping_unknown_distance_charges_flat_rate_only() {
        let profile = shipping(dec!(20.00), dec!(0.50), false);
        assert_eq!(estimate_shipping(&profile, None, false).unwrap(), dec!(20.00));
    }

    #[test]
    fn test_shipping_free_with_install_only_when_both_set() {
        let free = shipping(dec!(20.00), dec!(0.50), true);
        assert_eq!(estimate_shipping(&free, Some(dec!(500)), true).unwrap(), dec!(0));
        assert_eq!(estimate_shipping(&free, Some(dec!(40)), false).unwrap(), dec!(40.00));

        let not_free = shipping(dec!(20.00), dec!(0.50), false);
        assert_eq!(estimate_shipping(&not_free, Some(dec!(40)), true).unwrap(), dec!(40.00));
    }

    #[test]
    fn test_shipping_non_decreasing_in_distance() {
        let profile = shipping(dec!(15.00), dec!(0.35), false);
        let mut previous = Decimal::ZERO;
        for miles in 0..300 {
            let cost = estimate_shipping(&profile, Some(Decimal::from(miles)), false).unwrap();
            assert!(cost >= previous, "shipping dropped at {} miles", miles);
            previous = cost;
        }
    }

    // ==================== install tests ====================

    #[test]
    fn test_equipment_install_beyond_included_miles() {
        let item = equipment(Some(InstallProfile {
            rate: dec!(150.00),
            included_miles: dec!(50),
            per_mile_rate: dec!(1.50),
        }));
        assert_eq!(estimate_install(&item, dec!(80)).unwrap(), dec!(195.00));
    }

    #[test]
    fn test_equipment_install_clamps_short_trips() {
        let item = equipment(Some(InstallProfile {
            rate: dec!(150.00),
            included_miles: dec!(50),
            per_mile_rate: dec!(1.50),
        }));
        assert_eq!(estimate_install(&item, dec!(30)).unwrap(), dec!(150.00));
    }

    #[test]
    fn test_equipment_without_install_profile_is_free() {
        assert_eq!(estimate_install(&equipment(None), dec!(80)).unwrap(), dec!(0));
    }

    #[test]
    fn test_package_install_priced_per_day() {
        let pool = package(
            dec!(2.5),
            InstallProfile {
                rate: dec!(400.00),
                included_miles: dec!(25),
                per_mile_rate: dec!(2.00),
            },
        );
        // 2.5 * 400 + (45 - 25) * 2
        assert_eq!(estimate_install(&pool, dec!(45)).unwrap(), dec!(1040.00));
        assert_eq!(estimate_install(&pool, dec!(10)).unwrap(), dec!(1000.00));
    }

    #[test]
    fn test_install_non_decreasing_in_distance() {
        let item = equipment(Some(InstallProfile {
            rate: dec!(150.00),
            included_miles: dec!(50),
            per_mile_rate: dec!(1.50),
        }));
        let mut previous = Decimal::ZERO;
        for miles in 0..200 {
            let cost = estimate_install(&item, Decimal::from(miles)).unwrap();
            assert!(cost >= previous, "install dropped at {} miles", miles);
            previous = cost;
        }
    }

    // ==================== permit tests ====================

    #[test]
    fn test_pool_permit_charge() {
        assert_eq!(
            permit_charge(&service_area(), InstallKind::Pool, dec!(25.00)).unwrap(),
            dec!(100.00)
        );
    }

    #[test]
    fn test_accessory_permit_charge() {
        // 20 + 0.5 * 25
        assert_eq!(
            permit_charge(&service_area(), InstallKind::Accessory, dec!(25.00)).unwrap(),
            dec!(32.50)
        );
    }

    // ==================== overflow tests ====================

    #[test]
    fn test_shipping_overflow_is_invalid_input() {
        let profile = shipping(dec!(20.00), dec!(2.00), false);
        let err = estimate_shipping(&profile, Some(Decimal::MAX), false).unwrap_err();
        assert!(matches!(err, PricingError::InvalidInput { ref field, .. } if field == "shipping"));
    }

    #[test]
    fn test_install_overflow_is_invalid_input() {
        let item = equipment(Some(InstallProfile {
            rate: dec!(150.00),
            included_miles: dec!(50),
            per_mile_rate: dec!(1.50),
        }));
        let err = estimate_install(&item, Decimal::MAX).unwrap_err();
        assert_eq!(err.error_type(), "invalid_input");
    }

    #[test]
    fn test_excess_miles_clamps_and_saturates() {
        assert_eq!(excess_miles(dec!(10), dec!(50)), dec!(0));
        assert_eq!(excess_miles(dec!(80), dec!(50)), dec!(30));
        assert_eq!(excess_miles(Decimal::MAX, dec!(-1)), Decimal::MAX);
    }

    #[test]
    fn test_totals_overflow_is_invalid_input() {
        let mut line = OrderLine::new(ProductRef::Equipment(Uuid::new_v4()), 1, false);
        line.line_subtotal = Decimal::MAX;
        let result = calculate_totals(&[line.clone(), line], Decimal::ZERO);
        assert!(matches!(result, Err(PricingError::InvalidInput { .. })));
    }

    // ==================== calculate_totals tests ====================

    #[test]
    fn test_calculate_totals_sums_lines_and_permit() {
        let mut pool = OrderLine::new(ProductRef::Package(Uuid::new_v4()), 1, true);
        pool.line_subtotal = dec!(7999.00);
        pool.line_install_amount = dec!(1200.00);

        let mut pump = OrderLine::new(ProductRef::Equipment(Uuid::new_v4()), 2, false);
        pump.line_subtotal = dec!(1798.00);
        pump.line_shipping_amount = dec!(80.00);

        let totals = calculate_totals(&[pool, pump], dec!(100.00)).unwrap();

        assert_eq!(totals.subtotal, dec!(9797.00));
        assert_eq!(totals.shipping_total, dec!(80.00));
        assert_eq!(totals.install_total, dec!(1200.00));
        assert_eq!(totals.permit_total, dec!(100.00));
        assert_eq!(totals.tax_total, dec!(0));
        assert_eq!(totals.grand_total, dec!(11177.00));
    }

    #[test]
    fn test_calculate_totals_empty_order() {
        let totals = calculate_totals(&[], Decimal::ZERO).unwrap();
        assert_eq!(totals, OrderTotals::default());
    }
}
