//! Cart aggregation: grouping a flat cart-item list by pharmacy and
//! computing checkout totals. Pure functions, no I/O, safe to call on
//! every request.

use crate::models::{CartItem, CheckoutTotals, DeliveryOption, FeeSchedule, Money, PharmacyGroup};

/// Groups cart items by pharmacy, preserving first-seen pharmacy order,
/// with `subtotal = sum(unit_price * quantity)` per group.
pub fn group_by_pharmacy(items: &[CartItem]) -> Vec<PharmacyGroup> {
    let mut groups: Vec<PharmacyGroup> = Vec::new();

    for item in items {
        match groups.iter_mut().find(|g| g.pharmacy_id == item.pharmacy_id) {
            Some(group) => {
                group.subtotal += item.unit_price.times(item.quantity);
                group.items.push(item.clone());
            }
            None => groups.push(PharmacyGroup {
                pharmacy_id: item.pharmacy_id,
                subtotal: item.unit_price.times(item.quantity),
                items: vec![item.clone()],
            }),
        }
    }

    groups
}

/// Computes checkout totals over the pharmacy groups.
///
/// The delivery charge is flat per distinct pharmacy (each pharmacy
/// dispatches independently), not per item. The platform fee is a
/// percentage of the medicine total, rounded half-up to whole cents.
pub fn compute_order_totals(
    groups: &[PharmacyGroup],
    delivery_option: DeliveryOption,
    fees: &FeeSchedule,
) -> CheckoutTotals {
    let medicine_total: Money = groups.iter().map(|g| g.subtotal).sum();

    let delivery_charge = match delivery_option {
        DeliveryOption::Delivery => fees.flat_delivery_fee.times(groups.len() as i32),
        DeliveryOption::Pickup => Money::zero(),
    };

    let platform_fee = medicine_total.fee_basis_points(fees.platform_fee_basis_points);

    CheckoutTotals {
        medicine_total,
        delivery_charge,
        platform_fee,
        grand_total: medicine_total + delivery_charge + platform_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, pharmacy_id: i64, medicine_id: i64, price_cents: i64, qty: i32) -> CartItem {
        CartItem {
            id,
            customer_id: 1,
            pharmacy_id,
            medicine_id,
            quantity: qty,
            unit_price: Money::from_cents(price_cents),
        }
    }

    #[test]
    fn grouping_preserves_total_value() {
        let items = vec![
            item(1, 10, 100, 1000, 2),
            item(2, 20, 200, 500, 3),
            item(3, 10, 101, 250, 4),
            item(4, 30, 300, 12_345, 1),
        ];

        let groups = group_by_pharmacy(&items);
        assert_eq!(groups.len(), 3);

        let group_sum: Money = groups.iter().map(|g| g.subtotal).sum();
        let item_sum: Money = items.iter().map(|i| i.unit_price.times(i.quantity)).sum();
        assert_eq!(group_sum, item_sum);

        let p10 = groups.iter().find(|g| g.pharmacy_id == 10).unwrap();
        assert_eq!(p10.items.len(), 2);
        assert_eq!(p10.subtotal, Money::from_cents(2_000 + 1_000));
    }

    #[test]
    fn empty_cart_yields_zero_totals() {
        let groups = group_by_pharmacy(&[]);
        assert!(groups.is_empty());

        let totals = compute_order_totals(&groups, DeliveryOption::Delivery, &FeeSchedule::default());
        assert!(totals.grand_total.is_zero());
    }

    #[test]
    fn delivery_charge_scales_with_distinct_pharmacies() {
        let items = vec![
            item(1, 10, 100, 1000, 1),
            item(2, 10, 101, 1000, 1),
            item(3, 20, 200, 1000, 1),
        ];
        let groups = group_by_pharmacy(&items);
        let fees = FeeSchedule::default();

        let pickup = compute_order_totals(&groups, DeliveryOption::Pickup, &fees);
        assert!(pickup.delivery_charge.is_zero());

        let delivery = compute_order_totals(&groups, DeliveryOption::Delivery, &fees);
        // 2 distinct pharmacies, not 3 items
        assert_eq!(delivery.delivery_charge, fees.flat_delivery_fee.times(2));
    }

    #[test]
    fn two_pharmacy_delivery_cart_totals() {
        // 2 x 10.00 at one pharmacy and 3 x 5.00 at another, home delivery.
        let items = vec![item(1, 1, 100, 1000, 2), item(2, 2, 200, 500, 3)];
        let groups = group_by_pharmacy(&items);
        let totals = compute_order_totals(&groups, DeliveryOption::Delivery, &FeeSchedule::default());

        assert_eq!(totals.medicine_total.to_string(), "35.00");
        assert_eq!(totals.delivery_charge.to_string(), "120.00");
        assert_eq!(totals.platform_fee.to_string(), "0.11");
        assert_eq!(totals.grand_total.to_string(), "155.11");
    }
}
