use crate::domain::model::{FeeItem, FeeKind, Fees, Money};

const DELIVERY_KEYWORDS: [&str; 4] = ["delivery", "shipping", "transport", "courier"];
const TIP_KEYWORDS: [&str; 2] = ["tip", "gratuity"];

/// Sorts a fee line into a category by its printed name.
///
/// Anything not clearly delivery or tip related is treated as tax, including
/// service fees and discounts.
pub fn categorize(name: &str) -> FeeKind {
    let lower = name.to_lowercase();
    if DELIVERY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        FeeKind::Delivery
    } else if lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| TIP_KEYWORDS.contains(&word))
    {
        FeeKind::Tip
    } else {
        FeeKind::Tax
    }
}

pub fn fee_item(name: impl Into<String>, amount: Money) -> FeeItem {
    let name = name.into();
    let kind = categorize(&name);
    FeeItem { name, amount, kind }
}

pub fn totals(items: &[FeeItem]) -> Fees {
    let mut fees = Fees::default();
    for item in items {
        let current = fees.get(item.kind);
        match current.checked_add(item.amount) {
            Some(sum) => fees.set(item.kind, sum),
            None => tracing::warn!("Fee '{}' does not fit into the {} total, skipping", item.name, item.kind),
        }
    }
    fees
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_by_keyword() {
        assert_eq!(categorize("Delivery Fee"), FeeKind::Delivery);
        assert_eq!(categorize("Free Delivery"), FeeKind::Delivery);
        assert_eq!(categorize("Shipping & Handling"), FeeKind::Delivery);
        assert_eq!(categorize("Driver Tip"), FeeKind::Tip);
        assert_eq!(categorize("Gratuity"), FeeKind::Tip);
        assert_eq!(categorize("Sales Tax"), FeeKind::Tax);
        assert_eq!(categorize("Service Fee"), FeeKind::Tax);
        assert_eq!(categorize("Membership Benefit"), FeeKind::Tax);
    }

    #[test]
    fn tip_must_be_a_whole_word() {
        assert_eq!(categorize("Multiple Items Surcharge"), FeeKind::Tax);
        assert_eq!(categorize("Stipend"), FeeKind::Tax);
    }

    #[test]
    fn totals_fold_discounts_into_their_category() {
        let items = vec![
            fee_item("Sales Tax", Money::new(300, 2)),
            fee_item("Membership Benefit", Money::new(-600, 2)),
            fee_item("Delivery Fee", Money::new(499, 2)),
            fee_item("Free Delivery", Money::new(-499, 2)),
            fee_item("Driver Tip", Money::new(500, 2)),
        ];

        let fees = totals(&items);
        assert_eq!(fees.tax, Money::new(-300, 2));
        assert_eq!(fees.delivery, Money::ZERO);
        assert_eq!(fees.tip, Money::new(500, 2));
    }
}
