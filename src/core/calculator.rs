use crate::domain::model::{minor_unit_factor, Bill, FeeKind, LineItem, Money, ParticipantShare, Split};
use crate::utils::error::{Result, SplitError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a bill-level fee is divided among participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// In proportion to each participant's share of the item subtotal.
    Proportional,
    /// Equally among every participant on the bill.
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPolicy {
    /// Decimal places of the minor currency unit.
    pub scale: u32,
    /// Largest accepted gap between the declared and the computed total.
    pub tolerance: Money,
    pub tax: FeePolicy,
    pub tip: FeePolicy,
    pub delivery: FeePolicy,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            scale: 2,
            tolerance: Money::new(1, 2),
            tax: FeePolicy::Proportional,
            tip: FeePolicy::Proportional,
            delivery: FeePolicy::Equal,
        }
    }
}

impl SplitPolicy {
    pub fn fee_policy(&self, kind: FeeKind) -> FeePolicy {
        match kind {
            FeeKind::Tax => self.tax,
            FeeKind::Tip => self.tip,
            FeeKind::Delivery => self.delivery,
        }
    }
}

/// Computes what each participant owes.
///
/// Every share is first computed exactly, then floored to the minor unit. The
/// leftover units go one at a time to the participants with the largest
/// fractional remainder, earlier participants first on ties, so the split always
/// adds up to the bill total and is identical across runs.
#[derive(Debug, Clone, Default)]
pub struct SplitCalculator {
    policy: SplitPolicy,
}

impl SplitCalculator {
    pub fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SplitPolicy {
        &self.policy
    }

    pub fn calculate(&self, bill: &Bill) -> Result<Split> {
        validate_participants(bill)?;

        let count = bill.participants.len();
        let mut item_parts = vec![Decimal::ZERO; count];
        for (index, item) in bill.items.iter().enumerate() {
            allocate_item(bill, index, item, &mut item_parts)?;
        }

        let total = self.computed_total(bill)?;
        self.reconcile(bill, total)?;

        let subtotal = checked_sum(&item_parts)?;
        let tax = self.distribute_fee(bill, FeeKind::Tax, &item_parts, subtotal)?;
        let tip = self.distribute_fee(bill, FeeKind::Tip, &item_parts, subtotal)?;
        let delivery = self.distribute_fee(bill, FeeKind::Delivery, &item_parts, subtotal)?;

        let exact = (0..count)
            .map(|i| checked_sum(&[item_parts[i], tax[i], tip[i], delivery[i]]))
            .collect::<Result<Vec<Decimal>>>()?;
        let target_units = total
            .to_minor_units(self.policy.scale)
            .ok_or_else(|| out_of_range(total.as_decimal()))?;
        let units = allocate_minor_units(&exact, target_units, self.policy.scale)?;

        let scale = self.policy.scale;
        let shares: Vec<ParticipantShare> = bill
            .participants
            .iter()
            .enumerate()
            .map(|(i, participant)| ParticipantShare {
                participant: participant.name.clone(),
                items: Money::from_decimal(item_parts[i]).round_to(scale),
                tax: Money::from_decimal(tax[i]).round_to(scale),
                tip: Money::from_decimal(tip[i]).round_to(scale),
                delivery: Money::from_decimal(delivery[i]).round_to(scale),
                total: Money::from_minor_units(units[i], scale),
            })
            .collect();

        for share in &shares {
            tracing::debug!(
                participant = %share.participant,
                items = %share.items,
                tax = %share.tax,
                tip = %share.tip,
                delivery = %share.delivery,
                total = %share.total,
                "Split share"
            );
        }

        Ok(Split { shares, total })
    }

    /// Sum of line items and fees, rounded to the minor unit.
    pub fn computed_total(&self, bill: &Bill) -> Result<Money> {
        let total = bill
            .total()
            .ok_or_else(|| SplitError::AmountOutOfRange {
                amount: "sum of line items and fees".to_string(),
            })?
            .round_to(self.policy.scale);
        if total.to_minor_units(self.policy.scale).is_none() {
            return Err(out_of_range(total.as_decimal()));
        }
        Ok(total)
    }

    fn reconcile(&self, bill: &Bill, computed: Money) -> Result<()> {
        let Some(declared) = bill.declared_total else {
            return Ok(());
        };
        let difference = declared
            .checked_sub(computed)
            .ok_or_else(|| out_of_range(declared.as_decimal()))?;
        if difference.abs() > self.policy.tolerance {
            tracing::warn!(
                declared = %declared,
                computed = %computed,
                difference = %difference,
                "Declared total does not reconcile with line items and fees"
            );
            return Err(SplitError::Reconciliation {
                declared,
                computed,
                difference,
                tolerance: self.policy.tolerance,
            });
        }
        Ok(())
    }

    fn distribute_fee(
        &self,
        bill: &Bill,
        kind: FeeKind,
        item_parts: &[Decimal],
        subtotal: Decimal,
    ) -> Result<Vec<Decimal>> {
        let amount = bill.fees.get(kind).as_decimal();
        let count = item_parts.len();
        if amount.is_zero() || count == 0 {
            return Ok(vec![Decimal::ZERO; count]);
        }

        match self.policy.fee_policy(kind) {
            FeePolicy::Proportional if !subtotal.is_zero() => item_parts
                .iter()
                .map(|part| {
                    amount
                        .checked_mul(*part)
                        .and_then(|scaled| scaled.checked_div(subtotal))
                        .ok_or_else(|| out_of_range(amount))
                })
                .collect(),
            policy => {
                if policy == FeePolicy::Proportional {
                    tracing::warn!(
                        fee = %kind,
                        "Item subtotal is zero, dividing fee equally"
                    );
                }
                let each = amount / Decimal::from(count as u64);
                Ok(vec![each; count])
            }
        }
    }
}

fn validate_participants(bill: &Bill) -> Result<()> {
    if bill.participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    let mut seen = HashSet::with_capacity(bill.participants.len());
    for participant in &bill.participants {
        if !seen.insert(participant.name.as_str()) {
            return Err(SplitError::DuplicateParticipant {
                name: participant.name.clone(),
            });
        }
    }
    Ok(())
}

fn allocate_item(bill: &Bill, index: usize, item: &LineItem, parts: &mut [Decimal]) -> Result<()> {
    if item.unit_price.is_negative() {
        return Err(SplitError::InvalidPrice {
            index,
            price: item.unit_price,
        });
    }
    if item.quantity == 0 {
        return Err(SplitError::InvalidQuantity { index });
    }
    if !item.is_assigned() {
        return Err(SplitError::UnassignedItem {
            index,
            description: item.description.clone(),
        });
    }

    let mut resolved = Vec::with_capacity(item.shares.len());
    let mut total_weight: u64 = 0;
    for share in &item.shares {
        if share.weight == 0 {
            return Err(SplitError::InvalidWeight {
                index,
                name: share.participant.clone(),
            });
        }
        let participant = bill.participant_index(&share.participant).ok_or_else(|| {
            SplitError::UnknownParticipant {
                name: share.participant.clone(),
            }
        })?;
        total_weight += u64::from(share.weight);
        resolved.push((participant, share.weight));
    }

    let line_total = item
        .line_total()
        .ok_or_else(|| out_of_range(item.unit_price.as_decimal()))?
        .as_decimal();
    let total_weight = Decimal::from(total_weight);
    for (participant, weight) in resolved {
        let part = line_total
            .checked_mul(Decimal::from(weight))
            .and_then(|weighted| weighted.checked_div(total_weight))
            .and_then(|part| parts[participant].checked_add(part))
            .ok_or_else(|| out_of_range(line_total))?;
        parts[participant] = part;
    }
    Ok(())
}

/// Largest-remainder allocation of `target_units` minor units over exact amounts.
fn allocate_minor_units(exact: &[Decimal], target_units: i64, scale: u32) -> Result<Vec<i64>> {
    let factor = minor_unit_factor(scale).ok_or_else(|| out_of_range(Decimal::from(scale)))?;

    let mut units = Vec::with_capacity(exact.len());
    let mut remainders = Vec::with_capacity(exact.len());
    for amount in exact {
        let scaled = amount
            .checked_mul(factor)
            .ok_or_else(|| out_of_range(*amount))?;
        let floor = scaled.floor();
        units.push(floor.to_i64().ok_or_else(|| out_of_range(*amount))?);
        remainders.push(scaled - floor);
    }

    let leftover = units
        .iter()
        .try_fold(0i64, |sum, unit| sum.checked_add(*unit))
        .and_then(|sum| target_units.checked_sub(sum))
        .ok_or_else(|| out_of_range(Decimal::from(target_units)))?;
    if leftover == 0 || units.is_empty() {
        return Ok(units);
    }

    let mut ranked: Vec<usize> = (0..units.len()).collect();
    if leftover > 0 {
        ranked.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));
    } else {
        ranked.sort_by(|&a, &b| remainders[a].cmp(&remainders[b]).then(a.cmp(&b)));
    }

    let step = leftover.signum();
    let adjusted: Vec<usize> = ranked
        .iter()
        .copied()
        .cycle()
        .take(leftover.unsigned_abs() as usize)
        .collect();
    for &index in &adjusted {
        units[index] += step;
    }

    tracing::debug!(
        leftover_units = leftover,
        adjusted = ?adjusted,
        "Distributed rounding remainder"
    );
    Ok(units)
}

fn checked_sum(amounts: &[Decimal]) -> Result<Decimal> {
    amounts
        .iter()
        .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(*amount))
        .ok_or_else(|| out_of_range(amounts.iter().copied().max().unwrap_or_default()))
}

fn out_of_range(amount: Decimal) -> SplitError {
    SplitError::AmountOutOfRange {
        amount: amount.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Fees, LineItem, Participant, Share};

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn people(names: &[&str]) -> Vec<Participant> {
        names.iter().map(|name| Participant::new(*name)).collect()
    }

    #[test]
    fn pizza_with_tax_and_tip_splits_evenly() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Pizza", money("20.00")).shared_by(["Alice", "Bob"])],
        )
        .with_fees(Fees {
            tax: money("2.00"),
            tip: money("3.00"),
            delivery: Money::ZERO,
        })
        .with_declared_total(money("25.00"));

        let split = SplitCalculator::default().calculate(&bill).unwrap();

        assert_eq!(split.amount_for("Alice"), Some(money("12.50")));
        assert_eq!(split.amount_for("Bob"), Some(money("12.50")));
        assert_eq!(split.total, money("25.00"));
    }

    #[test]
    fn leftover_cent_goes_to_first_participant_on_tie() {
        let bill = Bill::new(
            people(&["Alice", "Bob", "Carol"]),
            vec![LineItem::new("Dinner", money("10.00")).shared_by(["Alice", "Bob", "Carol"])],
        );

        let calculator = SplitCalculator::default();
        let split = calculator.calculate(&bill).unwrap();

        assert_eq!(split.amount_for("Alice"), Some(money("3.34")));
        assert_eq!(split.amount_for("Bob"), Some(money("3.33")));
        assert_eq!(split.amount_for("Carol"), Some(money("3.33")));
        assert_eq!(split.sum(), money("10.00"));
        assert_eq!(calculator.calculate(&bill).unwrap(), split);
    }

    #[test]
    fn coffee_split_three_ways_sums_to_price() {
        let bill = Bill::new(
            people(&["Alice", "Bob", "Carol"]),
            vec![LineItem::new("Coffee", money("3.33")).shared_by(["Alice", "Bob", "Carol"])],
        )
        .with_declared_total(money("3.33"));

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.sum(), money("3.33"));
    }

    #[test]
    fn largest_remainder_wins_over_order() {
        // Alice: 0.333.., Bob: 0.666.. -> Bob's remainder is larger.
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Cake", money("0.01")).with_shares(vec![
                Share::weighted("Alice", 1),
                Share::weighted("Bob", 2),
            ])],
        );

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.amount_for("Alice"), Some(Money::ZERO));
        assert_eq!(split.amount_for("Bob"), Some(money("0.01")));
    }

    #[test]
    fn weighted_item_and_proportional_tax() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![
                LineItem::new("Wine", money("30.00")).with_shares(vec![
                    Share::weighted("Alice", 2),
                    Share::weighted("Bob", 1),
                ]),
                LineItem::new("Salad", money("10.00")).shared_by(["Bob"]),
            ],
        )
        .with_fees(Fees {
            tax: money("4.00"),
            ..Fees::default()
        });

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        let alice = &split.shares[0];
        let bob = &split.shares[1];

        assert_eq!(alice.items, money("20.00"));
        assert_eq!(alice.tax, money("2.00"));
        assert_eq!(alice.total, money("22.00"));
        assert_eq!(bob.total, money("22.00"));
    }

    #[test]
    fn delivery_fee_is_shared_by_everyone() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Burger", money("12.00")).shared_by(["Alice"])],
        )
        .with_fees(Fees {
            delivery: money("4.00"),
            ..Fees::default()
        });

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.amount_for("Alice"), Some(money("14.00")));
        assert_eq!(split.amount_for("Bob"), Some(money("2.00")));
    }

    #[test]
    fn unassigned_item_fails_before_split() {
        let bill = Bill::new(
            people(&["Alice"]),
            vec![
                LineItem::new("Soup", money("5.00")).shared_by(["Alice"]),
                LineItem::new("Bread", money("2.00")),
            ],
        );

        match SplitCalculator::default().calculate(&bill) {
            Err(SplitError::UnassignedItem { index, description }) => {
                assert_eq!(index, 1);
                assert_eq!(description, "Bread");
            }
            other => panic!("expected unassigned item error, got {:?}", other),
        }
    }

    #[test]
    fn reconciliation_respects_tolerance() {
        let items = vec![LineItem::new("Tea", money("4.00")).shared_by(["Alice"])];
        let calculator = SplitCalculator::default();

        let close = Bill::new(people(&["Alice"]), items.clone()).with_declared_total(money("4.01"));
        let split = calculator.calculate(&close).unwrap();
        assert_eq!(split.total, money("4.00"));

        let far = Bill::new(people(&["Alice"]), items).with_declared_total(money("5.00"));
        match calculator.calculate(&far) {
            Err(SplitError::Reconciliation { difference, .. }) => {
                assert_eq!(difference, money("1.00"))
            }
            other => panic!("expected reconciliation error, got {:?}", other),
        }
    }

    #[test]
    fn discounts_reduce_shares() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![
                LineItem::new("Pasta", money("15.00")).shared_by(["Alice"]),
                LineItem::new("Steak", money("25.00")).shared_by(["Bob"]),
            ],
        )
        .with_fees(Fees {
            tax: money("-4.00"),
            ..Fees::default()
        });

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.amount_for("Alice"), Some(money("13.50")));
        assert_eq!(split.amount_for("Bob"), Some(money("22.50")));
    }

    #[test]
    fn zero_subtotal_divides_fees_equally() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Water", Money::ZERO).shared_by(["Alice"])],
        )
        .with_fees(Fees {
            tip: money("1.00"),
            ..Fees::default()
        });

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.amount_for("Alice"), Some(money("0.50")));
        assert_eq!(split.amount_for("Bob"), Some(money("0.50")));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let calculator = SplitCalculator::default();

        let unknown = Bill::new(
            people(&["Alice"]),
            vec![LineItem::new("Tea", money("1.00")).shared_by(["Mallory"])],
        );
        assert!(matches!(
            calculator.calculate(&unknown),
            Err(SplitError::UnknownParticipant { .. })
        ));

        let negative = Bill::new(
            people(&["Alice"]),
            vec![LineItem::new("Refund", money("-1.00")).shared_by(["Alice"])],
        );
        assert!(matches!(
            calculator.calculate(&negative),
            Err(SplitError::InvalidPrice { index: 0, .. })
        ));

        let duplicate = Bill::new(people(&["Alice", "Alice"]), vec![]);
        assert!(matches!(
            calculator.calculate(&duplicate),
            Err(SplitError::DuplicateParticipant { .. })
        ));

        let nobody = Bill::new(vec![], vec![]);
        assert!(matches!(
            calculator.calculate(&nobody),
            Err(SplitError::NoParticipants)
        ));
    }

    #[test]
    fn overflowing_amounts_are_out_of_range() {
        let calculator = SplitCalculator::default();
        let max = Money::from_decimal(Decimal::MAX);

        let doubled = Bill::new(
            people(&["Alice"]),
            vec![LineItem::new("Yacht", max).with_quantity(2).shared_by(["Alice"])],
        );
        assert!(matches!(
            calculator.calculate(&doubled),
            Err(SplitError::AmountOutOfRange { .. })
        ));

        let two_lines = Bill::new(
            people(&["Alice"]),
            vec![
                LineItem::new("Yacht", max).shared_by(["Alice"]),
                LineItem::new("Dinghy", max).shared_by(["Alice"]),
            ],
        );
        assert!(matches!(
            calculator.calculate(&two_lines),
            Err(SplitError::AmountOutOfRange { .. })
        ));

        let huge_tax = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Tea", money("1.00")).shared_by(["Alice"])],
        )
        .with_fees(Fees {
            tax: max,
            tip: max,
            ..Fees::default()
        });
        assert!(matches!(
            calculator.calculate(&huge_tax),
            Err(SplitError::AmountOutOfRange { .. })
        ));
    }

    #[test]
    fn sub_cent_prices_are_rounded_to_total() {
        let bill = Bill::new(
            people(&["Alice", "Bob"]),
            vec![LineItem::new("Fuel", money("1.005")).shared_by(["Alice", "Bob"])],
        );

        let split = SplitCalculator::default().calculate(&bill).unwrap();
        assert_eq!(split.total, money("1.01"));
        assert_eq!(split.sum(), money("1.01"));
    }
}
