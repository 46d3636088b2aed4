use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Exact decimal currency amount.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn zero() -> Self {
        Self::ZERO
    }

    /// `Money::new(1250, 2)` is 12.50.
    pub fn new(num: i64, scale: u32) -> Self {
        Self(Decimal::new(num, scale))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds half away from zero to `scale` decimal places, keeping trailing zeros.
    pub fn round_to(self, scale: u32) -> Self {
        let mut rounded = self
            .0
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(scale);
        Self(rounded)
    }

    /// Whole number of minor units, or `None` when the amount has sub-unit digits
    /// or does not fit.
    pub fn to_minor_units(self, scale: u32) -> Option<i64> {
        let units = self.0.checked_mul(minor_unit_factor(scale)?)?;
        if units.fract() != Decimal::ZERO {
            return None;
        }
        units.to_i64()
    }

    pub fn from_minor_units(units: i64, scale: u32) -> Self {
        Self(Decimal::new(units, scale))
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul_quantity(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(quantity)).map(Self)
    }

    /// Sums amounts, returning `None` if the total does not fit.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
    }
}

pub(crate) fn minor_unit_factor(scale: u32) -> Option<Decimal> {
    let factor = 10_i64.checked_pow(scale)?;
    Some(Decimal::from(factor))
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    /// Accepts plain decimals with an optional leading currency sign, e.g. `$12.50` or `-6`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let digits = rest.strip_prefix('$').unwrap_or(rest).replace(',', "");
        let value = Decimal::from_str(digits.trim())?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    /// Short code used in the text format, e.g. `A` for Alice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            abbreviation: None,
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = Some(abbreviation.into().trim().to_string());
        self
    }
}

fn default_weight() -> u32 {
    1
}

fn default_quantity() -> u32 {
    1
}

/// One participant's claim on a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub participant: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Share {
    pub fn new(participant: impl Into<String>) -> Self {
        Self::weighted(participant, 1)
    }

    pub fn weighted(participant: impl Into<String>, weight: u32) -> Self {
        Self {
            participant: participant.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub unit_price: Money,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Empty means the item is still unassigned.
    #[serde(default)]
    pub shares: Vec<Share>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, unit_price: Money) -> Self {
        Self {
            description: description.into(),
            unit_price,
            quantity: 1,
            shares: Vec::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Assigns the item in equal parts.
    pub fn shared_by<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shares = participants.into_iter().map(Share::new).collect();
        self
    }

    pub fn with_shares(mut self, shares: Vec<Share>) -> Self {
        self.shares = shares;
        self
    }

    /// Unit price times quantity, or `None` if the product does not fit.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul_quantity(self.quantity)
    }

    pub fn is_assigned(&self) -> bool {
        !self.shares.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Tax,
    Tip,
    Delivery,
}

impl FeeKind {
    pub const ALL: [FeeKind; 3] = [FeeKind::Tax, FeeKind::Delivery, FeeKind::Tip];

    /// Label used on bills and in the text format.
    pub fn label(self) -> &'static str {
        match self {
            FeeKind::Tax => "Tax",
            FeeKind::Tip => "Tip",
            FeeKind::Delivery => "Delivery Fee",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        FeeKind::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fee, charge or discount line as printed on the bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeItem {
    pub name: String,
    pub amount: Money,
    pub kind: FeeKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub tip: Money,
    #[serde(default)]
    pub delivery: Money,
}

impl Fees {
    pub fn get(&self, kind: FeeKind) -> Money {
        match kind {
            FeeKind::Tax => self.tax,
            FeeKind::Tip => self.tip,
            FeeKind::Delivery => self.delivery,
        }
    }

    pub fn set(&mut self, kind: FeeKind, amount: Money) {
        match kind {
            FeeKind::Tax => self.tax = amount,
            FeeKind::Tip => self.tip = amount,
            FeeKind::Delivery => self.delivery = amount,
        }
    }

    pub fn total(&self) -> Option<Money> {
        Money::checked_sum([self.tax, self.tip, self.delivery])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub participants: Vec<Participant>,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub fees: Fees,
    /// Total printed on the bill, checked against the computed total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_total: Option<Money>,
    /// Fee lines as read from the bill, kept for transparency during review.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_fees: Vec<FeeItem>,
}

impl Bill {
    pub fn new(participants: Vec<Participant>, items: Vec<LineItem>) -> Self {
        Self {
            participants,
            items,
            ..Self::default()
        }
    }

    pub fn with_fees(mut self, fees: Fees) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_declared_total(mut self, total: Money) -> Self {
        self.declared_total = Some(total);
        self
    }

    pub fn subtotal(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |total, item| total.checked_add(item.line_total()?))
    }

    /// Items plus fees; `None` when an amount overflows.
    pub fn total(&self) -> Option<Money> {
        self.subtotal()?.checked_add(self.fees.total()?)
    }

    pub fn participant(&self, name: &str) -> Option<&Participant> {
        let name = name.trim();
        self.participants.iter().find(|p| p.name == name)
    }

    pub fn participant_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.participants.iter().position(|p| p.name == name)
    }

    pub fn unassigned_items(&self) -> impl Iterator<Item = (usize, &LineItem)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_assigned())
    }
}

/// What one participant owes, with the parts it is made of.
///
/// `total` is authoritative; the parts are rounded independently for display and
/// may differ from it by a minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub participant: String,
    pub items: Money,
    pub tax: Money,
    pub tip: Money,
    pub delivery: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// One entry per participant, in session order.
    pub shares: Vec<ParticipantShare>,
    pub total: Money,
}

impl Split {
    pub fn amount_for(&self, participant: &str) -> Option<Money> {
        self.shares
            .iter()
            .find(|share| share.participant == participant)
            .map(|share| share.total)
    }

    pub fn sum(&self) -> Money {
        self.shares.iter().map(|share| share.total).sum()
    }
}
