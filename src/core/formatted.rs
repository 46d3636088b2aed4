//! Plain-text rendering of a bill used for review and manual correction.
//!
//! ```text
//! --- PERSONS ---
//! A: Alice
//! B: Bob
//!
//! --- ITEMS ---
//! Pizza: 20.00
//!
//! --- FEES ---
//! Tax: 2.00
//! Delivery Fee: 0.00
//! Tip: 3.00
//!
//! --- SHARES ---
//! Pizza: A, B
//! ```

use crate::core::draft::{BillDraft, DraftFee, DraftItem, DraftPerson, DraftShare};
use crate::domain::model::{Bill, FeeKind, Money};
use crate::utils::error::{Result, SplitError};
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

const SECTIONS: [&str; 4] = ["PERSONS", "ITEMS", "FEES", "SHARES"];
const TOTAL_LABEL: &str = "Total";

fn section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)--- PERSONS ---\n(.*?)\n--- ITEMS ---\n(.*?)\n--- FEES ---\n(.*?)\n--- SHARES ---\n?(.*)")
            .expect("section pattern is valid")
    })
}

/// Item lines may carry a quantity: `Beer x2: 4.50`.
fn quantity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*\S)\s+x(\d+)$").expect("quantity pattern is valid"))
}

pub fn render(bill: &Bill) -> String {
    let draft = BillDraft::from_bill(bill);
    let mut out = String::new();

    let _ = writeln!(out, "--- PERSONS ---");
    for person in &draft.persons {
        let _ = writeln!(out, "{}: {}", person.abbreviation, person.name);
    }

    let _ = writeln!(out, "\n--- ITEMS ---");
    for item in &draft.items {
        match item.quantity {
            Some(quantity) => {
                let _ = writeln!(out, "{} x{}: {}", item.name, quantity, item.price);
            }
            None => {
                let _ = writeln!(out, "{}: {}", item.name, item.price);
            }
        }
    }

    let _ = writeln!(out, "\n--- FEES ---");
    for fee in &draft.fees {
        let _ = writeln!(out, "{}: {}", fee.name, display_amount(fee.amount));
    }
    if let Some(total) = draft.total {
        let _ = writeln!(out, "{}: {}", TOTAL_LABEL, total);
    }

    let _ = writeln!(out, "\n--- SHARES ---");
    for share in &draft.item_shares {
        let _ = writeln!(out, "{}: {}", share.item, share.persons.join(", "));
    }

    out.trim_end().to_string()
}

/// Pads to two decimals without dropping finer digits.
fn display_amount(amount: Money) -> Money {
    if amount.as_decimal().scale() < 2 {
        amount.round_to(2)
    } else {
        amount
    }
}

pub fn parse(input: &str) -> Result<Bill> {
    let normalized = input.replace("\r\n", "\n");
    let captures = section_pattern().captures(&normalized).ok_or_else(|| SplitError::FormatError {
        message: format!(
            "could not find all required sections ({})",
            SECTIONS
                .iter()
                .map(|s| format!("--- {} ---", s))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })?;
    let section = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();

    let mut draft = BillDraft::default();

    for (name, value) in key_values(section(1), "person", Separator::First) {
        draft.persons.push(DraftPerson {
            abbreviation: name.to_string(),
            name: value.to_string(),
        });
    }
    if draft.persons.is_empty() {
        return Err(SplitError::FormatError {
            message: "no persons defined in the PERSONS section".to_string(),
        });
    }

    for (name, value) in key_values(section(2), "item", Separator::Last) {
        let price = parse_amount(value, name)?;
        let (name, quantity) = match quantity_pattern().captures(name) {
            Some(caps) => {
                let quantity = caps[2].parse::<u32>().map_err(|_| SplitError::FormatError {
                    message: format!("invalid quantity for item '{}'", name),
                })?;
                (caps[1].to_string(), Some(quantity))
            }
            None => (name.to_string(), None),
        };
        draft.items.push(DraftItem {
            name,
            price,
            quantity,
        });
    }

    let mut seen_fees = Vec::new();
    for (name, value) in key_values(section(3), "fee", Separator::Last) {
        if name.eq_ignore_ascii_case(TOTAL_LABEL) {
            draft.total = Some(parse_amount(value, name)?);
            continue;
        }
        let Some(kind) = FeeKind::from_label(name) else {
            tracing::warn!("Skipping unexpected fee line: {}: {}", name, value);
            continue;
        };
        seen_fees.push(kind);
        draft.fees.push(DraftFee {
            name: kind.label().to_string(),
            amount: parse_amount(value, name)?,
            kind: Some(kind),
        });
    }
    for kind in FeeKind::ALL {
        if !seen_fees.contains(&kind) {
            tracing::warn!("Fee '{}' not found in input, assuming 0.00", kind);
        }
    }

    for (item, value) in key_values(section(4), "shares", Separator::Last) {
        draft.item_shares.push(DraftShare {
            item: item.to_string(),
            persons: value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        });
    }

    Ok(draft.into_bill())
}

/// Which colon separates key from value. Person names may contain colons,
/// item names too, so each section splits on the side its value cannot contain.
#[derive(Clone, Copy)]
enum Separator {
    First,
    Last,
}

fn key_values<'a>(
    section: &'a str,
    kind: &'a str,
    separator: Separator,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    section.lines().filter_map(move |line| {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let pair = match separator {
            Separator::First => line.split_once(':'),
            Separator::Last => line.rsplit_once(':'),
        };
        match pair {
            Some((key, value)) if !key.trim().is_empty() => Some((key.trim(), value.trim())),
            _ => {
                tracing::warn!("Skipping malformed {} line: {}", kind, line);
                None
            }
        }
    })
}

fn parse_amount(value: &str, name: &str) -> Result<Money> {
    value.parse::<Money>().map_err(|_| SplitError::FormatError {
        message: format!("invalid amount '{}' for '{}'", value, name),
    })
}
