use crate::core::fees;
use crate::domain::model::{Bill, FeeItem, FeeKind, LineItem, Money, Participant, Share};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A bill as described by the parser or the text format: people are referred
/// to by abbreviation and items by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDraft {
    #[serde(default)]
    pub persons: Vec<DraftPerson>,
    #[serde(default)]
    pub items: Vec<DraftItem>,
    #[serde(default)]
    pub fees: Vec<DraftFee>,
    #[serde(default)]
    pub item_shares: Vec<DraftShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPerson {
    pub abbreviation: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub name: String,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftFee {
    pub name: String,
    pub amount: Money,
    /// Left empty by the parser; filled in by keyword categorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FeeKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftShare {
    pub item: String,
    /// Abbreviations, optionally suffixed with `*weight`.
    pub persons: Vec<String>,
}

impl BillDraft {
    /// Resolves abbreviations and item names into a [`Bill`].
    ///
    /// Lines that cannot be resolved are dropped with a warning; an item left
    /// without any valid sharer stays unassigned so the review step can flag it.
    pub fn into_bill(self) -> Bill {
        let mut participants: Vec<Participant> = Vec::with_capacity(self.persons.len());
        let mut seen_abbreviations = HashSet::new();
        for person in self.persons {
            let name = person.name.trim();
            let abbreviation = person.abbreviation.trim();
            if name.is_empty() {
                tracing::warn!("Skipping person '{}' without a name", abbreviation);
                continue;
            }
            if participants.iter().any(|p| p.name == name) {
                tracing::warn!("Skipping duplicate person '{}'", name);
                continue;
            }
            let mut participant = Participant::new(name);
            if !abbreviation.is_empty() && seen_abbreviations.insert(abbreviation.to_string()) {
                participant = participant.with_abbreviation(abbreviation);
            } else if !abbreviation.is_empty() {
                tracing::warn!("Abbreviation '{}' is used twice, ignoring it for '{}'", abbreviation, name);
            }
            participants.push(participant);
        }

        let mut items: Vec<LineItem> = self
            .items
            .into_iter()
            .map(|item| {
                LineItem::new(item.name.trim(), item.price).with_quantity(item.quantity.unwrap_or(1))
            })
            .collect();
        if items.is_empty() {
            tracing::warn!("Bill has no line items");
        }

        let raw_fees: Vec<FeeItem> = self
            .fees
            .into_iter()
            .map(|fee| {
                let name = fee.name.trim().to_string();
                let kind = fee.kind.unwrap_or_else(|| fees::categorize(&name));
                FeeItem {
                    name,
                    amount: fee.amount,
                    kind,
                }
            })
            .collect();

        // A share line names one item; repeated names fill their items in order.
        let mut targeted = vec![false; items.len()];
        for share in self.item_shares {
            let item_name = share.item.trim();
            let Some(target) = share_target(&items, &targeted, item_name) else {
                tracing::warn!(
                    "Item '{}' in shares matches no remaining item",
                    item_name
                );
                continue;
            };
            targeted[target] = true;

            let mut resolved: Vec<Share> = Vec::new();
            for entry in &share.persons {
                let (reference, weight) = split_weight(entry);
                let Some(participant) = resolve_person(&participants, reference) else {
                    tracing::warn!("Unknown person '{}' for item '{}', skipping", reference, item_name);
                    continue;
                };
                match resolved.iter_mut().find(|s| s.participant == participant.name) {
                    Some(existing) => match existing.weight.checked_add(weight) {
                        Some(total) => existing.weight = total,
                        None => tracing::warn!(
                            "Weight for '{}' on item '{}' is too large, skipping '{}'",
                            participant.name,
                            item_name,
                            entry
                        ),
                    },
                    None => resolved.push(Share::weighted(participant.name.clone(), weight)),
                }
            }
            if resolved.is_empty() {
                tracing::warn!("No valid sharers for item '{}'; it stays unassigned", item_name);
            }
            items[target].shares = resolved;
        }

        Bill {
            participants,
            items,
            fees: fees::totals(&raw_fees),
            declared_total: self.total,
            raw_fees,
        }
    }

    /// Describes an existing bill, giving every participant a unique abbreviation.
    pub fn from_bill(bill: &Bill) -> Self {
        let abbreviations = abbreviations(&bill.participants);
        let abbreviation_of = |name: &str| {
            bill.participant_index(name)
                .map(|i| abbreviations[i].clone())
                .unwrap_or_else(|| name.to_string())
        };

        let persons = bill
            .participants
            .iter()
            .zip(&abbreviations)
            .map(|(participant, abbreviation)| DraftPerson {
                abbreviation: abbreviation.clone(),
                name: participant.name.clone(),
            })
            .collect();

        let items = bill
            .items
            .iter()
            .map(|item| DraftItem {
                name: item.description.clone(),
                price: item.unit_price,
                quantity: (item.quantity != 1).then_some(item.quantity),
            })
            .collect();

        let fees = FeeKind::ALL
            .into_iter()
            .map(|kind| DraftFee {
                name: kind.label().to_string(),
                amount: bill.fees.get(kind),
                kind: Some(kind),
            })
            .collect();

        let keys = share_keys(&bill.items);
        let item_shares = bill
            .items
            .iter()
            .zip(keys)
            .filter(|(item, _)| item.is_assigned())
            .map(|(item, key)| DraftShare {
                item: key,
                persons: item
                    .shares
                    .iter()
                    .map(|share| {
                        let abbreviation = abbreviation_of(&share.participant);
                        if share.weight == 1 {
                            abbreviation
                        } else {
                            format!("{}*{}", abbreviation, share.weight)
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            persons,
            items,
            fees,
            item_shares,
            total: bill.declared_total,
        }
    }
}

fn items_named<'a>(items: &'a [LineItem], name: &'a str) -> impl Iterator<Item = usize> + 'a {
    items
        .iter()
        .enumerate()
        .filter(move |(_, item)| item.description.eq_ignore_ascii_case(name))
        .map(|(index, _)| index)
}

/// Finds the item a share line refers to: the first item with that name not yet
/// given a share line, or the n-th item named `base` for a `base #n` key.
fn share_target(items: &[LineItem], targeted: &[bool], key: &str) -> Option<usize> {
    if let Some(index) = items_named(items, key).find(|&index| !targeted[index]) {
        return Some(index);
    }
    let (base, ordinal) = key.rsplit_once(" #")?;
    let ordinal = ordinal.trim().parse::<usize>().ok()?.checked_sub(1)?;
    items_named(items, base.trim()).nth(ordinal)
}

/// Share-line keys for each item. Names used by more than one item get an
/// ordinal, `Soda #1` and `Soda #2`, so every line points at a single item.
fn share_keys(items: &[LineItem]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    items
        .iter()
        .map(|item| {
            let count = items
                .iter()
                .filter(|other| other.description.eq_ignore_ascii_case(&item.description))
                .count();
            if count < 2 {
                return item.description.clone();
            }
            let ordinal = seen.entry(item.description.to_ascii_lowercase()).or_insert(0);
            *ordinal += 1;
            format!("{} #{}", item.description, ordinal)
        })
        .collect()
}

fn split_weight(entry: &str) -> (&str, u32) {
    match entry.rsplit_once('*') {
        Some((reference, weight)) => match weight.trim().parse::<u32>() {
            Ok(weight) if weight > 0 => (reference.trim(), weight),
            _ => (entry.trim(), 1),
        },
        None => (entry.trim(), 1),
    }
}

fn resolve_person<'a>(participants: &'a [Participant], reference: &str) -> Option<&'a Participant> {
    participants
        .iter()
        .find(|p| p.abbreviation.as_deref() == Some(reference))
        .or_else(|| participants.iter().find(|p| p.name == reference))
}

/// Unique abbreviations in participant order. Existing ones are kept, others
/// derive from the initial and get a numeric suffix on collision.
pub fn abbreviations(participants: &[Participant]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(participants.len());
    for participant in participants {
        let base = participant
            .abbreviation
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| {
                participant
                    .name
                    .chars()
                    .next()
                    .map(|c| c.to_uppercase().collect())
                    .unwrap_or_else(|| "P".to_string())
            });
        let mut candidate = base.clone();
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
        taken.insert(candidate.clone());
        result.push(candidate);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn person(abbreviation: &str, name: &str) -> DraftPerson {
        DraftPerson {
            abbreviation: abbreviation.to_string(),
            name: name.to_string(),
        }
    }

    fn item(name: &str, price: &str) -> DraftItem {
        DraftItem {
            name: name.to_string(),
            price: money(price),
            quantity: None,
        }
    }

    fn share(item: &str, persons: &[&str]) -> DraftShare {
        DraftShare {
            item: item.to_string(),
            persons: persons.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn resolves_abbreviations_and_categorizes_fees() {
        let draft = BillDraft {
            persons: vec![person("V", "Vikram"), person("A", "Alice")],
            items: vec![item("Pizza", "18.00"), item("Salad", "9.50")],
            fees: vec![
                DraftFee {
                    name: "Sales Tax".to_string(),
                    amount: money("2.40"),
                    kind: None,
                },
                DraftFee {
                    name: "Driver Tip".to_string(),
                    amount: money("4.00"),
                    kind: None,
                },
            ],
            item_shares: vec![share("Pizza", &["V", "A"]), share("Salad", &["V"])],
            total: Some(money("33.90")),
        };

        let bill = draft.into_bill();
        assert_eq!(bill.participants.len(), 2);
        assert_eq!(bill.participants[0].abbreviation.as_deref(), Some("V"));
        assert_eq!(bill.items[0].shares.len(), 2);
        assert_eq!(bill.items[1].shares, vec![Share::new("Vikram")]);
        assert_eq!(bill.fees.tax, money("2.40"));
        assert_eq!(bill.fees.tip, money("4.00"));
        assert_eq!(bill.declared_total, Some(money("33.90")));
    }

    #[test]
    fn unknown_references_are_dropped() {
        let draft = BillDraft {
            persons: vec![person("A", "Alice")],
            items: vec![item("Soup", "5.00")],
            item_shares: vec![share("Soup", &["Z"]), share("Ghost Item", &["A"])],
            ..BillDraft::default()
        };

        let bill = draft.into_bill();
        assert!(!bill.items[0].is_assigned());
        assert_eq!(bill.items.len(), 1);
    }

    #[test]
    fn weights_and_full_names_are_accepted() {
        let draft = BillDraft {
            persons: vec![person("A", "Alice"), person("B", "Bob")],
            items: vec![item("Wine", "30.00")],
            item_shares: vec![share("wine", &["A*2", "Bob"])],
            ..BillDraft::default()
        };

        let bill = draft.into_bill();
        assert_eq!(
            bill.items[0].shares,
            vec![Share::weighted("Alice", 2), Share::weighted("Bob", 1)]
        );
    }

    #[test]
    fn repeated_weights_that_overflow_are_skipped() {
        let draft = BillDraft {
            persons: vec![person("A", "Alice")],
            items: vec![item("Tea", "3.00")],
            item_shares: vec![share("Tea", &["A*4294967295", "A*1"])],
            ..BillDraft::default()
        };

        let bill = draft.into_bill();
        assert_eq!(bill.items[0].shares, vec![Share::weighted("Alice", u32::MAX)]);
    }

    #[test]
    fn repeated_item_names_fill_in_order() {
        let draft = BillDraft {
            persons: vec![person("A", "Alice"), person("B", "Bob")],
            items: vec![item("Soda", "2.00"), item("Soda", "2.00"), item("Fries", "3.00")],
            item_shares: vec![share("Soda", &["A"]), share("Soda", &["B"]), share("Soda", &["A"])],
            ..BillDraft::default()
        };

        let bill = draft.into_bill();
        assert_eq!(bill.items[0].shares, vec![Share::new("Alice")]);
        assert_eq!(bill.items[1].shares, vec![Share::new("Bob")]);
        assert!(!bill.items[2].is_assigned());
    }

    #[test]
    fn ordinal_keys_pick_one_of_several_items() {
        let draft = BillDraft {
            persons: vec![person("A", "Alice")],
            items: vec![item("Fries", "3.00"), item("Fries", "3.00")],
            item_shares: vec![share("Fries #2", &["A"])],
            ..BillDraft::default()
        };

        let bill = draft.into_bill();
        assert!(!bill.items[0].is_assigned());
        assert_eq!(bill.items[1].shares, vec![Share::new("Alice")]);
    }

    #[test]
    fn duplicate_names_get_ordinal_share_keys() {
        let bill = Bill::new(
            vec![Participant::new("Alice")],
            vec![
                LineItem::new("Soda", money("2.00")).shared_by(["Alice"]),
                LineItem::new("Tea", money("3.00")).shared_by(["Alice"]),
                LineItem::new("soda", money("2.00")).shared_by(["Alice"]),
            ],
        );

        let draft = BillDraft::from_bill(&bill);
        let keys: Vec<&str> = draft.item_shares.iter().map(|s| s.item.as_str()).collect();
        assert_eq!(keys, vec!["Soda #1", "Tea", "soda #2"]);
        assert_eq!(draft.items[2].name, "soda");
    }

    #[test]
    fn generated_abbreviations_are_unique() {
        let participants = vec![
            Participant::new("Anna"),
            Participant::new("Alex"),
            Participant::new("bob").with_abbreviation("B"),
            Participant::new("Ben"),
        ];
        assert_eq!(abbreviations(&participants), vec!["A", "A2", "B", "B2"]);
    }
}
