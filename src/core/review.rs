use crate::core::calculator::SplitCalculator;
use crate::domain::model::{Bill, FeeKind, LineItem, Money, Participant, Share, Split};
use crate::domain::ports::ParseRequest;
use crate::utils::error::{ErrorCategory, Result, SplitError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Editing,
    Confirmed,
}

/// A correction made by the reviewer. Item positions are zero based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    SetPrice { item: usize, price: Money },
    SetQuantity { item: usize, quantity: u32 },
    SetDescription { item: usize, description: String },
    /// Replaces the item's assignment with equal parts for `participants`.
    Assign { item: usize, participants: Vec<String> },
    /// Replaces the item's assignment with explicit weights.
    AssignWeighted { item: usize, shares: Vec<Share> },
    Unassign { item: usize, participant: String },
    AddItem { item: LineItem },
    RemoveItem { item: usize },
    AddParticipant {
        name: String,
        #[serde(default)]
        abbreviation: Option<String>,
    },
    RemoveParticipant { name: String },
    SetFee { kind: FeeKind, amount: Money },
    SetDeclaredTotal { total: Option<Money> },
}

/// A calculation problem shown next to the bill instead of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationIssue {
    pub message: String,
    pub suggestion: String,
    /// Item to highlight, when the problem is tied to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

impl From<&SplitError> for CalculationIssue {
    fn from(err: &SplitError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.recovery_suggestion().to_string(),
            item: err.item_index(),
        }
    }
}

/// Result of the latest recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<CalculationIssue>,
}

impl SplitOutcome {
    fn from_result(result: &Result<Split>) -> Self {
        match result {
            Ok(split) => Self {
                split: Some(split.clone()),
                issue: None,
            },
            Err(err) => Self {
                split: None,
                issue: Some(CalculationIssue::from(err)),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.split.is_some()
    }
}

/// One bill under review: edited until the reviewer confirms the split.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    state: ReviewState,
    bill: Bill,
    calculator: SplitCalculator,
    outcome: SplitOutcome,
    /// Request the bill was parsed from, kept so it can be regenerated with feedback.
    source: Option<ParseRequest>,
}

impl ReviewSession {
    pub fn new(bill: Bill, calculator: SplitCalculator) -> Self {
        let now = Utc::now();
        let mut session = Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            state: ReviewState::Editing,
            bill,
            calculator,
            outcome: SplitOutcome {
                split: None,
                issue: None,
            },
            source: None,
        };
        session.recompute();
        session
    }

    pub fn with_source(mut self, source: ParseRequest) -> Self {
        self.source = Some(source);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last edit, confirmation or reopen.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    pub fn bill(&self) -> &Bill {
        &self.bill
    }

    pub fn outcome(&self) -> &SplitOutcome {
        &self.outcome
    }

    pub fn source(&self) -> Option<&ParseRequest> {
        self.source.as_ref()
    }

    /// Computes the split for the current bill, returning the calculation error
    /// when there is one.
    pub fn current_split(&self) -> Result<Split> {
        self.calculator.calculate(&self.bill)
    }

    /// The frozen split, once confirmed.
    pub fn confirmed_split(&self) -> Option<&Split> {
        match self.state {
            ReviewState::Confirmed => self.outcome.split.as_ref(),
            ReviewState::Editing => None,
        }
    }

    /// Applies an edit and recomputes the split.
    ///
    /// Edits that cannot apply (unknown item or participant) leave the bill
    /// untouched and return an error. Calculation problems caused by a valid
    /// edit are reported in the returned outcome instead.
    pub fn apply(&mut self, edit: Edit) -> Result<&SplitOutcome> {
        self.ensure_editing()?;
        tracing::debug!(session = %self.id, edit = ?edit, "Applying review edit");

        let bill = &mut self.bill;
        match edit {
            Edit::SetPrice { item, price } => item_mut(bill, item)?.unit_price = price,
            Edit::SetQuantity { item, quantity } => item_mut(bill, item)?.quantity = quantity,
            Edit::SetDescription { item, description } => {
                item_mut(bill, item)?.description = description.trim().to_string()
            }
            Edit::Assign { item, participants } => {
                let shares = participants.into_iter().map(Share::new).collect();
                set_shares(bill, item, shares)?;
            }
            Edit::AssignWeighted { item, shares } => set_shares(bill, item, shares)?,
            Edit::Unassign { item, participant } => {
                let line = item_mut(bill, item)?;
                let before = line.shares.len();
                line.shares.retain(|share| share.participant != participant.trim());
                if line.shares.len() == before {
                    return Err(SplitError::UnknownParticipant { name: participant });
                }
            }
            Edit::AddItem { item } => bill.items.push(item),
            Edit::RemoveItem { item } => {
                check_index(bill, item)?;
                bill.items.remove(item);
            }
            Edit::AddParticipant { name, abbreviation } => {
                let mut participant = Participant::new(name);
                if bill.participant(&participant.name).is_some() {
                    return Err(SplitError::DuplicateParticipant {
                        name: participant.name,
                    });
                }
                if let Some(abbreviation) = abbreviation {
                    participant = participant.with_abbreviation(abbreviation);
                }
                bill.participants.push(participant);
            }
            Edit::RemoveParticipant { name } => {
                let index = bill
                    .participant_index(&name)
                    .ok_or(SplitError::UnknownParticipant { name })?;
                let removed = bill.participants.remove(index);
                for item in &mut bill.items {
                    item.shares.retain(|share| share.participant != removed.name);
                }
            }
            Edit::SetFee { kind, amount } => bill.fees.set(kind, amount),
            Edit::SetDeclaredTotal { total } => bill.declared_total = total,
        }

        self.recompute();
        Ok(&self.outcome)
    }

    /// Swaps in a freshly parsed bill, e.g. after regenerating with feedback.
    pub fn replace_bill(&mut self, bill: Bill) -> Result<&SplitOutcome> {
        self.ensure_editing()?;
        self.bill = bill;
        self.recompute();
        Ok(&self.outcome)
    }

    /// Freezes the split. Fails, staying in editing, if the split cannot be computed.
    pub fn confirm(&mut self) -> Result<&Split> {
        self.ensure_editing()?;
        let split = self.calculator.calculate(&self.bill)?;
        tracing::info!(session = %self.id, total = %split.total, "Split confirmed");
        self.outcome = SplitOutcome {
            split: Some(split),
            issue: None,
        };
        self.state = ReviewState::Confirmed;
        self.updated_at = Utc::now();
        self.outcome
            .split
            .as_ref()
            .ok_or(SplitError::SessionConfirmed)
    }

    pub fn reopen(&mut self) {
        if self.state == ReviewState::Confirmed {
            tracing::info!(session = %self.id, "Review reopened");
        }
        self.state = ReviewState::Editing;
        self.updated_at = Utc::now();
    }

    fn ensure_editing(&self) -> Result<()> {
        match self.state {
            ReviewState::Editing => Ok(()),
            ReviewState::Confirmed => Err(SplitError::SessionConfirmed),
        }
    }

    fn recompute(&mut self) {
        self.updated_at = Utc::now();
        let result = self.calculator.calculate(&self.bill);
        if let Err(err) = &result {
            if err.category() != ErrorCategory::Calculation {
                tracing::warn!(session = %self.id, "Unexpected error while computing split: {}", err);
            }
        }
        self.outcome = SplitOutcome::from_result(&result);
    }
}

fn check_index(bill: &Bill, index: usize) -> Result<()> {
    if index >= bill.items.len() {
        return Err(SplitError::ItemOutOfRange {
            index,
            len: bill.items.len(),
        });
    }
    Ok(())
}

fn item_mut(bill: &mut Bill, index: usize) -> Result<&mut LineItem> {
    check_index(bill, index)?;
    Ok(&mut bill.items[index])
}

fn set_shares(bill: &mut Bill, index: usize, shares: Vec<Share>) -> Result<()> {
    check_index(bill, index)?;
    let mut resolved = Vec::with_capacity(shares.len());
    for share in shares {
        let participant = bill
            .participant(&share.participant)
            .ok_or_else(|| SplitError::UnknownParticipant {
                name: share.participant.clone(),
            })?;
        resolved.push(Share::weighted(participant.name.clone(), share.weight));
    }
    bill.items[index].shares = resolved;
    Ok(())
}
