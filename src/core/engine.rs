use crate::core::calculator::SplitCalculator;
use crate::core::formatted;
use crate::core::intake::ImageIntake;
use crate::core::review::{ReviewSession, SplitOutcome};
use crate::domain::ports::{BillParser, ParseRequest};
use crate::utils::error::{Result, SplitError};

/// Runs an upload through intake and the bill parser, producing a review session.
pub struct SplitEngine<P: BillParser> {
    intake: ImageIntake,
    parser: P,
    calculator: SplitCalculator,
}

impl<P: BillParser> SplitEngine<P> {
    pub fn new(intake: ImageIntake, parser: P, calculator: SplitCalculator) -> Self {
        Self {
            intake,
            parser,
            calculator,
        }
    }

    pub fn calculator(&self) -> &SplitCalculator {
        &self.calculator
    }

    pub fn intake(&self) -> &ImageIntake {
        &self.intake
    }

    pub async fn process(&self, mut request: ParseRequest) -> Result<ReviewSession> {
        tracing::info!("Processing {} bill image(s)", request.images.len());

        self.intake.accept(&mut request.images)?;

        let bill = self.parser.parse(&request).await?;
        tracing::info!(
            participants = bill.participants.len(),
            items = bill.items.len(),
            "Bill parsed"
        );

        let session = ReviewSession::new(bill, self.calculator.clone()).with_source(request);
        log_outcome(&session);
        Ok(session)
    }

    /// Parses the session's images again, passing the reviewer's feedback and
    /// the current bill in text form.
    pub async fn regenerate<'s>(
        &self,
        session: &'s mut ReviewSession,
        feedback: &str,
    ) -> Result<&'s SplitOutcome> {
        let mut request = session.source().cloned().ok_or(SplitError::NoSourceImages)?;
        request.feedback = Some(feedback.trim().to_string());
        request.previous_output = Some(formatted::render(session.bill()));

        tracing::info!(session = %session.id(), "Regenerating bill with reviewer feedback");
        let bill = self.parser.parse(&request).await?;
        session.replace_bill(bill)
    }
}

fn log_outcome(session: &ReviewSession) {
    match (&session.outcome().split, &session.outcome().issue) {
        (Some(split), _) => {
            tracing::info!(session = %session.id(), total = %split.total, "Initial split computed")
        }
        (None, Some(issue)) => {
            tracing::info!(session = %session.id(), "Bill needs review: {}", issue.message)
        }
        (None, None) => {}
    }
}
