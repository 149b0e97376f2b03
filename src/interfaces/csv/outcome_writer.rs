use crate::application::merchant::PaymentOutcome;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    transaction_id: &'a str,
    status: &'static str,
    amount: String,
    masked_card: &'a str,
    reason: &'a str,
}

/// Writes `transaction_id,status,amount,masked_card,reason` rows.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, outcome: &PaymentOutcome) -> Result<()> {
        self.writer.serialize(OutcomeRow {
            transaction_id: &outcome.transaction_id,
            status: outcome.status.as_str(),
            amount: outcome.amount.to_string(),
            masked_card: &outcome.masked_card,
            reason: &outcome.reason,
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
