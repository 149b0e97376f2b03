use crate::domain::card::CardData;
use crate::domain::money::Amount;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One `card,expiry,cvv,amount` line of a batch file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentRow {
    pub card: String,
    pub expiry: String,
    pub cvv: String,
    pub amount: Amount,
}

impl PaymentRow {
    pub fn card_data(&self) -> CardData {
        CardData::new(&self.card, &self.expiry, &self.cvv)
    }
}

/// Reads payment rows from a CSV source.
///
/// Fields are trimmed. Rows that fail to parse, including non-positive
/// amounts, come out as errors without ending the stream.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows.
    pub fn payments(self) -> impl Iterator<Item = Result<PaymentRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
