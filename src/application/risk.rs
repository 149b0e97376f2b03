//! Ordered verification pipeline run by the processor.
//!
//! Stages run in a fixed order and the first failure wins. Each stage carries
//! its own classification: format, ledger and funds checks decline, while the
//! issuer block list and the scored checks flag fraud.
//!
//! The probabilistic checks sit behind [`RiskScorer`] so they can be replaced
//! by a deterministic double or a real model.

use super::ledger::Ledger;
use crate::config::RiskConfig;
use crate::domain::card::{CardData, normalize_card_number};
use crate::domain::money::Amount;
use crate::domain::transaction::TransactionStatus;
use crate::domain::validation::CardValidator;
use crate::error::Result;
use rand::Rng;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Declined,
    Fraud,
}

impl From<Classification> for TransactionStatus {
    fn from(classification: Classification) -> Self {
        match classification {
            Classification::Declined => TransactionStatus::Declined,
            Classification::Fraud => TransactionStatus::Fraud,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CardFormat,
    ExpiryFormat,
    CodeFormat,
    CardExists,
    ExpiryMatch,
    Funds,
    IssuerBlock,
    HighAmount,
    BaselineRisk,
}

impl Stage {
    pub fn classification(self) -> Classification {
        match self {
            Stage::CardFormat
            | Stage::ExpiryFormat
            | Stage::CodeFormat
            | Stage::CardExists
            | Stage::ExpiryMatch
            | Stage::Funds => Classification::Declined,
            Stage::IssuerBlock | Stage::HighAmount | Stage::BaselineRisk => Classification::Fraud,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Approved,
    Rejected { stage: Stage, reason: String },
}

impl Assessment {
    fn reject(stage: Stage, reason: &str) -> Self {
        Assessment::Rejected {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Assessment::Approved)
    }

    /// Terminal status this assessment maps to.
    pub fn status(&self) -> TransactionStatus {
        match self {
            Assessment::Approved => TransactionStatus::Approved,
            Assessment::Rejected { stage, .. } => stage.classification().into(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Assessment::Approved => "Card verification successful",
            Assessment::Rejected { reason, .. } => reason,
        }
    }
}

/// Source of the probabilistic fraud flags.
///
/// Each method returns the flag reason, or `None` to let the request pass.
pub trait RiskScorer: Send + Sync {
    /// Consulted only for amounts above the configured threshold.
    fn high_amount(&self, amount: Amount) -> Option<String>;
    fn baseline(&self, card: &CardData, amount: Amount) -> Option<String>;
}

/// Independent coin flips at the configured probabilities.
pub struct RandomScorer {
    high_amount_probability: f64,
    baseline: Vec<(f64, &'static str)>,
}

impl RandomScorer {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            high_amount_probability: config.high_amount_flag_probability,
            baseline: vec![
                (
                    config.suspicious_pattern_probability,
                    "Suspicious transaction pattern",
                ),
                (config.velocity_probability, "Velocity limit exceeded"),
                (config.geographic_probability, "Geographic anomaly detected"),
            ],
        }
    }
}

fn roll(probability: f64) -> bool {
    rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
}

impl RiskScorer for RandomScorer {
    fn high_amount(&self, _amount: Amount) -> Option<String> {
        roll(self.high_amount_probability)
            .then(|| "High amount requires manual verification".to_string())
    }

    fn baseline(&self, _card: &CardData, _amount: Amount) -> Option<String> {
        self.baseline
            .iter()
            .find(|(probability, _)| roll(*probability))
            .map(|(_, reason)| reason.to_string())
    }
}

/// Scorer with fixed answers, for deterministic runs.
#[derive(Debug, Clone, Default)]
pub struct StaticScorer {
    pub high_amount: Option<String>,
    pub baseline: Option<String>,
}

impl StaticScorer {
    /// Never flags anything.
    pub fn clean() -> Self {
        Self::default()
    }
}

impl RiskScorer for StaticScorer {
    fn high_amount(&self, _amount: Amount) -> Option<String> {
        self.high_amount.clone()
    }

    fn baseline(&self, _card: &CardData, _amount: Amount) -> Option<String> {
        self.baseline.clone()
    }
}

pub struct RiskEngine {
    validator: CardValidator,
    ledger: Arc<Ledger>,
    scorer: Box<dyn RiskScorer>,
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(
        validator: CardValidator,
        ledger: Arc<Ledger>,
        scorer: Box<dyn RiskScorer>,
        config: RiskConfig,
    ) -> Self {
        Self {
            validator,
            ledger,
            scorer,
            config,
        }
    }

    pub async fn evaluate(&self, card: &CardData, amount: Amount) -> Result<Assessment> {
        if !self.validator.card_number_valid(&card.number) {
            return Ok(Assessment::reject(Stage::CardFormat, "Invalid card format"));
        }
        if !self.validator.expiry_valid(&card.expiry) {
            return Ok(Assessment::reject(
                Stage::ExpiryFormat,
                "Card expired or invalid expiry date",
            ));
        }
        if !self.validator.cvv_valid(&card.cvv) {
            return Ok(Assessment::reject(Stage::CodeFormat, "Invalid CVV"));
        }

        let card_number = normalize_card_number(&card.number);
        let Some(record) = self.ledger.get(&card_number).await? else {
            return Ok(Assessment::reject(
                Stage::CardExists,
                "Card not found in bank system",
            ));
        };
        if record.expiry != card.expiry {
            return Ok(Assessment::reject(Stage::ExpiryMatch, "Card expiry mismatch"));
        }
        if !record.balance.covers(amount) {
            return Ok(Assessment::reject(Stage::Funds, "Insufficient funds"));
        }

        let issuer: String = card_number.chars().take(4).collect();
        if self.config.suspicious_bins.contains(&issuer) {
            return Ok(Assessment::reject(Stage::IssuerBlock, "Suspicious card issuer"));
        }
        if amount.value() > self.config.high_amount_threshold
            && let Some(reason) = self.scorer.high_amount(amount)
        {
            return Ok(Assessment::Rejected {
                stage: Stage::HighAmount,
                reason,
            });
        }
        if let Some(reason) = self.scorer.baseline(card, amount) {
            return Ok(Assessment::Rejected {
                stage: Stage::BaselineRisk,
                reason,
            });
        }

        Ok(Assessment::Approved)
    }
}
