//! Protocol envelopes exchanged between the merchant and the processor.
//!
//! An [`Envelope`] is the plaintext that gets encrypted and dropped into a
//! mailbox. Its payload is an open JSON object so reserved message types can
//! travel without schema changes; the typed views ([`PaymentRequest`],
//! [`PaymentResponse`], [`ErrorPayload`]) are parsed out of it on demand.

use super::card::CardData;
use super::money::Amount;
use super::transaction::TransactionStatus;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transaction id used on error responses when the request could not be read.
pub const UNKNOWN_TRANSACTION_ID: &str = "UNKNOWN";

const AUTH_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const AUTH_CODE_LENGTH: usize = 6;

pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PaymentRequest,
    PaymentResponse,
    /// Reserved.
    TokenizationRequest,
    /// Reserved.
    TokenizationResponse,
    /// Reserved.
    StatusCheck,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message_type: MessageType,
    transaction_id: String,
    timestamp: String,
    payload: Payload,
    signature: Option<String>,
}

impl Envelope {
    pub fn new(
        message_type: MessageType,
        transaction_id: impl Into<String>,
        timestamp: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            message_type,
            transaction_id: transaction_id.into(),
            timestamp: timestamp.into(),
            payload,
            signature: None,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Reserved for message authentication; never verified.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn payment_request(&self) -> Result<PaymentRequest> {
        self.typed_payload(MessageType::PaymentRequest)
    }

    pub fn payment_response(&self) -> Result<PaymentResponse> {
        self.typed_payload(MessageType::PaymentResponse)
    }

    pub fn error_payload(&self) -> Result<ErrorPayload> {
        self.typed_payload(MessageType::Error)
    }

    fn typed_payload<T: DeserializeOwned>(&self, expected: MessageType) -> Result<T> {
        if self.message_type != expected {
            return Err(PaymentError::MalformedEnvelope(format!(
                "expected {:?}, got {:?}",
                expected, self.message_type
            )));
        }
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|e| PaymentError::MalformedEnvelope(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub card_data: CardData,
    pub amount: Amount,
    pub token: Option<String>,
    pub merchant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub status: TransactionStatus,
    pub reason: String,
    pub amount: Amount,
    pub masked_card: String,
    pub authorization_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub severity: String,
}

fn to_payload<T: Serialize>(value: &T) -> Result<Payload> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(PaymentError::InternalError(format!(
            "payload must be an object, got {}",
            other
        ))),
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn new_transaction_id() -> String {
    format!("TXN_{}", uuid::Uuid::new_v4().simple().to_string().to_uppercase())
}

pub fn authorization_code() -> String {
    let mut rng = rand::thread_rng();
    (0..AUTH_CODE_LENGTH)
        .map(|_| AUTH_CODE_CHARSET[rng.gen_range(0..AUTH_CODE_CHARSET.len())] as char)
        .collect()
}

/// Builds a payment request under a fresh transaction id.
pub fn payment_request(
    card_data: CardData,
    amount: Amount,
    token: Option<String>,
    merchant_id: &str,
) -> Result<Envelope> {
    let payload = to_payload(&PaymentRequest {
        card_data,
        amount,
        token,
        merchant_id: merchant_id.to_string(),
    })?;
    Ok(Envelope::new(
        MessageType::PaymentRequest,
        new_transaction_id(),
        now_timestamp(),
        payload,
    ))
}

/// Builds the response to `transaction_id`. Only approvals carry an
/// authorization code.
pub fn payment_response(
    transaction_id: &str,
    status: TransactionStatus,
    reason: &str,
    amount: Amount,
    masked_card: &str,
) -> Result<Envelope> {
    let authorization_code = (status == TransactionStatus::Approved).then(authorization_code);
    let payload = to_payload(&PaymentResponse {
        status,
        reason: reason.to_string(),
        amount,
        masked_card: masked_card.to_string(),
        authorization_code,
    })?;
    Ok(Envelope::new(
        MessageType::PaymentResponse,
        transaction_id,
        now_timestamp(),
        payload,
    ))
}

pub fn error_message(transaction_id: &str, error: &str) -> Result<Envelope> {
    let payload = to_payload(&ErrorPayload {
        error: error.to_string(),
        severity: "high".to_string(),
    })?;
    Ok(Envelope::new(
        MessageType::Error,
        transaction_id,
        now_timestamp(),
        payload,
    ))
}

fn timestamp_parses(timestamp: &str) -> bool {
    DateTime::parse_from_rfc3339(timestamp).is_ok()
        || NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn require_fields(payload: &Payload, fields: &[&str], context: &str) -> Result<()> {
    match fields.iter().find(|field| !payload.contains_key(**field)) {
        Some(missing) => Err(PaymentError::MalformedEnvelope(format!(
            "Missing {}: {}",
            context, missing
        ))),
        None => Ok(()),
    }
}

/// Structural check run before an envelope reaches business logic.
///
/// Returns the human-readable reason as `MalformedEnvelope` on failure.
pub fn validate(envelope: &Envelope) -> Result<()> {
    if envelope.transaction_id.trim().is_empty() {
        return Err(PaymentError::MalformedEnvelope(
            "Missing transaction ID".to_string(),
        ));
    }
    if envelope.timestamp.trim().is_empty() {
        return Err(PaymentError::MalformedEnvelope(
            "Missing timestamp".to_string(),
        ));
    }
    if !timestamp_parses(&envelope.timestamp) {
        return Err(PaymentError::MalformedEnvelope(
            "Invalid timestamp format".to_string(),
        ));
    }

    let payload = &envelope.payload;
    match envelope.message_type {
        MessageType::PaymentRequest => {
            require_fields(payload, &["card_data", "amount"], "required field")?;
            let Some(Value::Object(card_data)) = payload.get("card_data") else {
                return Err(PaymentError::MalformedEnvelope(
                    "card_data must be an object".to_string(),
                ));
            };
            require_fields(card_data, &["number", "expiry", "cvv"], "card data field")
        }
        MessageType::PaymentResponse => require_fields(
            payload,
            &["status", "reason", "amount", "masked_card"],
            "required field",
        ),
        MessageType::Error => require_fields(payload, &["error"], "required field"),
        MessageType::TokenizationRequest
        | MessageType::TokenizationResponse
        | MessageType::StatusCheck => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn card() -> CardData {
        CardData::new("4111111111111111", "12/25", "123")
    }

    #[test]
    fn test_payment_request_is_valid() {
        let envelope =
            payment_request(card(), Amount::new(dec!(100.00)).unwrap(), None, "VENDOR_001")
                .unwrap();
        assert_eq!(envelope.message_type(), MessageType::PaymentRequest);
        assert!(envelope.transaction_id().starts_with("TXN_"));
        assert!(validate(&envelope).is_ok());

        let request = envelope.payment_request().unwrap();
        assert_eq!(request.card_data, card());
        assert_eq!(request.amount.value(), dec!(100.00));
        assert_eq!(request.merchant_id, "VENDOR_001");
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        let a = new_transaction_id();
        let b = new_transaction_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "TXN_".len() + 32);
    }

    #[test]
    fn test_authorization_code_only_on_approval() {
        let amount = Amount::new(dec!(5)).unwrap();
        let approved = payment_response(
            "TXN_1",
            TransactionStatus::Approved,
            "Payment successful",
            amount,
            "**** **** **** 1111",
        )
        .unwrap()
        .payment_response()
        .unwrap();
        let code = approved.authorization_code.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let declined = payment_response(
            "TXN_1",
            TransactionStatus::Declined,
            "Insufficient funds",
            amount,
            "**** **** **** 1111",
        )
        .unwrap()
        .payment_response()
        .unwrap();
        assert!(declined.authorization_code.is_none());
    }

    #[test]
    fn test_response_keeps_request_transaction_id() {
        let request =
            payment_request(card(), Amount::new(dec!(1)).unwrap(), None, "VENDOR_001").unwrap();
        let response = payment_response(
            request.transaction_id(),
            TransactionStatus::Fraud,
            "Suspicious card issuer",
            Amount::new(dec!(1)).unwrap(),
            "**** **** **** 1111",
        )
        .unwrap();
        assert_eq!(response.transaction_id(), request.transaction_id());
        assert!(validate(&response).is_ok());
    }

    #[test]
    fn test_validate_missing_card_field() {
        let mut payload = Payload::new();
        payload.insert(
            "card_data".to_string(),
            serde_json::json!({"number": "4111111111111111", "expiry": "12/25"}),
        );
        payload.insert("amount".to_string(), serde_json::json!("10.00"));
        let envelope = Envelope::new(
            MessageType::PaymentRequest,
            "TXN_1",
            Utc::now().to_rfc3339(),
            payload,
        );
        match validate(&envelope) {
            Err(PaymentError::MalformedEnvelope(reason)) => {
                assert_eq!(reason, "Missing card data field: cvv")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_bad_timestamp_and_id() {
        let envelope = Envelope::new(MessageType::StatusCheck, "TXN_1", "yesterday", Payload::new());
        assert!(matches!(
            validate(&envelope),
            Err(PaymentError::MalformedEnvelope(r)) if r == "Invalid timestamp format"
        ));

        let envelope = Envelope::new(MessageType::StatusCheck, "", Utc::now().to_rfc3339(), Payload::new());
        assert!(matches!(
            validate(&envelope),
            Err(PaymentError::MalformedEnvelope(r)) if r == "Missing transaction ID"
        ));
    }

    #[test]
    fn test_validate_accepts_naive_iso_timestamp() {
        let envelope = Envelope::new(
            MessageType::StatusCheck,
            "TXN_1",
            "2024-05-01T10:15:30.123456",
            Payload::new(),
        );
        assert!(validate(&envelope).is_ok());
    }

    #[test]
    fn test_wire_form() {
        let envelope = error_message(UNKNOWN_TRANSACTION_ID, "Decryption failed").unwrap();
        let json: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["message_type"], "error");
        assert_eq!(json["transaction_id"], "UNKNOWN");
        assert_eq!(json["payload"]["severity"], "high");
        assert!(json["signature"].is_null());
    }

    #[test]
    fn test_typed_view_rejects_wrong_type() {
        let envelope = error_message("TXN_1", "boom").unwrap();
        assert!(matches!(
            envelope.payment_response(),
            Err(PaymentError::MalformedEnvelope(_))
        ));
        assert_eq!(envelope.error_payload().unwrap().error, "boom");
    }
}
