use std::collections::HashMap;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use shared::{CanonicalPaymentEvent, Gateway, PaymentEventType};
use thiserror::Error;

/// Why a gateway payload could not be turned into a canonical event.
/// Callers acknowledge and drop these; gateways retry failed
/// acknowledgements indefinitely, so normalization failure is never a
/// hard error at the webhook boundary.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed {gateway} payload: {source}")]
    Malformed {
        gateway: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported {0} event kind \"{1}\"")]
    UnsupportedKind(&'static str, String),

    #[error("{0} payload carries no transaction code")]
    MissingCorrelation(&'static str),
}

/// Card-escrow provider event envelope (payment-intent shaped). The
/// correlating transaction code travels in the intent metadata.
#[derive(Debug, Deserialize)]
pub struct CardPayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: CardPayData,
}

#[derive(Debug, Deserialize)]
pub struct CardPayData {
    pub object: CardPayIntent,
}

#[derive(Debug, Deserialize)]
pub struct CardPayIntent {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// MoMo IPN body. `orderId` is the transaction code the booking flow
/// handed to the wallet; `transId` is MoMo's own transaction id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoIpn {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub trans_id: i64,
    pub result_code: i32,
    pub message: Option<String>,
}

/// ZaloPay server-to-server callback body.
#[derive(Debug, Deserialize)]
pub struct ZaloPayCallback {
    pub app_trans_id: String,
    pub zp_trans_id: i64,
    pub amount: i64,
    pub status: i32,
}

/// Parse a raw webhook payload into the canonical payment event. All
/// provider-specific shape knowledge lives here; everything after this
/// point is gateway-agnostic.
pub fn normalize(
    gateway: Gateway,
    raw: &serde_json::Value,
) -> Result<CanonicalPaymentEvent, NormalizeError> {
    match gateway {
        Gateway::CardPay => normalize_cardpay(raw),
        Gateway::Momo => normalize_momo(raw),
        Gateway::ZaloPay => normalize_zalopay(raw),
    }
}

fn normalize_cardpay(raw: &serde_json::Value) -> Result<CanonicalPaymentEvent, NormalizeError> {
    let event: CardPayEvent =
        serde_json::from_value(raw.clone()).map_err(|source| NormalizeError::Malformed {
            gateway: "cardpay",
            source,
        })?;

    let event_type = match event.kind.as_str() {
        "payment_intent.amount_capturable_updated" => PaymentEventType::Authorized,
        "payment_intent.succeeded" => PaymentEventType::Captured,
        "payment_intent.canceled" => PaymentEventType::Cancelled,
        "payment_intent.payment_failed" => PaymentEventType::Failed,
        other => {
            return Err(NormalizeError::UnsupportedKind("cardpay", other.to_string()));
        }
    };

    let transaction_code = event
        .data
        .object
        .metadata
        .get("transaction_code")
        .cloned()
        .ok_or(NormalizeError::MissingCorrelation("cardpay"))?;

    Ok(CanonicalPaymentEvent {
        gateway: Gateway::CardPay,
        gateway_transaction_id: event.data.object.id,
        transaction_code,
        event_type,
        amount: Some(BigDecimal::from(event.data.object.amount)),
    })
}

fn normalize_momo(raw: &serde_json::Value) -> Result<CanonicalPaymentEvent, NormalizeError> {
    let ipn: MomoIpn =
        serde_json::from_value(raw.clone()).map_err(|source| NormalizeError::Malformed {
            gateway: "momo",
            source,
        })?;

    // MoMo captures in one step; resultCode 0 is a settled payment,
    // 1003 a user/merchant cancellation, anything else a failure.
    let event_type = match ipn.result_code {
        0 => PaymentEventType::Captured,
        1003 => PaymentEventType::Cancelled,
        _ => PaymentEventType::Failed,
    };

    Ok(CanonicalPaymentEvent {
        gateway: Gateway::Momo,
        gateway_transaction_id: ipn.trans_id.to_string(),
        transaction_code: ipn.order_id,
        event_type,
        amount: Some(BigDecimal::from(ipn.amount)),
    })
}

fn normalize_zalopay(raw: &serde_json::Value) -> Result<CanonicalPaymentEvent, NormalizeError> {
    let callback: ZaloPayCallback =
        serde_json::from_value(raw.clone()).map_err(|source| NormalizeError::Malformed {
            gateway: "zalopay",
            source,
        })?;

    let event_type = match callback.status {
        1 => PaymentEventType::Captured,
        -49 => PaymentEventType::Cancelled,
        _ => PaymentEventType::Failed,
    };

    Ok(CanonicalPaymentEvent {
        gateway: Gateway::ZaloPay,
        gateway_transaction_id: callback.zp_trans_id.to_string(),
        transaction_code: callback.app_trans_id,
        event_type,
        amount: Some(BigDecimal::from(callback.amount)),
    })
}
