//! Probe envelope codec
//!
//! The envelope is the JSON body of a probe message:
//!
//! ```text
//! {"SubjectGuid":"0f8fad5b-d9cb-469f-a165-70867728950e","TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}
//! ```
//!
//! Unknown fields are ignored so that bodies written by richer producers
//! (a whole serialized record, for instance) still decode.

use crate::error::{MailflowError, Result};
use crate::monitoring::{MonitoringRecord, Protocol};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Send-side fields carried inside the probe body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "SubjectGuid")]
    pub correlation_id: Uuid,
    #[serde(rename = "TimeSent", deserialize_with = "deserialize_time_sent")]
    pub sent_at: DateTime<Utc>,
    #[serde(rename = "SendingProtocol")]
    pub sending_protocol: Protocol,
}

/// Encode the send-side fields of a record as JSON text
pub fn encode(record: &MonitoringRecord) -> Result<String> {
    let envelope = record.envelope().ok_or_else(|| {
        MailflowError::Validation(format!(
            "Record {} has no sending information",
            record.correlation_id()
        ))
    })?;

    encode_envelope(&envelope)
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a probe body
///
/// Fails when the body is not JSON, a required field is missing or
/// mistyped, or the correlation id is nil.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| MailflowError::Decode(e.to_string()))?;

    if envelope.correlation_id.is_nil() {
        return Err(MailflowError::Decode("SubjectGuid is empty".to_string()));
    }

    Ok(envelope)
}

fn deserialize_time_sent<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_sent(&raw).ok_or_else(|| de::Error::custom(format!("invalid TimeSent: {}", raw)))
}

/// RFC 3339, or an offset-less timestamp taken as UTC
fn parse_time_sent(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped_record() -> MonitoringRecord {
        let mut record = MonitoringRecord::new(Uuid::new_v4());
        record.set_sending_information(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            Protocol::Smtp,
        );
        record
    }

    #[test]
    fn test_encode_then_decode_keeps_correlation_id() {
        let record = stamped_record();
        let body = encode(&record).unwrap();
        let envelope = decode(body.as_bytes()).unwrap();

        assert_eq!(envelope.correlation_id, record.correlation_id());
        assert_eq!(Some(envelope.sent_at), record.sent_at());
        assert_eq!(envelope.sending_protocol, Protocol::Smtp);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let record = stamped_record();
        let body = encode(&record).unwrap();

        assert_eq!(body, encode(&record).unwrap());
        assert_eq!(
            body,
            format!(
                r#"{{"SubjectGuid":"{}","TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}}"#,
                record.correlation_id()
            )
        );
    }

    #[test]
    fn test_encode_requires_sending_information() {
        let record = MonitoringRecord::new(Uuid::new_v4());
        assert!(matches!(encode(&record), Err(MailflowError::Validation(_))));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let body = r#"{
            "SubjectGuid": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "TimeSent": "2024-01-01T10:00:00.1234567Z",
            "SendingProtocol": "GRAPH",
            "ReceivingProtocol": 0,
            "Latency": 0,
            "MailflowHeaderDataTable": []
        }"#;

        let envelope = decode(body.as_bytes()).unwrap();
        assert_eq!(envelope.sending_protocol, Protocol::Graph);
        assert_eq!(
            envelope.correlation_id.to_string(),
            "0f8fad5b-d9cb-469f-a165-70867728950e"
        );
    }

    #[test]
    fn test_decode_legacy_encoding() {
        let body = "\u{feff}{\"SubjectGuid\":\"0f8fad5b-d9cb-469f-a165-70867728950e\",\"TimeSent\":\"2024-01-01T10:00:00\",\"SendingProtocol\":4}\r\n";

        let envelope = decode(body.as_bytes()).unwrap();
        assert_eq!(envelope.sending_protocol, Protocol::Ews);
        assert_eq!(
            envelope.sent_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let cases = [
            "not json at all",
            r#"{"TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}"#,
            r#"{"SubjectGuid":"","TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}"#,
            r#"{"SubjectGuid":"not-a-guid","TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}"#,
            r#"{"SubjectGuid":"00000000-0000-0000-0000-000000000000","TimeSent":"2024-01-01T10:00:00Z","SendingProtocol":"SMTP"}"#,
            r#"{"SubjectGuid":"0f8fad5b-d9cb-469f-a165-70867728950e","TimeSent":42,"SendingProtocol":"SMTP"}"#,
            r#"{"SubjectGuid":"0f8fad5b-d9cb-469f-a165-70867728950e","TimeSent":"yesterday","SendingProtocol":"SMTP"}"#,
        ];

        for body in cases {
            assert!(
                matches!(decode(body.as_bytes()), Err(MailflowError::Decode(_))),
                "expected decode error for {}",
                body
            );
        }
    }
}
