//! Session record layout: how a session is turned into a document and back.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::context::AppContext;
use crate::document::{Document, FieldValue};

pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_LAST_ACTIVITY: &str = "last_activity";
pub const FIELD_USER_ID: &str = "user_id";
pub const FIELD_IP_ADDRESS: &str = "ip_address";
pub const FIELD_USER_AGENT: &str = "user_agent";

/// A set of fields contributed by one source while assembling a record.
pub type FieldSet = Vec<(&'static str, FieldValue)>;

/// Assembles the document written for a session.
///
/// Each `merge` consumes the builder and returns a new one, so the assembly
/// steps never share a mutable map.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    fields: Document,
}

impl RecordBuilder {
    /// Start a record with the encoded payload and the activity stamp.
    pub fn new(data: &[u8], now: DateTime<Utc>) -> Self {
        let mut fields = Document::new();
        fields.insert(FIELD_PAYLOAD.to_string(), FieldValue::Text(STANDARD.encode(data)));
        fields.insert(FIELD_LAST_ACTIVITY.to_string(), FieldValue::Timestamp(now));
        Self { fields }
    }

    /// Add an optional field set. `None` leaves the record unchanged.
    pub fn merge(self, extra: Option<FieldSet>) -> Self {
        let Some(extra) = extra else {
            return self;
        };
        let mut fields = self.fields;
        fields.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v)));
        Self { fields }
    }

    pub fn build(self) -> Document {
        self.fields
    }
}

/// `user_id` from the principal accessor, if one is bound.
///
/// A bound accessor with no authenticated principal yields an explicit null.
pub fn principal_fields(ctx: &AppContext) -> Option<FieldSet> {
    let principal = ctx.principal()?;
    Some(vec![(FIELD_USER_ID, FieldValue::from(principal.id()))])
}

/// `ip_address` and `user_agent` from the request accessor, if one is bound.
pub fn request_fields(ctx: &AppContext) -> Option<FieldSet> {
    let request = ctx.request()?;
    Some(vec![
        (FIELD_IP_ADDRESS, FieldValue::from(request.ip())),
        (
            FIELD_USER_AGENT,
            FieldValue::Text(request.header("User-Agent").unwrap_or_default()),
        ),
    ])
}

/// Build the full document for a write.
pub fn build_record(data: &[u8], now: DateTime<Utc>, ctx: &AppContext) -> Document {
    RecordBuilder::new(data, now)
        .merge(principal_fields(ctx))
        .merge(request_fields(ctx))
        .build()
}

/// State of the `last_activity` field as read back from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStamp {
    Missing,
    At(DateTime<Utc>),
    /// Present but not interpretable as a point in time.
    Malformed,
}

impl ActivityStamp {
    pub fn from_document(doc: &Document) -> Self {
        match doc.get(FIELD_LAST_ACTIVITY) {
            None | Some(FieldValue::Null) => ActivityStamp::Missing,
            Some(value) => value.as_timestamp().map_or(ActivityStamp::Malformed, ActivityStamp::At),
        }
    }

    /// Whether a session stamped like this is past `lifetime_minutes` at `now`.
    ///
    /// Compared at whole-second resolution; strictly older than the cutoff
    /// is expired. Missing and malformed stamps never expire, matching `gc`,
    /// whose `<=` filter cannot select them either.
    pub fn is_expired(&self, now: DateTime<Utc>, lifetime_minutes: u64) -> bool {
        match self {
            ActivityStamp::Missing | ActivityStamp::Malformed => false,
            ActivityStamp::At(at) => {
                let window = i64::try_from(lifetime_minutes)
                    .unwrap_or(i64::MAX)
                    .saturating_mul(60);
                at.timestamp() < now.timestamp().saturating_sub(window)
            }
        }
    }
}

/// Decoded `payload` field. Missing, non-text or undecodable payloads read
/// as empty.
pub fn decode_payload(doc: &Document, session_id: &str) -> Vec<u8> {
    let Some(encoded) = doc.get(FIELD_PAYLOAD).and_then(|v| v.as_text()) else {
        return Vec::new();
    };
    match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Session {} has an undecodable payload: {}", session_id, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PrincipalProvider, RequestContextProvider};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    struct Guest;
    impl PrincipalProvider for Guest {
        fn id(&self) -> Option<String> {
            None
        }
    }

    struct Browser;
    impl RequestContextProvider for Browser {
        fn ip(&self) -> Option<String> {
            Some("203.0.113.9".to_string())
        }
        fn header(&self, _name: &str) -> Option<String> {
            None
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_builder_encodes_and_stamps() {
        let doc = RecordBuilder::new(b"hello", t0()).build();
        assert_eq!(doc.get(FIELD_PAYLOAD).and_then(|v| v.as_text()), Some("aGVsbG8="));
        assert_eq!(doc.get(FIELD_LAST_ACTIVITY), Some(&FieldValue::Timestamp(t0())));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_merge_none_is_noop() {
        let a = RecordBuilder::new(b"x", t0()).build();
        let b = RecordBuilder::new(b"x", t0()).merge(None).build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_guest_principal_writes_null_user() {
        let ctx = AppContext::new().with_principal(Arc::new(Guest));
        let doc = build_record(b"", t0(), &ctx);
        assert_eq!(doc.get(FIELD_USER_ID), Some(&FieldValue::Null));
        assert!(!doc.contains_key(FIELD_IP_ADDRESS));
    }

    #[test]
    fn test_request_without_user_agent_writes_empty_string() {
        let ctx = AppContext::new().with_request(Arc::new(Browser));
        let doc = build_record(b"", t0(), &ctx);
        assert_eq!(doc.get(FIELD_IP_ADDRESS).and_then(|v| v.as_text()), Some("203.0.113.9"));
        assert_eq!(doc.get(FIELD_USER_AGENT).and_then(|v| v.as_text()), Some(""));
        assert!(!doc.contains_key(FIELD_USER_ID));
    }

    #[test]
    fn test_activity_stamp_parsing() {
        let mut doc = Document::new();
        assert_eq!(ActivityStamp::from_document(&doc), ActivityStamp::Missing);

        doc.insert(FIELD_LAST_ACTIVITY.into(), FieldValue::from("2024-01-01T12:00:00Z"));
        assert_eq!(ActivityStamp::from_document(&doc), ActivityStamp::At(t0()));

        doc.insert(FIELD_LAST_ACTIVITY.into(), FieldValue::Integer(t0().timestamp()));
        assert_eq!(ActivityStamp::from_document(&doc), ActivityStamp::At(t0()));

        doc.insert(FIELD_LAST_ACTIVITY.into(), FieldValue::from("last tuesday"));
        assert_eq!(ActivityStamp::from_document(&doc), ActivityStamp::Malformed);

        doc.insert(FIELD_LAST_ACTIVITY.into(), FieldValue::Null);
        assert_eq!(ActivityStamp::from_document(&doc), ActivityStamp::Missing);
    }

    #[test]
    fn test_expiry_boundary() {
        let stamp = ActivityStamp::At(t0());
        let ttl = 120;

        assert!(!stamp.is_expired(t0() + Duration::minutes(120), ttl), "exactly at the cutoff is alive");
        assert!(!stamp.is_expired(t0() + Duration::minutes(120) + Duration::milliseconds(900), ttl));
        assert!(stamp.is_expired(t0() + Duration::minutes(120) + Duration::seconds(1), ttl));

        assert!(!ActivityStamp::Missing.is_expired(t0(), 0));
        assert!(!ActivityStamp::Malformed.is_expired(t0() + Duration::days(365), ttl));
    }

    #[test]
    fn test_decode_payload() {
        let mut doc = Document::new();
        assert!(decode_payload(&doc, "s").is_empty());

        doc.insert(FIELD_PAYLOAD.into(), FieldValue::from("aGVsbG8="));
        assert_eq!(decode_payload(&doc, "s"), b"hello");

        doc.insert(FIELD_PAYLOAD.into(), FieldValue::from("%%%not base64"));
        assert!(decode_payload(&doc, "s").is_empty());

        doc.insert(FIELD_PAYLOAD.into(), FieldValue::Integer(3));
        assert!(decode_payload(&doc, "s").is_empty());
    }
}
