//! Audit events emitted by the session layer.
//!
//! The session code only calls [`AuditSink::log_event`]; formatting and storage
//! belong to the sink. The default sink forwards events to `tracing` under the
//! `audit` target.

use std::sync::{Arc, Mutex};

/// Kinds of security-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventKind {
    LoginSuccess,
    LoginFailure,
    TokenInvalid,
    AccessRefreshed,
    SessionRotated,
    SessionNotFound,
    Logout,
    SessionRevoked,
    SessionsPurged,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::TokenInvalid => "token_invalid",
            Self::AccessRefreshed => "access_refreshed",
            Self::SessionRotated => "session_rotated",
            Self::SessionNotFound => "session_not_found",
            Self::Logout => "logout",
            Self::SessionRevoked => "session_revoked",
            Self::SessionsPurged => "sessions_purged",
        }
    }
}

/// Consumer of audit events. Must never block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn log_event(&self, kind: AuditEventKind, attributes: &[(&str, String)]);
}

/// Sink that writes each event as a structured `tracing` event.
///
/// Known attribute keys become fields of their own. Anything else is kept in
/// a single `extra` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[derive(Default)]
struct EventFields<'a> {
    user_id: Option<&'a str>,
    session_id: Option<&'a str>,
    reason: Option<&'a str>,
    token_type: Option<&'a str>,
    session_found: Option<bool>,
    count: Option<u64>,
    extra: Vec<String>,
}

impl<'a> EventFields<'a> {
    fn from_attributes(attributes: &'a [(&str, String)]) -> Self {
        let mut fields = Self::default();
        for (key, value) in attributes {
            match *key {
                "user_id" => fields.user_id = Some(value.as_str()),
                "session_id" => fields.session_id = Some(value.as_str()),
                "reason" => fields.reason = Some(value.as_str()),
                "token_type" => fields.token_type = Some(value.as_str()),
                "session_found" => fields.session_found = value.parse().ok(),
                "count" => fields.count = value.parse().ok(),
                _ => fields.extra.push(format!("{}={}", key, value)),
            }
        }
        fields
    }

    fn extra(&self) -> Option<String> {
        (!self.extra.is_empty()).then(|| self.extra.join(" "))
    }
}

macro_rules! audit_event {
    ($level:expr, $kind:expr, $fields:expr, $extra:expr) => {
        tracing::event!(
            target: "audit",
            $level,
            event = $kind.as_str(),
            user_id = $fields.user_id,
            session_id = $fields.session_id,
            reason = $fields.reason,
            token_type = $fields.token_type,
            session_found = $fields.session_found,
            count = $fields.count,
            extra = $extra,
        )
    };
}

impl AuditSink for TracingAuditSink {
    fn log_event(&self, kind: AuditEventKind, attributes: &[(&str, String)]) {
        let fields = EventFields::from_attributes(attributes);
        let extra = fields.extra();
        match kind {
            AuditEventKind::LoginFailure
            | AuditEventKind::TokenInvalid
            | AuditEventKind::SessionNotFound => {
                audit_event!(tracing::Level::WARN, kind, fields, extra.as_deref())
            }
            _ => audit_event!(tracing::Level::INFO, kind, fields, extra.as_deref()),
        }
    }
}

/// A recorded audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: AuditEventKind,
    pub attributes: Vec<(String, String)>,
}

impl RecordedEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that keeps events in memory. Useful for tests and diagnostics.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_event(&self, kind: AuditEventKind, attributes: &[(&str, String)]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                kind,
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            });
        }
    }
}
