//! Outbound collaborator interfaces.
//!
//! Notifications and audit writes are fire-and-forget: implementations
//! must swallow their own failures (logging them) — a broken mail relay
//! or audit store must never turn into an authentication failure. They
//! are invoked strictly after the authoritative state transition
//! commits, never inside a session lock.

use async_trait::async_trait;

use crate::models::audit::AuditEvent;

/// User-facing notification collaborator (email or similar).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// "New sign-in on <device> from <ip>" style notification.
    async fn new_session(&self, email: &str, device_label: Option<&str>, ip: Option<&str>);
    async fn password_changed(&self, email: &str);
    async fn account_linked(&self, email: &str);
    async fn account_unlinked(&self, email: &str);
}

/// Structured security-event sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}
