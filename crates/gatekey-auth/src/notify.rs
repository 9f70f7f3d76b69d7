//! Default collaborator implementations.
//!
//! These log-only implementations stand in where no real mail relay or
//! audit store is wired up. Real implementations must keep the same
//! contract: swallow failures, never propagate them into the
//! authentication flow.

use async_trait::async_trait;
use gatekey_core::collaborators::{AuditSink, Notifier};
use gatekey_core::models::audit::AuditEvent;
use tracing::info;

/// Log-only notification collaborator.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn new_session(&self, email: &str, device_label: Option<&str>, ip: Option<&str>) {
        info!(
            email,
            device = device_label.unwrap_or("unknown device"),
            ip = ip.unwrap_or("unknown"),
            "notify: new session"
        );
    }

    async fn password_changed(&self, email: &str) {
        info!(email, "notify: password changed");
    }

    async fn account_linked(&self, email: &str) {
        info!(email, "notify: federated identity linked");
    }

    async fn account_unlinked(&self, email: &str) {
        info!(email, "notify: federated identity unlinked");
    }
}

/// Log-only audit sink.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            user_id = ?event.user_id,
            action = %event.action,
            success = event.success,
            ip = ?event.ip_address,
            "audit"
        );
    }
}
