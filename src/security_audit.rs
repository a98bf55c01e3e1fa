//! Security Audit Logging
//!
//! This module provides security audit logging for remote session events.
//!
//! ## Security Policy
//!
//! - **NEVER** log passwords or other credentials
//! - Only log security-relevant events with non-sensitive metadata
//! - Use INFO level for normal events, WARN for weakened or refused trust
//!
//! ## Events Logged
//!
//! - SSH connection attempts (host and user, no password)
//! - SSH session start/end
//! - Host key decisions (fingerprint and policy)
//! - Configuration loads/errors

use tracing::{info, warn};

/// Security audit event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// SSH connection initiated
    SshConnectionAttempt,
    /// SSH session established
    SshSessionStart,
    /// SSH session ended
    SshSessionEnd,
    /// Host key accepted without verification
    HostKeyTrustedOnFirstUse,
    /// Host key verified against a pin or known_hosts
    HostKeyVerified,
    /// Host key refused by policy
    HostKeyRejected,
    /// Configuration file loaded
    ConfigLoaded,
    /// Configuration file error
    ConfigError,
}

impl SecurityEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> &'static str {
        match self {
            SecurityEvent::SshConnectionAttempt => "SSH connection initiated",
            SecurityEvent::SshSessionStart => "SSH session established",
            SecurityEvent::SshSessionEnd => "SSH session terminated",
            SecurityEvent::HostKeyTrustedOnFirstUse => "Host key accepted without verification",
            SecurityEvent::HostKeyVerified => "Host key verified",
            SecurityEvent::HostKeyRejected => "Host key rejected",
            SecurityEvent::ConfigLoaded => "Configuration loaded successfully",
            SecurityEvent::ConfigError => "Configuration loading error",
        }
    }

    /// Check if this event weakens or refuses trust and should be a warning
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            SecurityEvent::HostKeyTrustedOnFirstUse | SecurityEvent::HostKeyRejected
        )
    }
}

/// Log a security audit event
///
/// ## Security Note
///
/// Never pass sensitive data (passwords, keys, etc.) as metadata.
///
/// # Examples
///
/// ```
/// use fleetshell::security_audit::{log_security_event, SecurityEvent};
///
/// log_security_event(SecurityEvent::SshConnectionAttempt, Some("host=10.0.0.1"));
/// ```
pub fn log_security_event(event: SecurityEvent, metadata: Option<&str>) {
    let event_desc = event.description();

    let log_message = if let Some(meta) = metadata {
        format!("SECURITY AUDIT: {} | {}", event_desc, meta)
    } else {
        format!("SECURITY AUDIT: {}", event_desc)
    };

    if event.is_suspicious() {
        warn!("{}", log_message);
    } else {
        info!("{}", log_message);
    }
}

/// Log SSH connection attempt (host and user only)
pub fn log_ssh_connection(host: &str, username: &str) {
    log_security_event(
        SecurityEvent::SshConnectionAttempt,
        Some(&format!(
            "host={} user={}",
            sanitize_hostname(host),
            sanitize_hostname(username)
        )),
    );
}

/// Log SSH session start
pub fn log_ssh_session_start(host: &str) {
    log_security_event(
        SecurityEvent::SshSessionStart,
        Some(&format!("host={}", sanitize_hostname(host))),
    );
}

/// Log SSH session end
pub fn log_ssh_session_end(host: &str, duration_secs: u64) {
    log_security_event(
        SecurityEvent::SshSessionEnd,
        Some(&format!(
            "host={} duration={}s",
            sanitize_hostname(host),
            duration_secs
        )),
    );
}

/// Log the outcome of a host key check
pub fn log_host_key_decision(host: &str, fingerprint: &str, policy: &str, accepted: bool, verified: bool) {
    let event = match (accepted, verified) {
        (false, _) => SecurityEvent::HostKeyRejected,
        (true, true) => SecurityEvent::HostKeyVerified,
        (true, false) => SecurityEvent::HostKeyTrustedOnFirstUse,
    };
    log_security_event(
        event,
        Some(&format!(
            "host={} fingerprint={} policy={}",
            sanitize_hostname(host),
            sanitize_hostname(fingerprint),
            policy
        )),
    );
}

/// Log configuration events
pub fn log_config_event(is_error: bool, details: Option<&str>) {
    let event = if is_error {
        SecurityEvent::ConfigError
    } else {
        SecurityEvent::ConfigLoaded
    };
    log_security_event(event, details);
}

/// Sanitize hostname to prevent log injection
fn sanitize_hostname(host: &str) -> String {
    host.chars()
        .filter(|c| {
            c.is_alphanumeric() || matches!(*c, '.' | '-' | '_' | '@' | ':' | '+' | '/' | '=')
        })
        .take(100)
        .collect()
}
