//! Host Key Policy
//!
//! Decides whether a device's SSH host key is trusted. `AcceptAll` is
//! trust-on-first-use without persistence; every acceptance under it is
//! audited as unverified.

use russh::keys::{HashAlg, PublicKey};
use std::path::PathBuf;
use tracing::warn;

/// How host identities are verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any host key
    AcceptAll,
    /// Accept only keys whose SHA256 fingerprint is listed
    PinnedFingerprint(Vec<String>),
    /// Accept only keys recorded for the host in an OpenSSH known_hosts file
    KnownHostsFile(PathBuf),
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::AcceptAll
    }
}

/// Result of checking one host key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyDecision {
    /// The connection may proceed
    pub accepted: bool,
    /// The key was matched against something the user configured
    pub verified: bool,
    /// `SHA256:` fingerprint of the key
    pub fingerprint: String,
}

impl HostKeyPolicy {
    /// Short policy name for logs
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyPolicy::AcceptAll => "accept-all",
            HostKeyPolicy::PinnedFingerprint(_) => "pinned-fingerprint",
            HostKeyPolicy::KnownHostsFile(_) => "known-hosts-file",
        }
    }

    /// Check the key presented by `host:port`
    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyDecision {
        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();

        let (accepted, verified) = match self {
            HostKeyPolicy::AcceptAll => (true, false),
            HostKeyPolicy::PinnedFingerprint(pins) => {
                let matched = fingerprint_matches(pins, &fingerprint);
                (matched, matched)
            }
            HostKeyPolicy::KnownHostsFile(path) => {
                match russh::keys::check_known_hosts_path(host, port, key, path) {
                    Ok(known) => (known, known),
                    Err(e) => {
                        warn!(
                            "Host key check against {} failed for {}: {}",
                            path.display(),
                            host,
                            e
                        );
                        (false, false)
                    }
                }
            }
        };

        HostKeyDecision {
            accepted,
            verified,
            fingerprint,
        }
    }
}

/// Compare a fingerprint against pins, with or without the `SHA256:` prefix
/// and base64 padding
pub fn fingerprint_matches(pins: &[String], fingerprint: &str) -> bool {
    let normalise = |fp: &str| -> String {
        let fp = fp.trim();
        let fp = fp.strip_prefix("SHA256:").unwrap_or(fp);
        fp.trim_end_matches('=').to_string()
    };
    let wanted = normalise(fingerprint);
    pins.iter().any(|pin| normalise(pin) == wanted)
}
