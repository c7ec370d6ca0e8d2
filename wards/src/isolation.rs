use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use crate::seccomp::SeccompProfile;
use crate::PolicyError;

/// Network mode handed to the runtime. Not configurable.
pub const NETWORK_MODE: &str = "none";

// Smallest ceiling the common engines accept.
const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

static MEMORY_RE: OnceLock<Regex> = OnceLock::new();

fn memory_re() -> &'static Regex {
    MEMORY_RE.get_or_init(|| {
        Regex::new(r"^(?i)([0-9]+)([bkmg]?)$").unwrap_or_else(|e| panic!("memory regex: {e}"))
    })
}

/// Memory ceiling in the `<n>[b|k|m|g]` notation container CLIs use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryLimit {
    raw: String,
    bytes: u64,
}

impl MemoryLimit {
    pub fn parse(value: &str) -> Result<Self, PolicyError> {
        let trimmed = value.trim();
        let invalid = |reason: &str| PolicyError::InvalidMemoryLimit {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let caps = memory_re()
            .captures(trimmed)
            .ok_or_else(|| invalid("expected <number>[b|k|m|g]"))?;
        let amount: u64 = caps[1].parse().map_err(|_| invalid("number out of range"))?;
        let unit = caps[2].to_ascii_lowercase();
        let multiplier: u64 = match unit.as_str() {
            "" | "b" => 1,
            "k" => 1024,
            "m" => 1024 * 1024,
            _ => 1024 * 1024 * 1024,
        };
        let bytes = amount
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("number out of range"))?;
        if bytes < MIN_MEMORY_BYTES {
            return Err(invalid("must be at least 6m"));
        }

        Ok(Self {
            raw: format!("{}{}", amount, unit),
            bytes,
        })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn as_arg(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The containment policy for one run. Construct through [`IsolationPolicy::new`]
/// so every instance carries all four guarantees.
#[derive(Debug, Clone, Serialize)]
pub struct IsolationPolicy {
    memory_limit: MemoryLimit,
    seccomp: SeccompProfile,
    #[serde(serialize_with = "serialize_secs")]
    timeout: Duration,
    pids_limit: Option<u32>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl IsolationPolicy {
    pub fn new(
        memory_limit: MemoryLimit,
        seccomp: SeccompProfile,
        timeout: Duration,
        pids_limit: Option<u32>,
    ) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(Self {
            memory_limit,
            seccomp,
            timeout,
            pids_limit: pids_limit.filter(|n| *n > 0),
        })
    }

    pub fn network_mode(&self) -> &'static str {
        NETWORK_MODE
    }

    pub fn memory_limit(&self) -> &MemoryLimit {
        &self.memory_limit
    }

    pub fn seccomp(&self) -> &SeccompProfile {
        &self.seccomp
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pids_limit(&self) -> Option<u32> {
        self.pids_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_suffixes() {
        assert_eq!(MemoryLimit::parse("256m").unwrap().bytes(), 256 * 1024 * 1024);
        assert_eq!(MemoryLimit::parse("1G").unwrap().as_arg(), "1g");
        assert_eq!(MemoryLimit::parse(" 8192k ").unwrap().bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn rejects_garbage_and_tiny_limits() {
        assert!(MemoryLimit::parse("").is_err());
        assert!(MemoryLimit::parse("lots").is_err());
        assert!(MemoryLimit::parse("256mb").is_err());
        assert!(MemoryLimit::parse("1m").is_err());
        assert!(MemoryLimit::parse("99999999999999999999g").is_err());
    }
}
