//! VM descriptor and the RAM/disk size grammar.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A byte count parsed from the `^(\d+)\s*([KMGT]?)B?$` grammar
/// (case-insensitive, default unit megabyte, binary multipliers).
/// Round-trips: parsing a spec, re-emitting it via `Display`, and
/// re-parsing yields the same byte count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    pub fn bytes(n: u64) -> Self {
        ByteSize(n)
    }

    pub fn as_bytes(&self) -> u64 {
        self.0
    }

    pub fn as_gib(&self) -> f64 {
        self.0 as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

impl FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let (digits, unit) = split_digits_unit(&upper)
            .ok_or_else(|| Error::validation("size", format!("'{s}' is not a valid size")))?;
        if digits.is_empty() {
            return Err(Error::validation("size", format!("'{s}' has no numeric value")));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| Error::validation("size", format!("'{s}' is not numeric")))?;
        if value == 0 {
            return Err(Error::validation("size", "size must be positive, got 0"));
        }
        let multiplier: u64 = match unit {
            "" | "M" => 1024 * 1024,
            "K" => 1024,
            "G" => 1024 * 1024 * 1024,
            "T" => 1024u64.pow(4),
            other => {
                return Err(Error::validation(
                    "size",
                    format!("unknown size unit '{other}'"),
                ))
            }
        };
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| Error::validation("size", format!("'{s}' overflows a 64-bit byte count")))?;
        Ok(ByteSize(bytes))
    }
}

/// Splits a trimmed, upper-cased size string into its digit run and its
/// unit suffix, accepting an optional trailing `B` (`2G` and `2GB` are
/// both valid per the grammar).
fn split_digits_unit(s: &str) -> Option<(&str, &str)> {
    let s = s.strip_suffix('B').unwrap_or(s);
    let split_at = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, rest) = s.split_at(split_at);
    if rest.len() > 1 {
        return None;
    }
    Some((digits, rest))
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const TB: u64 = 1024u64.pow(4);
        const GB: u64 = 1024 * 1024 * 1024;
        const MB: u64 = 1024 * 1024;
        let b = self.0;
        if b % TB == 0 {
            write!(f, "{}T", b / TB)
        } else if b % GB == 0 {
            write!(f, "{}G", b / GB)
        } else if b % MB == 0 {
            write!(f, "{}M", b / MB)
        } else if b % 1024 == 0 {
            write!(f, "{}K", b / 1024)
        } else {
            write!(f, "{b}B")
        }
    }
}

/// VM state: a closed set, exactly one holds at any instant Lowercase wire representation matches `virt status
/// --simple` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Running,
    Stopped,
    Suspended,
    Starting,
    Stopping,
    Error,
    NotFound,
    Unknown,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmState::Running => "running",
            VmState::Stopped => "stopped",
            VmState::Suspended => "suspended",
            VmState::Starting => "starting",
            VmState::Stopping => "stopping",
            VmState::Error => "error",
            VmState::NotFound => "notfound",
            VmState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Network configuration for a VM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum NetworkConfig {
    Nat {
        #[serde(default)]
        forwards: Vec<PortForward>,
    },
    Bridged {
        interface: String,
    },
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortForward {
    pub host_port: u16,
    pub guest_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// The on-disk, serialized form of a VM (`config.json`). Name matches
/// `[A-Za-z0-9_-]{1,64}` and is globally unique per backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub name: String,
    pub ram: ByteSize,
    pub cpus: u32,
    pub disk_path: std::path::PathBuf,
    pub disk_size: ByteSize,
    pub os_type: String,
    pub iso_path: Option<std::path::PathBuf>,
    pub network: NetworkConfig,
    #[serde(default)]
    pub features: std::collections::HashMap<String, String>,
    pub created_at: u64,
    pub backend: String,
}

impl VmDescriptor {
    pub fn validate_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(Error::validation(
                name,
                "VM name must match [A-Za-z0-9_-]{1,64}",
            ))
        }
    }

    pub fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_megabytes_by_default() {
        assert_eq!("512".parse::<ByteSize>().unwrap().as_bytes(), 512 * 1024 * 1024);
    }

    #[test]
    fn parses_each_unit_case_insensitively() {
        assert_eq!("2g".parse::<ByteSize>().unwrap().as_bytes(), 2 * 1024 * 1024 * 1024);
        assert_eq!("1k".parse::<ByteSize>().unwrap().as_bytes(), 1024);
        assert_eq!("1T".parse::<ByteSize>().unwrap().as_bytes(), 1024u64.pow(4));
        assert_eq!("10GB".parse::<ByteSize>().unwrap().as_bytes(), 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_zero_and_non_numeric() {
        assert!("0".parse::<ByteSize>().is_err());
        assert!("abc".parse::<ByteSize>().is_err());
        assert!("".parse::<ByteSize>().is_err());
        assert!("1X".parse::<ByteSize>().is_err());
    }

    #[test]
    fn display_then_reparse_round_trips() {
        for raw in ["512M", "2G", "1T", "4K", "3"] {
            let parsed = raw.parse::<ByteSize>().unwrap();
            let shown = parsed.to_string();
            let reparsed: ByteSize = shown.parse().unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn vm_name_validation_rejects_bad_characters() {
        assert!(VmDescriptor::validate_name("vm1").is_ok());
        assert!(VmDescriptor::validate_name("my-vm_1").is_ok());
        assert!(VmDescriptor::validate_name("bad name").is_err());
        assert!(VmDescriptor::validate_name("").is_err());
        assert!(VmDescriptor::validate_name(&"a".repeat(65)).is_err());
    }
}
