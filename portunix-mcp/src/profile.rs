//! Authorization/permission profiles.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::catalog::ToolEntry;

/// A served session's permission profile. Filters the visible tool catalog
/// and rejects calls whose owner/capability tags fall outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Only `core.*` tools with no destructive capability tag. Default for
    /// automatic integration setups.
    Limited,
    /// `core.*` tools plus plugin tools, excluding anything tagged
    /// `destructive`. Default for interactive use.
    Standard,
    /// Every registered tool.
    Full,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Standard
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limited" => Ok(Profile::Limited),
            "standard" => Ok(Profile::Standard),
            "full" => Ok(Profile::Full),
            other => Err(format!("unknown permission profile: {other}")),
        }
    }
}

impl Profile {
    /// Whether `entry` is visible to (and callable by) a session with this
    /// profile.
    pub fn allows(&self, entry: &ToolEntry) -> bool {
        match self {
            Profile::Full => true,
            Profile::Standard => !entry.capability_tags.iter().any(|t| t == "destructive"),
            Profile::Limited => {
                entry.owner.is_core()
                    && !entry.capability_tags.iter().any(|t| t == "destructive")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolOwner;

    fn entry(owner: ToolOwner, tags: &[&str]) -> ToolEntry {
        ToolEntry {
            name: "x.y".into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            owner,
            capability_tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn limited_excludes_plugin_tools() {
        let e = entry(ToolOwner::Plugin("p".into()), &[]);
        assert!(!Profile::Limited.allows(&e));
        assert!(Profile::Standard.allows(&e));
        assert!(Profile::Full.allows(&e));
    }

    #[test]
    fn standard_excludes_destructive() {
        let e = entry(ToolOwner::Core, &["destructive"]);
        assert!(!Profile::Standard.allows(&e));
        assert!(Profile::Full.allows(&e));
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!("weird".parse::<Profile>().is_err());
    }
}
