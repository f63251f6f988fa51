//! Plugin lifecycle state machine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PluginState {
    Created,
    Installed,
    Enabled,
    Started,
    Running,
    Disabled,
    Stopped,
    Error,
    Uninstalled,
}

impl PluginState {
    /// The legal state machine edges. `Uninstalled` is terminal; no edge
    /// leaves it.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Created, Installed)
                | (Installed, Enabled)
                | (Installed, Uninstalled)
                | (Enabled, Started)
                | (Enabled, Disabled)
                | (Started, Running)
                | (Started, Stopped)
                | (Started, Error)
                | (Running, Stopped)
                | (Running, Error)
                | (Disabled, Uninstalled)
                | (Disabled, Enabled)
                | (Stopped, Uninstalled)
                | (Stopped, Started)
                | (Error, Uninstalled)
                | (Error, Started)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluginState::*;

    #[test]
    fn forward_edges_are_allowed() {
        assert!(Created.can_transition_to(Installed));
        assert!(Installed.can_transition_to(Enabled));
        assert!(Enabled.can_transition_to(Started));
        assert!(Started.can_transition_to(Running));
    }

    #[test]
    fn backward_edges_outside_the_documented_set_are_rejected() {
        assert!(!Running.can_transition_to(Created));
        assert!(!Installed.can_transition_to(Running));
    }

    #[test]
    fn uninstalled_is_terminal() {
        assert!(!Uninstalled.can_transition_to(Installed));
        assert!(!Uninstalled.can_transition_to(Created));
    }
}
