use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally observable run condition of a machine, as reported by its driver.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    #[default]
    None,
    Running,
    Paused,
    Saved,
    Stopped,
    Stopping,
    Starting,
    Error,
    Timeout,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::None => "none",
            MachineState::Running => "running",
            MachineState::Paused => "paused",
            MachineState::Saved => "saved",
            MachineState::Stopped => "stopped",
            MachineState::Stopping => "stopping",
            MachineState::Starting => "starting",
            MachineState::Error => "error",
            MachineState::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        for state in [
            MachineState::None,
            MachineState::Running,
            MachineState::Paused,
            MachineState::Saved,
            MachineState::Stopped,
            MachineState::Stopping,
            MachineState::Starting,
            MachineState::Error,
            MachineState::Timeout,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn default_is_none() {
        assert_eq!(MachineState::default(), MachineState::None);
    }
}
