/// Convergence engine and batch driver
pub mod engine;

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    Validation(String),
    #[error("{kind} {name} was not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The state a task wants the remote resource to end up in.
///
/// Tasks spell this in a handful of historical ways; `present`/`active`/
/// `running` all converge toward existence, `absent`/`deleted` toward
/// removal. `started`/`stopped` are lifecycle transitions on an existing
/// instance, which nothing supports yet, so they fail loudly instead of
/// silently creating or deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Present,
    Absent,
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" | "active" | "running" => Ok(DesiredState::Present),
            "absent" | "deleted" => Ok(DesiredState::Absent),
            "started" | "stopped" => Err(Error::NotImplemented("lifecycle transitions")),
            other => Err(Error::Validation(format!(
                "unknown state {other:?}, expected one of: present, active, running, absent, deleted"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_aliases() {
        for s in ["present", "active", "running"] {
            assert_eq!(s.parse::<DesiredState>().unwrap(), DesiredState::Present);
        }
        for s in ["absent", "deleted"] {
            assert_eq!(s.parse::<DesiredState>().unwrap(), DesiredState::Absent);
        }
    }

    #[test]
    fn lifecycle_states_fail_loudly() {
        assert!(matches!(
            "stopped".parse::<DesiredState>(),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(
            "started".parse::<DesiredState>(),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn unknown_state_is_a_validation_error() {
        assert!(matches!(
            "presnet".parse::<DesiredState>(),
            Err(Error::Validation(_))
        ));
    }
}
