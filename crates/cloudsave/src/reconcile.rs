use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::manifest::LastSaved;

/// Relationship between the newest local save and the remote manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    InSync,
    LocalAhead,
    RemoteAhead,
    Unknown,
}

/// What the engine recommends for a state. Nothing mutating happens without
/// explicit confirmation; this is a recommendation, not a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    NoOp,
    Upload,
    Download,
    AskUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub state: SyncState,
    pub recommended: SyncAction,
}

/// Pure decision table. Equality is exact at millisecond precision; there is
/// deliberately no clock-skew tolerance window.
pub fn decide(local_newest: DateTime<Utc>, last_saved: &LastSaved) -> SyncDecision {
    match last_saved {
        LastSaved::Never => SyncDecision {
            state: SyncState::LocalAhead,
            recommended: SyncAction::Upload,
        },
        LastSaved::Invalid(_) => SyncDecision {
            state: SyncState::Unknown,
            recommended: SyncAction::AskUser,
        },
        LastSaved::At(remote) => match remote.cmp(&local_newest) {
            Ordering::Less => SyncDecision {
                state: SyncState::LocalAhead,
                recommended: SyncAction::Upload,
            },
            Ordering::Greater => SyncDecision {
                state: SyncState::RemoteAhead,
                recommended: SyncAction::Download,
            },
            Ordering::Equal => SyncDecision {
                state: SyncState::InSync,
                recommended: SyncAction::NoOp,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().expect("timestamp")
    }

    #[test]
    fn never_synced_is_local_ahead() {
        let d = decide(at(1_000), &LastSaved::Never);
        assert_eq!(d.state, SyncState::LocalAhead);
        assert_eq!(d.recommended, SyncAction::Upload);
    }

    #[test]
    fn older_manifest_is_local_ahead() {
        let d = decide(at(2_000), &LastSaved::At(at(1_000)));
        assert_eq!(d.state, SyncState::LocalAhead);
        assert_eq!(d.recommended, SyncAction::Upload);
    }

    #[test]
    fn newer_manifest_is_remote_ahead() {
        let d = decide(at(1_000), &LastSaved::At(at(2_000)));
        assert_eq!(d.state, SyncState::RemoteAhead);
        assert_eq!(d.recommended, SyncAction::Download);
    }

    #[test]
    fn exact_equality_is_in_sync() {
        let d = decide(at(5_000), &LastSaved::At(at(5_000)));
        assert_eq!(d.state, SyncState::InSync);
        assert_eq!(d.recommended, SyncAction::NoOp);
    }

    #[test]
    fn one_millisecond_apart_is_not_in_sync() {
        let d = decide(at(5_000), &LastSaved::At(at(5_001)));
        assert_eq!(d.state, SyncState::RemoteAhead);
    }

    #[test]
    fn invalid_timestamp_is_unknown() {
        let d = decide(at(1_000), &LastSaved::Invalid("soon".into()));
        assert_eq!(d.state, SyncState::Unknown);
        assert_eq!(d.recommended, SyncAction::AskUser);
    }

    #[test]
    fn decisions_are_deterministic() {
        let inputs = [
            LastSaved::Never,
            LastSaved::At(at(999)),
            LastSaved::At(at(1_000)),
            LastSaved::At(at(1_001)),
            LastSaved::Invalid("x".into()),
        ];
        for last in &inputs {
            assert_eq!(decide(at(1_000), last), decide(at(1_000), last));
        }
    }
}
