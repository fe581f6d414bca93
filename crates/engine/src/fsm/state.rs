use serde::{Deserialize, Serialize};

/// Lifecycle of one rule id. `Deleted` doubles as "absent": a fresh id
/// starts there and a fully deleted id returns there, free for reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Draft,
    Validating,
    Compiled,
    Live,
    Persisted,
    Retiring,
    Quarantined,
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Validating => "Validating",
            Self::Compiled => "Compiled",
            Self::Live => "Live",
            Self::Persisted => "Persisted",
            Self::Retiring => "Retiring",
            Self::Quarantined => "Quarantined",
            Self::Deleted => "Deleted",
        }
    }

    /// Forward transitions of the admission protocol. Compensating
    /// rollbacks walk outside this table via `Slot::force`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Deleted, Draft)
                | (Draft, Validating)
                | (Draft, Deleted)
                | (Validating, Compiled)
                | (Validating, Deleted)
                | (Compiled, Live)
                | (Compiled, Deleted)
                | (Live, Persisted)
                | (Live, Retiring)
                | (Persisted, Draft)
                | (Persisted, Retiring)
                | (Persisted, Quarantined)
                | (Quarantined, Draft)
                | (Quarantined, Retiring)
                | (Retiring, Deleted)
        )
    }
}

/// Per-id FSM cell: the state plus a generation counter bumped on every
/// admitted operation.
#[derive(Debug)]
pub struct Slot {
    pub state: LifecycleState,
    pub generation: u64,
}

impl Slot {
    pub fn absent() -> Self {
        Self {
            state: LifecycleState::Deleted,
            generation: 0,
        }
    }

    pub fn transition(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Used by compensating rollback and crash recovery, which restore a
    /// prior state without walking the forward table.
    pub fn force(&mut self, state: LifecycleState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn create_path_is_legal() {
        for (from, to) in [
            (Deleted, Draft),
            (Draft, Validating),
            (Validating, Compiled),
            (Compiled, Live),
            (Live, Persisted),
        ] {
            assert!(from.can_transition_to(to), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn delete_path_is_legal() {
        assert!(Persisted.can_transition_to(Retiring));
        assert!(Retiring.can_transition_to(Deleted));
        assert!(Deleted.can_transition_to(Draft));
    }

    #[test]
    fn quarantine_paths() {
        assert!(Persisted.can_transition_to(Quarantined));
        assert!(Quarantined.can_transition_to(Draft));
        assert!(Quarantined.can_transition_to(Retiring));
        assert!(!Quarantined.can_transition_to(Persisted));
    }

    #[test]
    fn skipping_admission_steps_is_illegal() {
        assert!(!Draft.can_transition_to(Live));
        assert!(!Validating.can_transition_to(Persisted));
        assert!(!Deleted.can_transition_to(Persisted));
        assert!(!Persisted.can_transition_to(Live));
    }

    #[test]
    fn slot_tracks_generation_independently_of_state() {
        let mut slot = Slot::absent();
        assert_eq!(slot.state, Deleted);
        slot.transition(Draft);
        slot.generation += 1;
        slot.transition(Validating);
        assert_eq!(slot.generation, 1);
    }
}
