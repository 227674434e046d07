//! Classification states of architecture edges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The classification of an edge.
///
/// Implementation and mapping edges stay `Undefined`. A specified edge is
/// `Specified` until the analysis has run, then one of `Convergent`,
/// `Absent`, or `AllowedAbsent`. A propagated edge is one of `Allowed`,
/// `ImplicitlyAllowed`, or `Divergent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    Undefined,
    Specified,
    /// Propagated edge lifted onto a specified edge.
    Allowed,
    /// Propagated edge with no specified edge lifting it.
    Divergent,
    /// Required specified edge with no propagated edge behind it.
    Absent,
    /// Specified edge with at least one propagated edge behind it.
    Convergent,
    /// Propagated edge permitted by the hierarchy alone.
    ImplicitlyAllowed,
    /// Optional specified edge with no propagated edge behind it.
    AllowedAbsent,
}

impl State {
    /// All states, in declaration order.
    pub const ALL: [State; 8] = [
        State::Undefined,
        State::Specified,
        State::Allowed,
        State::Divergent,
        State::Absent,
        State::Convergent,
        State::ImplicitlyAllowed,
        State::AllowedAbsent,
    ];

    /// Returns `true` for the states a specified edge can be in.
    pub fn is_specified_state(self) -> bool {
        matches!(
            self,
            State::Specified | State::Convergent | State::Absent | State::AllowedAbsent
        )
    }

    /// Returns `true` for the states a propagated edge can be in.
    pub fn is_propagated_state(self) -> bool {
        matches!(
            self,
            State::Allowed | State::ImplicitlyAllowed | State::Divergent
        )
    }

    /// Returns `true` if the state signals a deviation from the architecture.
    pub fn is_violation(self) -> bool {
        matches!(self, State::Divergent | State::Absent)
    }

    /// State of a specified edge carrying `counter` propagated dependencies.
    pub(crate) fn for_specified(counter: u32, optional: bool) -> State {
        if counter > 0 {
            State::Convergent
        } else if optional {
            State::AllowedAbsent
        } else {
            State::Absent
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Undefined => "undefined",
            State::Specified => "specified",
            State::Allowed => "allowed",
            State::Divergent => "divergent",
            State::Absent => "absent",
            State::Convergent => "convergent",
            State::ImplicitlyAllowed => "implicitly allowed",
            State::AllowedAbsent => "allowed absent",
        };
        f.write_str(name)
    }
}
