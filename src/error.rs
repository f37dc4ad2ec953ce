use thiserror::Error;

/// A trace event rejected before it entered the grammar.
///
/// These are caller errors, not engine defects: the grammar is left exactly
/// as it was and the next well-formed event can be appended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    /// The event carries no owner type.
    #[error("trace event has an empty owner type")]
    MissingOwnerType,

    /// The event carries no member name.
    #[error("trace event has an empty member name")]
    MissingMemberName,
}

/// A structural invariant found broken by the read-only validator.
///
/// Any of these signals a defect in the compression engine itself, never bad
/// input: the append path is required to restore every invariant before it
/// returns. The mutation path additionally guards the same conditions with
/// asserts and aborts rather than continuing on corrupted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A rule body's forward/backward links disagree, or the body does not
    /// terminate at the rule's own tail sentinel.
    #[error("rule {rule_id} has inconsistent symbol links")]
    BrokenLink { rule_id: u32 },

    /// Two adjacent positions hold equal content instead of one run.
    #[error("rule {rule_id} holds equal content at adjacent positions starting at {position}")]
    AdjacentEqualContent { rule_id: u32, position: usize },

    /// A position claims zero occurrences.
    #[error("rule {rule_id} has a zero-length run at position {position}")]
    ZeroRun { rule_id: u32, position: usize },

    /// A rule body shorter than two elements.
    #[error("rule {rule_id} has a degenerate body of length {len}")]
    DegenerateRule { rule_id: u32, len: usize },

    /// A rule referenced fewer than two times.
    #[error("rule {rule_id} is only referenced {count} times")]
    UnderusedRule { rule_id: u32, count: u32 },

    /// A rule's stored usage counter disagrees with the references that
    /// actually exist in the structure.
    #[error("rule {rule_id} stores usage {stored} but is referenced {actual} times")]
    UsageMismatch { rule_id: u32, stored: u32, actual: u32 },

    /// A reference to a rule id absent from the rule table.
    #[error("reference to unknown rule {rule_id}")]
    DanglingRuleRef { rule_id: u32 },

    /// The same digram occurs at two locations.
    #[error("duplicate digram in rules {rule_id} and {other_rule_id}")]
    DuplicateDigram { rule_id: u32, other_rule_id: u32 },

    /// An adjacency with no digram index entry.
    #[error("unindexed digram in rule {rule_id} at position {position}")]
    MissingDigramEntry { rule_id: u32, position: usize },

    /// A digram index entry naming a position that holds something else.
    #[error("digram index entry for rule {rule_id} position {position} names the wrong location")]
    MisdirectedDigramEntry { rule_id: u32, position: usize },

    /// A digram index entry naming a position that no longer exists.
    #[error("digram index entry references a removed location")]
    StaleDigramEntry,

    /// Expansion diverged from the recorded append history.
    #[error("expansion diverges from recorded history at event {position}")]
    RoundTripMismatch { position: usize },
}

/// A defect in a deserialized compressed trace.
///
/// Unlike [`InvariantViolation`], these are recoverable: persisted data from
/// an external store may be arbitrarily damaged, and the caller decides what
/// to do with a bad snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// A reference to a rule id the snapshot does not define.
    #[error("compressed trace references unknown rule {rule_id}")]
    DanglingRule { rule_id: u32 },

    /// An element with an occurrence count of zero.
    #[error("rule {rule_id} contains an element with zero occurrences")]
    ZeroOccurrences { rule_id: u32 },

    /// A rule body shorter than two elements.
    #[error("rule {rule_id} has a degenerate body of length {len}")]
    DegenerateRuleBody { rule_id: u32, len: usize },

    /// A rule referenced fewer than two times across the snapshot.
    #[error("rule {rule_id} is only referenced {count} times")]
    UnderusedRule { rule_id: u32, count: u32 },

    /// A rule that reaches itself through its own body; expansion would
    /// never terminate.
    #[error("rule {rule_id} participates in a reference cycle")]
    RecursiveRule { rule_id: u32 },
}
