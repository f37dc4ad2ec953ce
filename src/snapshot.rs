use crate::error::SnapshotError;
use crate::event::TraceEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content of one grammar position in the persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    /// A leaf trace event.
    Event(TraceEvent),
    /// A reference to a rule defined in the same snapshot.
    Rule(u32),
}

/// One grammar position: a content value and how often it repeats there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducedTraceElement {
    pub content: Content,
    pub occurrences: u32,
}

/// The persisted, transmitted form of a compressed trace.
///
/// The top-level sequence and every rule body share one shape: an ordered
/// list of `(content, occurrences)` pairs. Expansion through
/// [`CompressedTrace::expand`] reproduces the exact event sequence the
/// grammar was built from; this is the contract consumed by the metrics and
/// clustering side, which projects the events onto entity accesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedTrace {
    pub top_level: Vec<ReducedTraceElement>,
    pub rules: BTreeMap<u32, Vec<ReducedTraceElement>>,
}

impl CompressedTrace {
    /// Lazily expands the snapshot back into the flat event sequence.
    ///
    /// Restartable: each call starts a fresh pass. Expansion follows rule
    /// references by id and panics on a reference the snapshot does not
    /// define; run [`CompressedTrace::check`] first on data from an
    /// untrusted store.
    pub fn expand(&self) -> SnapshotIter<'_> {
        SnapshotIter::new(self)
    }

    /// Total number of events the snapshot expands to.
    pub fn expanded_len(&self) -> usize {
        self.expand().count()
    }

    /// Verifies a (possibly deserialized) snapshot before use.
    ///
    /// Checks that every rule reference resolves, no occurrence count is
    /// zero, every rule body has at least two elements, every rule is
    /// referenced at least twice, and no rule reaches itself.
    pub fn check(&self) -> Result<(), SnapshotError> {
        let mut reference_counts: BTreeMap<u32, u32> = BTreeMap::new();

        for (rule_id, body) in &self.rules {
            if body.len() < 2 {
                return Err(SnapshotError::DegenerateRuleBody {
                    rule_id: *rule_id,
                    len: body.len(),
                });
            }
        }

        let bodies = std::iter::once((None, &self.top_level))
            .chain(self.rules.iter().map(|(id, body)| (Some(*id), body)));

        for (owner, body) in bodies {
            for element in body {
                if element.occurrences == 0 {
                    return Err(SnapshotError::ZeroOccurrences {
                        rule_id: owner.unwrap_or(0),
                    });
                }
                if let Content::Rule(rule_id) = element.content {
                    if !self.rules.contains_key(&rule_id) {
                        return Err(SnapshotError::DanglingRule { rule_id });
                    }
                    *reference_counts.entry(rule_id).or_insert(0) += element.occurrences;
                }
            }
        }

        for (&rule_id, _) in &self.rules {
            let count = reference_counts.get(&rule_id).copied().unwrap_or(0);
            if count < 2 {
                return Err(SnapshotError::UnderusedRule { rule_id, count });
            }
        }

        self.check_acyclic()
    }

    /// Depth-first search over the rule reference graph.
    fn check_acyclic(&self) -> Result<(), SnapshotError> {
        const UNSEEN: u8 = 0;
        const IN_PROGRESS: u8 = 1;
        const DONE: u8 = 2;

        let mut state: BTreeMap<u32, u8> = BTreeMap::new();

        fn visit(
            trace: &CompressedTrace,
            rule_id: u32,
            state: &mut BTreeMap<u32, u8>,
        ) -> Result<(), SnapshotError> {
            match state.get(&rule_id).copied().unwrap_or(UNSEEN) {
                DONE => return Ok(()),
                IN_PROGRESS => return Err(SnapshotError::RecursiveRule { rule_id }),
                _ => {}
            }
            state.insert(rule_id, IN_PROGRESS);
            if let Some(body) = trace.rules.get(&rule_id) {
                for element in body {
                    if let Content::Rule(inner) = element.content {
                        visit(trace, inner, state)?;
                    }
                }
            }
            state.insert(rule_id, DONE);
            Ok(())
        }

        for element in &self.top_level {
            if let Content::Rule(rule_id) = element.content {
                visit(self, rule_id, &mut state)?;
            }
        }
        for &rule_id in self.rules.keys() {
            visit(self, rule_id, &mut state)?;
        }
        Ok(())
    }
}

/// Lazy expansion of a [`CompressedTrace`].
pub struct SnapshotIter<'a> {
    rules: &'a BTreeMap<u32, Vec<ReducedTraceElement>>,
    stack: Vec<Frame<'a>>,
}

/// One body being walked, with the occurrences left at its cursor.
struct Frame<'a> {
    body: &'a [ReducedTraceElement],
    pos: usize,
    left: u32,
}

impl<'a> Frame<'a> {
    fn new(body: &'a [ReducedTraceElement]) -> Self {
        let left = body.first().map(|e| e.occurrences).unwrap_or(0);
        Self { body, pos: 0, left }
    }
}

impl<'a> SnapshotIter<'a> {
    fn new(trace: &'a CompressedTrace) -> Self {
        Self {
            rules: &trace.rules,
            stack: vec![Frame::new(&trace.top_level)],
        }
    }
}

impl<'a> Iterator for SnapshotIter<'a> {
    type Item = &'a TraceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;

            if frame.pos >= frame.body.len() {
                self.stack.pop();
                continue;
            }

            if frame.left == 0 {
                frame.pos += 1;
                frame.left = frame.body.get(frame.pos).map(|e| e.occurrences).unwrap_or(0);
                continue;
            }

            frame.left -= 1;
            match &frame.body[frame.pos].content {
                Content::Event(event) => return Some(event),
                Content::Rule(rule_id) => {
                    let body = self
                        .rules
                        .get(rule_id)
                        .expect("compressed trace references a defined rule");
                    self.stack.push(Frame::new(body));
                }
            }
        }
    }
}
