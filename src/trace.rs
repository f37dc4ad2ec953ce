use crate::error::{InvariantViolation, MalformedEvent};
use crate::event::TraceEvent;
use crate::grammar::{GrammarStore, ROOT_RULE_ID};
use crate::snapshot::{CompressedTrace, Content, ReducedTraceElement};
use crate::symbol::{Symbol, SymbolNode};
use slotmap::DefaultKey;
use std::collections::BTreeMap;

/// Incrementally compressed view of one execution trace.
///
/// Events are appended one at a time in arrival order; after every append
/// the grammar is back in a fully consistent state: every digram occurs at
/// one location, every rule is referenced at least twice, and consecutive
/// identical events are folded into occurrence counts rather than rules.
///
/// One instance holds one logical trace. Appending requires `&mut self`, so
/// the single-writer discipline is enforced by the borrow checker;
/// independent traces use independent instances and can be built in
/// parallel.
pub struct TraceGrammar {
    pub(crate) store: GrammarStore,

    /// Tail sentinel of the root rule; appends happen just before it.
    pub(crate) sequence_end: DefaultKey,

    /// Number of events accepted so far.
    length: usize,

    /// Append-only log of accepted events, kept only when requested.
    pub(crate) history: Option<Vec<TraceEvent>>,
}

impl TraceGrammar {
    /// Creates an empty grammar.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty grammar that records every accepted event.
    ///
    /// The log grows linearly with the input and exists for offline
    /// verification (the validator's round-trip check); production
    /// collection should use [`TraceGrammar::new`].
    pub fn with_history() -> Self {
        Self::build(Some(Vec::new()))
    }

    fn build(history: Option<Vec<TraceEvent>>) -> Self {
        let mut store = GrammarStore::new();

        let rule_id = store.id_gen.acquire();
        debug_assert_eq!(rule_id, ROOT_RULE_ID, "root rule must get id 0");

        let head_key = store.new_rule_body(rule_id);
        let tail_key = match store.symbols[head_key].symbol {
            Symbol::RuleHead { tail, .. } => tail,
            _ => unreachable!(),
        };

        Self {
            store,
            sequence_end: tail_key,
            length: 0,
            history,
        }
    }

    /// Appends one observed event.
    ///
    /// Rejects events that cannot identify a member, leaving the grammar
    /// untouched; otherwise runs the full restructuring cascade to a fixed
    /// point before returning.
    pub fn append(&mut self, event: TraceEvent) -> Result<(), MalformedEvent> {
        event.check_well_formed()?;

        if let Some(history) = &mut self.history {
            history.push(event.clone());
        }

        let tail_key = self.sequence_end;
        let prev_key = self.store.symbols[tail_key].prev;

        // Run-length fold: a repeat of the last event extends its run and
        // triggers no digram work.
        if let Some(prev) = prev_key {
            if let Symbol::Event(last) = &self.store.symbols[prev].symbol {
                if *last == event {
                    self.store.symbols[prev].run += 1;
                    self.length += 1;
                    return Ok(());
                }
            }
        }

        let new_key = self
            .store
            .symbols
            .insert(SymbolNode::new(Symbol::Event(event)));

        self.store.symbols[new_key].next = Some(tail_key);
        self.store.symbols[new_key].prev = prev_key;
        self.store.symbols[tail_key].prev = Some(new_key);
        if let Some(prev) = prev_key {
            self.store.symbols[prev].next = Some(new_key);
        }

        self.length += 1;

        if let Some(prev) = prev_key {
            if !self.store.is_sequence_start(&self.store.symbols[prev].symbol) {
                self.store.on_link(prev);
            }
        }

        Ok(())
    }

    /// Appends every event of an iterator, stopping at the first rejection.
    pub fn append_all<I>(&mut self, events: I) -> Result<(), MalformedEvent>
    where
        I: IntoIterator<Item = TraceEvent>,
    {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }

    /// Number of events accepted so far.
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if no event has been accepted.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of rules in the table, not counting the top-level sequence.
    pub fn rule_count(&self) -> usize {
        self.store.rule_index.len().saturating_sub(1)
    }

    /// The recorded event log, if this grammar keeps one.
    pub fn history(&self) -> Option<&[TraceEvent]> {
        self.history.as_deref()
    }

    /// Runs every structural invariant check over the current state.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        crate::validate::validate(self)
    }

    /// Captures the current compressed state in its persistable shape.
    pub fn snapshot(&self) -> CompressedTrace {
        let mut top_level = Vec::new();
        let mut rules = BTreeMap::new();

        for (&rule_id, &head_key) in self.store.rule_index.iter() {
            let body = self.body_elements(head_key);
            if rule_id == ROOT_RULE_ID {
                top_level = body;
            } else {
                rules.insert(rule_id, body);
            }
        }

        CompressedTrace { top_level, rules }
    }

    fn body_elements(&self, head_key: DefaultKey) -> Vec<ReducedTraceElement> {
        let mut elements = Vec::new();
        let mut current = self.store.symbols[head_key].next;

        while let Some(key) = current {
            let node = &self.store.symbols[key];
            match &node.symbol {
                Symbol::RuleTail => break,
                Symbol::Event(event) => elements.push(ReducedTraceElement {
                    content: Content::Event(event.clone()),
                    occurrences: node.run,
                }),
                Symbol::RuleRef { rule_id } => elements.push(ReducedTraceElement {
                    content: Content::Rule(*rule_id),
                    occurrences: node.run,
                }),
                Symbol::RuleHead { .. } => unreachable!("rule head inside a body"),
            }
            current = node.next;
        }

        elements
    }

    /// Compression statistics for the current state.
    pub fn stats(&self) -> CompressionStats {
        let mut positions = 0usize;
        let mut expanded = 0u64;

        for &head_key in self.store.rule_index.values() {
            let mut current = self.store.symbols[head_key].next;
            while let Some(key) = current {
                let node = &self.store.symbols[key];
                if matches!(node.symbol, Symbol::RuleTail) {
                    break;
                }
                positions += 1;
                expanded += u64::from(node.run);
                current = node.next;
            }
        }

        CompressionStats {
            input_length: self.length,
            positions,
            expanded_symbols: expanded,
            rules: self.rule_count(),
        }
    }
}

impl Default for TraceGrammar {
    fn default() -> Self {
        Self::new()
    }
}

/// Size measurements of a compressed trace.
#[derive(Debug, Clone, Copy)]
pub struct CompressionStats {
    /// Number of events appended.
    pub input_length: usize,
    /// Positions across all bodies, runs counted once.
    pub positions: usize,
    /// Symbols across all bodies with runs expanded.
    pub expanded_symbols: u64,
    /// Rules in the table, excluding the top-level sequence.
    pub rules: usize,
}

impl CompressionStats {
    /// Positions kept per input event, as a percentage.
    pub fn compression_ratio(&self) -> f64 {
        if self.input_length == 0 {
            0.0
        } else {
            (self.positions as f64 / self.input_length as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(member: &str) -> TraceEvent {
        TraceEvent::new("app.OrderService", member, vec![])
    }

    #[test]
    fn test_new_is_empty() {
        let grammar = TraceGrammar::new();
        assert_eq!(grammar.len(), 0);
        assert!(grammar.is_empty());
        assert_eq!(grammar.rule_count(), 0);
    }

    #[test]
    fn test_append_counts_events() {
        let mut grammar = TraceGrammar::new();
        grammar.append(event("create")).unwrap();
        grammar.append(event("update")).unwrap();
        assert_eq!(grammar.len(), 2);
        assert!(!grammar.is_empty());
    }

    #[test]
    fn test_repeats_fold_into_one_run() {
        let mut grammar = TraceGrammar::new();
        for _ in 0..5 {
            grammar.append(event("poll")).unwrap();
        }

        assert_eq!(grammar.len(), 5);
        let stats = grammar.stats();
        assert_eq!(stats.positions, 1);
        assert_eq!(stats.expanded_symbols, 5);
        assert_eq!(stats.rules, 0);
    }

    #[test]
    fn test_depth_does_not_block_folding() {
        let mut grammar = TraceGrammar::new();
        grammar.append(event("poll").with_depth(1)).unwrap();
        grammar.append(event("poll").with_depth(2)).unwrap();

        assert_eq!(grammar.stats().positions, 1);
    }

    #[test]
    fn test_malformed_event_leaves_grammar_untouched() {
        let mut grammar = TraceGrammar::with_history();
        grammar.append(event("create")).unwrap();

        let rejected = grammar.append(TraceEvent::new("", "update", vec![]));
        assert_eq!(rejected, Err(MalformedEvent::MissingOwnerType));

        assert_eq!(grammar.len(), 1);
        assert_eq!(grammar.history().unwrap().len(), 1);
        grammar.validate().unwrap();

        grammar.append(event("update")).unwrap();
        assert_eq!(grammar.len(), 2);
    }

    #[test]
    fn test_duplicate_digram_becomes_rule() {
        let mut grammar = TraceGrammar::new();
        grammar
            .append_all(["open", "close", "open", "close"].map(event))
            .unwrap();

        assert_eq!(grammar.rule_count(), 1);
        grammar.validate().unwrap();
    }

    #[test]
    fn test_stats_ratio_on_empty() {
        let grammar = TraceGrammar::new();
        assert_eq!(grammar.stats().compression_ratio(), 0.0);
    }
}
