use crate::grammar::{GrammarStore, ROOT_RULE_ID};
use crate::symbol::Symbol;
use crate::trace::TraceGrammar;
use slotmap::DefaultKey;

/// Iterator replaying the original event sequence from a live grammar.
///
/// Walks the top-level sequence, descending into rule bodies through an
/// explicit stack and yielding each position `run` times. Lazy and
/// restartable: a fresh call to [`TraceGrammar::iter`] starts over, and two
/// passes over the same grammar yield identical sequences.
pub struct TraceIter<'a> {
    store: &'a GrammarStore,
    current: Option<DefaultKey>,
    /// Occurrences left to yield for the current node.
    remaining_run: u32,
    stack: Vec<StackEntry>,
}

/// One suspended rule reference on the descent stack.
struct StackEntry {
    key: DefaultKey,
    /// Occurrences of the reference still to be expanded.
    remaining_run: u32,
}

impl<'a> TraceIter<'a> {
    pub(crate) fn new(grammar: &'a TraceGrammar) -> Self {
        let root_head = *grammar
            .store
            .rule_index
            .get(&ROOT_RULE_ID)
            .expect("root rule always exists");
        let start = grammar.store.symbols[root_head]
            .next
            .expect("root head has a successor");

        let mut iter = Self {
            store: &grammar.store,
            current: None,
            remaining_run: 0,
            stack: Vec::new(),
        };
        iter.resolve_to_event(start);
        iter
    }

    /// Walks forward (descending into rules) until positioned on an event.
    fn resolve_to_event(&mut self, mut key: DefaultKey) {
        loop {
            match &self.store.symbols[key].symbol {
                Symbol::Event(_) => {
                    self.current = Some(key);
                    self.remaining_run = self.store.symbols[key].run;
                    return;
                }

                Symbol::RuleRef { rule_id } => {
                    let run = self.store.symbols[key].run;
                    self.stack.push(StackEntry {
                        key,
                        remaining_run: run,
                    });

                    let rule_head = *self
                        .store
                        .rule_index
                        .get(rule_id)
                        .expect("referenced rule exists");
                    key = self.store.symbols[rule_head]
                        .next
                        .expect("rule head has a successor");
                }

                Symbol::RuleHead { .. } => {
                    key = self.store.symbols[key]
                        .next
                        .expect("rule head has a successor");
                }

                Symbol::RuleTail => {
                    if let Some(entry) = self.stack.pop() {
                        let left = entry.remaining_run - 1;
                        if left > 0 {
                            // The reference repeats; replay the rule body.
                            self.stack.push(StackEntry {
                                key: entry.key,
                                remaining_run: left,
                            });

                            if let Symbol::RuleRef { rule_id } = self.store.symbols[entry.key].symbol
                            {
                                let rule_head = *self
                                    .store
                                    .rule_index
                                    .get(&rule_id)
                                    .expect("referenced rule exists");
                                key = self.store.symbols[rule_head]
                                    .next
                                    .expect("rule head has a successor");
                                continue;
                            }
                        }

                        if let Some(next) = self.store.symbols[entry.key].next {
                            key = next;
                            continue;
                        }
                    }

                    self.current = None;
                    self.remaining_run = 0;
                    return;
                }
            }
        }
    }

    fn advance(&mut self) {
        if self.remaining_run > 1 {
            self.remaining_run -= 1;
            return;
        }

        let Some(current) = self.current else {
            return;
        };

        if let Some(next) = self.store.symbols[current].next {
            self.resolve_to_event(next);
        } else {
            self.current = None;
            self.remaining_run = 0;
        }
    }
}

impl<'a> Iterator for TraceIter<'a> {
    type Item = &'a crate::event::TraceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;

        let event = match &self.store.symbols[current].symbol {
            Symbol::Event(event) => event,
            _ => unreachable!("iterator always rests on an event"),
        };

        self.advance();

        Some(event)
    }
}

impl TraceGrammar {
    /// Replays the original event sequence from the compressed state.
    pub fn iter(&self) -> TraceIter<'_> {
        TraceIter::new(self)
    }
}

impl<'a> IntoIterator for &'a TraceGrammar {
    type Item = &'a crate::event::TraceEvent;
    type IntoIter = TraceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
