//! Read-only structural checks over a grammar.
//!
//! The append path is required to leave every invariant intact before it
//! returns; these functions verify that from the outside, without mutating
//! anything, and report the first breach as a structured value. They run in
//! tests after every append and are cheap enough to call from debug builds
//! of a collector.

use crate::error::InvariantViolation;
use crate::grammar::{GrammarStore, ROOT_RULE_ID};
use crate::symbol::{DigramKey, Symbol};
use crate::trace::TraceGrammar;
use ahash::AHashMap as HashMap;
use slotmap::DefaultKey;

/// Checks every structural invariant of the grammar.
///
/// Verifies, in order: link structure of every body, run-length canonical
/// form, body minimality, dangling references, usage counters (stored
/// against actually present references), digram uniqueness, index
/// consistency in both directions, and — when the grammar records history —
/// that expansion reproduces the append order exactly.
pub fn validate(grammar: &TraceGrammar) -> Result<(), InvariantViolation> {
    let store = &grammar.store;

    let mut bodies: Vec<(u32, Vec<DefaultKey>)> = Vec::new();
    for (&rule_id, &head_key) in store.rule_index.iter() {
        bodies.push((rule_id, walk_body(store, rule_id, head_key)?));
    }
    bodies.sort_by_key(|(rule_id, _)| *rule_id);

    for (rule_id, body) in &bodies {
        for (position, &key) in body.iter().enumerate() {
            if store.symbols[key].run == 0 {
                return Err(InvariantViolation::ZeroRun {
                    rule_id: *rule_id,
                    position,
                });
            }
            if let Symbol::RuleRef { rule_id: target } = store.symbols[key].symbol {
                if !store.rule_index.contains_key(&target) {
                    return Err(InvariantViolation::DanglingRuleRef { rule_id: target });
                }
            }
        }

        for (position, pair) in body.windows(2).enumerate() {
            if store.symbols[pair[0]]
                .symbol
                .equals(&store.symbols[pair[1]].symbol)
            {
                return Err(InvariantViolation::AdjacentEqualContent {
                    rule_id: *rule_id,
                    position,
                });
            }
        }

        if *rule_id != ROOT_RULE_ID && body.len() < 2 {
            return Err(InvariantViolation::DegenerateRule {
                rule_id: *rule_id,
                len: body.len(),
            });
        }
    }

    check_usage_counters(store, &bodies)?;
    check_digrams(store, &bodies)?;

    if let Some(history) = grammar.history() {
        check_round_trip(grammar, history)?;
    }

    Ok(())
}

/// Walks one body from head to tail, checking forward/backward agreement.
fn walk_body(
    store: &GrammarStore,
    rule_id: u32,
    head_key: DefaultKey,
) -> Result<Vec<DefaultKey>, InvariantViolation> {
    let broken = InvariantViolation::BrokenLink { rule_id };

    let Some(head) = store.symbols.get(head_key) else {
        return Err(broken);
    };
    let Symbol::RuleHead { tail, .. } = head.symbol else {
        return Err(broken);
    };

    let mut elements = Vec::new();
    let mut prev_key = head_key;
    let mut current = head.next;
    let mut steps = 0usize;

    loop {
        let Some(key) = current else {
            return Err(broken);
        };
        let Some(node) = store.symbols.get(key) else {
            return Err(broken);
        };
        if node.prev != Some(prev_key) {
            return Err(broken);
        }

        if key == tail {
            if !matches!(node.symbol, Symbol::RuleTail) {
                return Err(broken);
            }
            break;
        }

        match node.symbol {
            Symbol::RuleHead { .. } | Symbol::RuleTail => return Err(broken),
            _ => elements.push(key),
        }

        // A cycle in the links would otherwise walk forever.
        steps += 1;
        if steps > store.symbols.len() {
            return Err(broken);
        }

        prev_key = key;
        current = node.next;
    }

    Ok(elements)
}

/// Compares each rule's stored usage counter against the references that
/// actually exist, and enforces the at-least-twice bound.
fn check_usage_counters(
    store: &GrammarStore,
    bodies: &[(u32, Vec<DefaultKey>)],
) -> Result<(), InvariantViolation> {
    let mut actual: HashMap<u32, u32> = HashMap::default();
    for (_, body) in bodies {
        for &key in body {
            if let Symbol::RuleRef { rule_id } = store.symbols[key].symbol {
                *actual.entry(rule_id).or_insert(0) += store.symbols[key].run;
            }
        }
    }

    for (rule_id, _) in bodies {
        if *rule_id == ROOT_RULE_ID {
            continue;
        }
        let head_key = *store
            .rule_index
            .get(rule_id)
            .expect("walked bodies come from the rule table");
        let Symbol::RuleHead { count: stored, .. } = store.symbols[head_key].symbol else {
            unreachable!("rule table entries point at heads");
        };
        let used = actual.get(rule_id).copied().unwrap_or(0);

        if stored != used {
            return Err(InvariantViolation::UsageMismatch {
                rule_id: *rule_id,
                stored,
                actual: used,
            });
        }
        if stored < 2 {
            return Err(InvariantViolation::UnderusedRule {
                rule_id: *rule_id,
                count: stored,
            });
        }
    }

    Ok(())
}

/// Digram uniqueness plus index↔adjacency agreement in both directions.
fn check_digrams(
    store: &GrammarStore,
    bodies: &[(u32, Vec<DefaultKey>)],
) -> Result<(), InvariantViolation> {
    let mut seen: HashMap<DigramKey, (u32, DefaultKey)> = HashMap::default();

    for (rule_id, body) in bodies {
        for (position, pair) in body.windows(2).enumerate() {
            let key = DigramKey::from_symbols(
                &store.symbols[pair[0]].symbol,
                &store.symbols[pair[1]].symbol,
            );

            if let Some(&(other_rule_id, _)) = seen.get(&key) {
                return Err(InvariantViolation::DuplicateDigram {
                    rule_id: *rule_id,
                    other_rule_id,
                });
            }
            seen.insert(key, (*rule_id, pair[0]));

            match store.digram_index.get(&key) {
                None => {
                    return Err(InvariantViolation::MissingDigramEntry {
                        rule_id: *rule_id,
                        position,
                    })
                }
                Some(&location) if location != pair[0] => {
                    return Err(InvariantViolation::MisdirectedDigramEntry {
                        rule_id: *rule_id,
                        position,
                    })
                }
                _ => {}
            }
        }
    }

    for (key, &location) in store.digram_index.iter() {
        match seen.get(key) {
            Some(&(_, first)) if first == location => {}
            _ => return Err(InvariantViolation::StaleDigramEntry),
        }
    }

    Ok(())
}

/// Expansion must reproduce the recorded append order exactly.
fn check_round_trip(
    grammar: &TraceGrammar,
    history: &[crate::event::TraceEvent],
) -> Result<(), InvariantViolation> {
    let mut produced = grammar.iter();

    for (position, expected) in history.iter().enumerate() {
        match produced.next() {
            Some(event) if event == expected => {}
            _ => return Err(InvariantViolation::RoundTripMismatch { position }),
        }
    }

    if produced.next().is_some() {
        return Err(InvariantViolation::RoundTripMismatch {
            position: history.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TraceEvent;

    fn event(member: &str) -> TraceEvent {
        TraceEvent::new("app.OrderService", member, vec![])
    }

    #[test]
    fn test_fresh_grammar_is_valid() {
        let grammar = TraceGrammar::new();
        assert_eq!(validate(&grammar), Ok(()));
    }

    #[test]
    fn test_compressed_grammar_is_valid() {
        let mut grammar = TraceGrammar::with_history();
        grammar
            .append_all(
                ["open", "close", "flush", "open", "close", "open", "close"].map(event),
            )
            .unwrap();
        assert_eq!(validate(&grammar), Ok(()));
    }

    #[test]
    fn test_detects_duplicate_digram() {
        let mut grammar = TraceGrammar::new();
        grammar
            .append_all(["open", "close", "flush"].map(event))
            .unwrap();

        // Forge a second (open, close) adjacency behind the appender's back.
        let tail = grammar.sequence_end;
        for member in ["open", "close"] {
            let key = grammar
                .store
                .symbols
                .insert(crate::symbol::SymbolNode::new(Symbol::Event(event(member))));
            let prev = grammar.store.symbols[tail].prev.unwrap();
            grammar.store.symbols[key].prev = Some(prev);
            grammar.store.symbols[key].next = Some(tail);
            grammar.store.symbols[prev].next = Some(key);
            grammar.store.symbols[tail].prev = Some(key);
        }

        assert!(matches!(
            validate(&grammar),
            Err(InvariantViolation::DuplicateDigram { .. })
                | Err(InvariantViolation::MissingDigramEntry { .. })
        ));
    }

    #[test]
    fn test_detects_tampered_usage_counter() {
        let mut grammar = TraceGrammar::new();
        grammar
            .append_all(["open", "close", "open", "close"].map(event))
            .unwrap();
        assert_eq!(grammar.rule_count(), 1);

        let (_, &head_key) = grammar
            .store
            .rule_index
            .iter()
            .find(|(&id, _)| id != ROOT_RULE_ID)
            .unwrap();
        if let Symbol::RuleHead {
            rule_id,
            tail,
            ..
        } = grammar.store.symbols[head_key].symbol
        {
            grammar.store.symbols[head_key].symbol = Symbol::RuleHead {
                rule_id,
                count: 7,
                tail,
            };
        }

        assert!(matches!(
            validate(&grammar),
            Err(InvariantViolation::UsageMismatch { stored: 7, .. })
        ));
    }

    #[test]
    fn test_detects_broken_back_link() {
        let mut grammar = TraceGrammar::new();
        grammar
            .append_all(["open", "close", "flush"].map(event))
            .unwrap();

        let tail = grammar.sequence_end;
        let last = grammar.store.symbols[tail].prev.unwrap();
        grammar.store.symbols[last].prev = None;

        assert!(matches!(
            validate(&grammar),
            Err(InvariantViolation::BrokenLink { .. })
        ));
    }

    #[test]
    fn test_round_trip_check_uses_history() {
        let mut grammar = TraceGrammar::with_history();
        grammar
            .append_all(["open", "close", "open", "close"].map(event))
            .unwrap();
        assert_eq!(validate(&grammar), Ok(()));

        // Tampering with the log must surface as a round-trip mismatch.
        grammar.history.as_mut().unwrap().push(event("ghost"));
        assert_eq!(
            validate(&grammar),
            Err(InvariantViolation::RoundTripMismatch { position: 4 })
        );
    }
}
