use crate::event::TraceEvent;
use slotmap::DefaultKey;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Symbol variants making up the grammar's linked structure.
///
/// An exhaustively matched sum type: leaf events and rule references are the
/// payload-carrying variants; head and tail are per-rule sentinels framing
/// each body in the arena.
#[derive(Debug, Clone)]
pub(crate) enum Symbol {
    /// A terminal: one observed trace event.
    Event(TraceEvent),

    /// A non-terminal reference to a rule.
    RuleRef { rule_id: u32 },

    /// Start sentinel of a rule body; carries the usage counter.
    RuleHead {
        rule_id: u32,
        count: u32,
        tail: DefaultKey,
    },

    /// End sentinel of a rule body.
    RuleTail,
}

impl Symbol {
    /// Structural equality, used to confirm digram matches after a hash hit.
    ///
    /// Event equality is the event's identity contract; references compare
    /// by rule id; sentinel links are ignored.
    pub(crate) fn equals(&self, other: &Symbol) -> bool {
        match (self, other) {
            (Symbol::Event(a), Symbol::Event(b)) => a == b,
            (Symbol::RuleRef { rule_id: a }, Symbol::RuleRef { rule_id: b }) => a == b,
            (Symbol::RuleHead { rule_id: a, .. }, Symbol::RuleHead { rule_id: b, .. }) => a == b,
            (Symbol::RuleTail, Symbol::RuleTail) => true,
            _ => false,
        }
    }
}

/// A node in the doubly-linked symbol list.
///
/// Each node stands for `run` consecutive occurrences of its symbol; the
/// structure never holds two adjacent nodes with equal content, so runs are
/// the canonical representation of repetition.
#[derive(Debug)]
pub(crate) struct SymbolNode {
    pub symbol: Symbol,
    /// Number of consecutive occurrences at this position.
    pub run: u32,
    pub prev: Option<DefaultKey>,
    pub next: Option<DefaultKey>,
}

impl SymbolNode {
    pub(crate) fn new(symbol: Symbol) -> Self {
        Self::with_run(symbol, 1)
    }

    pub(crate) fn with_run(symbol: Symbol, run: u32) -> Self {
        Self {
            symbol,
            run,
            prev: None,
            next: None,
        }
    }
}

/// Compact 64-bit digest of a symbol for digram index keys.
///
/// Keys stay `Copy` and cheap to compare; every index hit is re-verified
/// against the full symbols to rule out collisions.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub(crate) struct SymbolHash(u64);

impl SymbolHash {
    pub(crate) fn from_symbol(symbol: &Symbol) -> Self {
        let mut hasher = DefaultHasher::new();
        match symbol {
            Symbol::Event(event) => {
                0u8.hash(&mut hasher);
                event.hash(&mut hasher);
            }
            Symbol::RuleRef { rule_id } => {
                1u8.hash(&mut hasher);
                rule_id.hash(&mut hasher);
            }
            Symbol::RuleHead { rule_id, .. } => {
                2u8.hash(&mut hasher);
                rule_id.hash(&mut hasher);
            }
            Symbol::RuleTail => {
                3u8.hash(&mut hasher);
            }
        }
        SymbolHash(hasher.finish())
    }
}

/// An ordered adjacent-symbol pair, compared ignoring run counts.
///
/// Two digrams are the same whenever their symbols match; `(a:2, b:3)` and
/// `(a:5, b:1)` are one digram value occurring at two locations.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub(crate) struct DigramKey(SymbolHash, SymbolHash);

impl DigramKey {
    pub(crate) fn from_symbols(first: &Symbol, second: &Symbol) -> Self {
        DigramKey(
            SymbolHash::from_symbol(first),
            SymbolHash::from_symbol(second),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(member: &str) -> Symbol {
        Symbol::Event(TraceEvent::new("shop.CartController", member, vec![]))
    }

    #[test]
    fn test_node_defaults_to_single_run() {
        let node = SymbolNode::new(event("addItem"));
        assert_eq!(node.run, 1);
        assert_eq!(node.prev, None);
        assert_eq!(node.next, None);
    }

    #[test]
    fn test_symbol_hash_tracks_identity() {
        let depth_only_differs =
            Symbol::Event(TraceEvent::new("shop.CartController", "addItem", vec![]).with_depth(4));

        let h1 = SymbolHash::from_symbol(&event("addItem"));
        let h2 = SymbolHash::from_symbol(&depth_only_differs);
        let h3 = SymbolHash::from_symbol(&event("clear"));

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_rule_ref_hash_by_id() {
        let h1 = SymbolHash::from_symbol(&Symbol::RuleRef { rule_id: 1 });
        let h2 = SymbolHash::from_symbol(&Symbol::RuleRef { rule_id: 1 });
        let h3 = SymbolHash::from_symbol(&Symbol::RuleRef { rule_id: 2 });

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_event_and_ref_never_equal() {
        assert!(!event("addItem").equals(&Symbol::RuleRef { rule_id: 0 }));
        assert!(Symbol::RuleTail.equals(&Symbol::RuleTail));
    }

    #[test]
    fn test_digram_key_ignores_runs() {
        let a = event("addItem");
        let b = event("clear");

        let key1 = DigramKey::from_symbols(&a, &b);
        let key2 = DigramKey::from_symbols(&a, &b);
        let key3 = DigramKey::from_symbols(&b, &a);

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }
}
