use crate::id_gen::RuleIdGen;
use crate::symbol::{DigramKey, Symbol, SymbolNode};
use ahash::AHashMap as HashMap;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::Entry;

/// Id of the rule holding the top-level sequence.
pub(crate) const ROOT_RULE_ID: u32 = 0;

/// Arena-backed grammar storage.
///
/// All symbol nodes of all rules live in one slot map as a set of
/// doubly-linked lists, each framed by a `RuleHead`/`RuleTail` pair. The
/// digram index maps every adjacent symbol pair (run counts ignored) to the
/// arena key of its unique first node; the rule table maps rule ids to head
/// sentinels.
pub(crate) struct GrammarStore {
    pub symbols: SlotMap<DefaultKey, SymbolNode>,

    /// Unique current location of every digram.
    pub digram_index: HashMap<DigramKey, DefaultKey>,

    /// Rule id to head sentinel, including the root rule.
    pub rule_index: HashMap<u32, DefaultKey>,

    pub id_gen: RuleIdGen,
}

impl GrammarStore {
    pub fn new() -> Self {
        Self {
            symbols: SlotMap::new(),
            digram_index: HashMap::default(),
            rule_index: HashMap::default(),
            id_gen: RuleIdGen::new(),
        }
    }

    /// Allocates an empty rule body (head linked straight to tail) and
    /// registers it in the rule table. Returns the head key.
    pub fn new_rule_body(&mut self, rule_id: u32) -> DefaultKey {
        let tail_key = self.symbols.insert(SymbolNode::new(Symbol::RuleTail));
        let head_key = self.symbols.insert(SymbolNode::new(Symbol::RuleHead {
            rule_id,
            count: 0,
            tail: tail_key,
        }));

        self.symbols[head_key].next = Some(tail_key);
        self.symbols[tail_key].prev = Some(head_key);
        self.rule_index.insert(rule_id, head_key);

        head_key
    }

    #[inline]
    pub fn is_sequence_start(&self, symbol: &Symbol) -> bool {
        matches!(symbol, Symbol::RuleHead { .. })
    }

    #[inline]
    pub fn is_sequence_end(&self, symbol: &Symbol) -> bool {
        matches!(symbol, Symbol::RuleTail)
    }

    // ========================================================================
    // Run-length operations
    // ========================================================================

    /// Folds a node into its successor when both hold equal content.
    ///
    /// Keeps the structure in canonical run-length form: no two adjacent
    /// nodes with equal symbols. Returns true if a fold occurred.
    pub fn try_merge_with_next(&mut self, key: DefaultKey) -> bool {
        let Some(next_key) = self.symbols[key].next else {
            return false;
        };

        if self.is_sequence_end(&self.symbols[next_key].symbol) {
            return false;
        }

        if !self.symbols[key]
            .symbol
            .equals(&self.symbols[next_key].symbol)
        {
            return false;
        }

        // Adjacencies at and around the fold are about to change.
        if let Some(prev) = self.symbols[key].prev {
            self.remove_digram_from_index(prev);
        }
        self.remove_digram_from_index(key);
        self.remove_digram_from_index(next_key);

        let next_run = self.symbols[next_key].run;
        self.symbols[key].run += next_run;

        // Rule usage counters are unaffected: the folded node's references
        // are preserved in the combined run.
        let after_next = self.symbols[next_key].next;
        self.symbols[key].next = after_next;
        if let Some(after) = after_next {
            self.symbols[after].prev = Some(key);
        }

        self.symbols.remove(next_key);

        true
    }

    /// Splits a node into two at the given run offset.
    ///
    /// A node with run 8 split at 6 becomes a run-6 node followed by a fresh
    /// run-2 node. The total run (and thus any reference count it stands
    /// for) is preserved. Returns the key of the new second node.
    pub fn split_node(&mut self, key: DefaultKey, first_run: u32) -> DefaultKey {
        let total_run = self.symbols[key].run;
        debug_assert!(
            first_run > 0 && first_run < total_run,
            "invalid split: first_run={first_run}, total={total_run}",
        );

        // If the outgoing digram entry named this node, the adjacency it
        // records is about to move to the new second node.
        let moved = self.remove_digram_from_index(key);

        self.symbols[key].run = first_run;

        let second_run = total_run - first_run;
        let second_key = self.symbols.insert(SymbolNode::with_run(
            self.symbols[key].symbol.clone(),
            second_run,
        ));

        let after_first = self.symbols[key].next;
        self.symbols[key].next = Some(second_key);
        self.symbols[second_key].prev = Some(key);
        self.symbols[second_key].next = after_first;
        if let Some(after) = after_first {
            self.symbols[after].prev = Some(second_key);
        }

        if moved {
            let after = self.symbols[second_key]
                .next
                .expect("a recorded digram implies a successor");
            let digram_key = DigramKey::from_symbols(
                &self.symbols[second_key].symbol,
                &self.symbols[after].symbol,
            );
            self.digram_index.insert(digram_key, second_key);
        }

        second_key
    }

    // ========================================================================
    // Digram index operations
    // ========================================================================

    /// Looks up the digram starting at `first`, recording it when unseen.
    ///
    /// Returns the first node of an existing non-overlapping occurrence
    /// elsewhere, or `None` when the digram was new (now indexed), stale,
    /// overlapping, or a hash collision.
    #[inline]
    pub fn find_and_add_digram(
        &mut self,
        first: DefaultKey,
        second: DefaultKey,
    ) -> Option<DefaultKey> {
        debug_assert!(
            self.symbols[first].next == Some(second),
            "digram nodes must be adjacent"
        );

        // Sentinels never participate in digrams.
        if self.is_sequence_start(&self.symbols[first].symbol)
            || self.is_sequence_end(&self.symbols[second].symbol)
        {
            return None;
        }

        let digram_key =
            DigramKey::from_symbols(&self.symbols[first].symbol, &self.symbols[second].symbol);

        match self.digram_index.entry(digram_key) {
            Entry::Vacant(e) => {
                e.insert(first);
                None
            }
            Entry::Occupied(mut e) => {
                let other_first = *e.get();

                if other_first == first {
                    return None;
                }

                if !self.symbols.contains_key(other_first) {
                    e.insert(first);
                    return None;
                }

                let other_second = self.symbols[other_first]
                    .next
                    .expect("indexed digram node has a successor");

                // Occurrences sharing a node cannot both be rewritten.
                if other_second == first || other_first == second {
                    return None;
                }

                // Re-verify the match on the actual symbols; the 64-bit key
                // can collide.
                let symbols_equal = self.symbols[first]
                    .symbol
                    .equals(&self.symbols[other_first].symbol)
                    && self.symbols[second]
                        .symbol
                        .equals(&self.symbols[other_second].symbol);

                if symbols_equal {
                    Some(other_first)
                } else {
                    None
                }
            }
        }
    }

    /// Drops the index entry for the digram starting at `first`, but only if
    /// the entry names exactly that location. Returns true if removed.
    #[inline]
    pub fn remove_digram_from_index(&mut self, first: DefaultKey) -> bool {
        if self.is_sequence_start(&self.symbols[first].symbol) {
            return false;
        }

        let Some(second) = self.symbols[first].next else {
            return false;
        };

        if self.is_sequence_end(&self.symbols[second].symbol) {
            return false;
        }

        let digram_key =
            DigramKey::from_symbols(&self.symbols[first].symbol, &self.symbols[second].symbol);

        if let Entry::Occupied(e) = self.digram_index.entry(digram_key) {
            if *e.get() == first {
                e.remove();
                return true;
            }
        }
        false
    }
}

impl Default for GrammarStore {
    fn default() -> Self {
        Self::new()
    }
}
