use crate::grammar::{GrammarStore, ROOT_RULE_ID};
use crate::symbol::{DigramKey, Symbol, SymbolNode};
use slotmap::DefaultKey;
use tracing::{debug, trace};

impl GrammarStore {
    /// Reports whether the digram starting at `first` is the complete body
    /// of a rule, returning the head key and the per-position runs.
    ///
    /// The root rule never qualifies: it is not referenceable.
    pub(crate) fn complete_rule_at(&self, first: DefaultKey) -> Option<(DefaultKey, u32, u32)> {
        let second = self.symbols[first].next?;
        let prev = self.symbols[first].prev?;

        let Symbol::RuleHead { rule_id, tail, .. } = self.symbols[prev].symbol else {
            return None;
        };
        if rule_id == ROOT_RULE_ID {
            return None;
        }

        let after_second = self.symbols[second].next?;
        if after_second != tail {
            return None;
        }
        debug_assert!(matches!(
            self.symbols[after_second].symbol,
            Symbol::RuleTail
        ));

        Some((prev, self.symbols[first].run, self.symbols[second].run))
    }

    /// Creates a rule from two occurrences of one digram and rewrites both
    /// occurrences as references to it.
    ///
    /// The occurrences may disagree on run counts; the rule captures the
    /// per-position minimum and the excess is split off in place, staying
    /// where it was. Returns the keys of the two inserted references.
    pub(crate) fn promote_digram_to_rule(
        &mut self,
        match1: DefaultKey,
        match2: DefaultKey,
    ) -> (DefaultKey, DefaultKey) {
        let match1_second = self.symbols[match1].next.expect("digram has a successor");
        let match2_second = self.symbols[match2].next.expect("digram has a successor");

        let first_run = self.symbols[match1].run.min(self.symbols[match2].run);
        let second_run = self.symbols[match1_second]
            .run
            .min(self.symbols[match2_second].run);

        let (m1_first, m1_second) = self.trim_digram_to_runs(match1, first_run, second_run);
        let (m2_first, _) = self.trim_digram_to_runs(match2, first_run, second_run);

        let rule_id = self.id_gen.acquire();
        let head_key = self.new_rule_body(rule_id);
        let tail_key = match self.symbols[head_key].symbol {
            Symbol::RuleHead { tail, .. } => tail,
            _ => unreachable!(),
        };

        let rule_first = self.symbols.insert(SymbolNode::with_run(
            self.symbols[m1_first].symbol.clone(),
            first_run,
        ));
        let rule_second = self.symbols.insert(SymbolNode::with_run(
            self.symbols[m1_second].symbol.clone(),
            second_run,
        ));

        self.symbols[head_key].next = Some(rule_first);
        self.symbols[rule_first].prev = Some(head_key);
        self.symbols[rule_first].next = Some(rule_second);
        self.symbols[rule_second].prev = Some(rule_first);
        self.symbols[rule_second].next = Some(tail_key);
        self.symbols[tail_key].prev = Some(rule_second);

        // The digram now lives canonically in the rule body; both outside
        // occurrences are about to disappear.
        self.remove_digram_from_index(m1_first);
        self.remove_digram_from_index(m2_first);

        let digram_key = DigramKey::from_symbols(
            &self.symbols[rule_first].symbol,
            &self.symbols[rule_second].symbol,
        );
        self.digram_index.insert(digram_key, rule_first);

        self.bump_usage_for_refs(rule_first);
        self.bump_usage_for_refs(rule_second);

        debug!(rule_id, first_run, second_run, "created rule from duplicate digram");

        let loc1 = self.substitute_with_rule(m1_first, head_key);
        debug_assert!(
            self.symbols.contains_key(m2_first),
            "second occurrence must survive rewriting the first"
        );
        let loc2 = self.substitute_with_rule(m2_first, head_key);

        (loc1, loc2)
    }

    /// Splits the nodes of a digram so that exactly the trailing
    /// `target_first_run` of the first node and the leading
    /// `target_second_run` of the second remain as the digram; any excess
    /// run stays in place outside it.
    fn trim_digram_to_runs(
        &mut self,
        first: DefaultKey,
        target_first_run: u32,
        target_second_run: u32,
    ) -> (DefaultKey, DefaultKey) {
        let mut first_key = first;

        if self.symbols[first_key].run > target_first_run {
            let residue = self.symbols[first_key].run - target_first_run;
            first_key = self.split_node(first_key, residue);
        }

        let second_key = self.symbols[first_key].next.expect("digram has a successor");
        if self.symbols[second_key].run > target_second_run {
            self.split_node(second_key, target_second_run);
        }

        (first_key, second_key)
    }

    /// Rewrites the digram starting at `first` into a reference to an
    /// existing rule, in place. Returns the key of the inserted reference.
    pub(crate) fn substitute_with_rule(
        &mut self,
        first: DefaultKey,
        rule_head: DefaultKey,
    ) -> DefaultKey {
        let second = self.symbols[first].next.expect("digram has a successor");

        let before_digram = self.symbols[first].prev;
        let after_digram = self.symbols[second].next;

        if let Some(prev) = before_digram {
            self.remove_digram_from_index(prev);
        }
        self.remove_digram_from_index(second);

        self.drop_usage_for_refs(first);
        self.drop_usage_for_refs(second);

        let Symbol::RuleHead { rule_id, .. } = self.symbols[rule_head].symbol else {
            unreachable!("substitution target must be a rule head");
        };

        let ref_key = self
            .symbols
            .insert(SymbolNode::new(Symbol::RuleRef { rule_id }));

        self.symbols[ref_key].prev = before_digram;
        self.symbols[ref_key].next = after_digram;
        if let Some(prev) = before_digram {
            self.symbols[prev].next = Some(ref_key);
        }
        if let Some(next) = after_digram {
            self.symbols[next].prev = Some(ref_key);
        }

        self.bump_usage(rule_head);

        self.symbols.remove(first);
        self.symbols.remove(second);

        trace!(rule_id, "substituted digram occurrence with rule reference");

        // Usage of rules referenced from the consumed nodes may have
        // dropped to one; the sole remaining reference then sits in this
        // rule's body. Collect the positions first: each inlining splices
        // nodes in place and can remove later ones.
        if self.symbols.contains_key(rule_head) {
            let mut body_keys = Vec::new();
            let mut cursor = self.symbols[rule_head].next;
            while let Some(key) = cursor {
                if self.is_sequence_end(&self.symbols[key].symbol) {
                    break;
                }
                body_keys.push(key);
                cursor = self.symbols[key].next;
            }

            for key in body_keys {
                if self.symbols.contains_key(key) {
                    self.inline_if_single_use(key);
                }
            }
        }

        ref_key
    }

    /// Inlines the rule referenced at `potential_rule` when that reference
    /// is the rule's last remaining use.
    ///
    /// The body is spliced over the reference, the rule leaves the table,
    /// and its id returns to the pool. Splice boundaries are then re-checked
    /// for folds and duplicate digrams.
    pub(crate) fn inline_if_single_use(&mut self, potential_rule: DefaultKey) {
        let Symbol::RuleRef { rule_id } = self.symbols[potential_rule].symbol else {
            return;
        };

        // A run of references is at least two uses by itself.
        if self.symbols[potential_rule].run != 1 {
            return;
        }

        let Some(&rule_head) = self.rule_index.get(&rule_id) else {
            return;
        };

        let Symbol::RuleHead {
            count,
            tail: rule_tail,
            ..
        } = self.symbols[rule_head].symbol
        else {
            unreachable!()
        };

        debug_assert!(count > 0, "rule usage can never reach 0 while referenced");
        if count != 1 {
            return;
        }

        let rule_first = self.symbols[rule_head]
            .next
            .expect("rule head has a successor");
        let rule_last = self.symbols[rule_tail]
            .prev
            .expect("rule tail has a predecessor");

        let before_rule = self.symbols[potential_rule].prev;
        let after_rule = self.symbols[potential_rule].next;

        if let Some(prev) = before_rule {
            self.remove_digram_from_index(prev);
        }
        self.remove_digram_from_index(potential_rule);

        self.rule_index.remove(&rule_id);
        self.id_gen.release(rule_id);

        // Detach the sentinels, then splice the body over the reference.
        self.symbols[rule_first].prev = None;
        self.symbols[rule_last].next = None;
        self.symbols.remove(rule_head);
        self.symbols.remove(rule_tail);

        self.symbols[rule_first].prev = before_rule;
        self.symbols[rule_last].next = after_rule;
        if let Some(prev) = before_rule {
            self.symbols[prev].next = Some(rule_first);
        }
        if let Some(next) = after_rule {
            self.symbols[next].prev = Some(rule_last);
        }

        self.symbols.remove(potential_rule);

        debug!(rule_id, "inlined single-use rule");

        if let Some(prev) = before_rule {
            if !self.is_sequence_start(&self.symbols[prev].symbol) {
                self.on_link(prev);
            }
        }

        if self.symbols.contains_key(rule_last) {
            if let Some(next) = self.symbols[rule_last].next {
                if !self.is_sequence_end(&self.symbols[next].symbol) {
                    self.on_link(rule_last);
                }
            }
        }
    }

    /// Restores all invariants after two symbols became adjacent.
    ///
    /// First folds equal neighbors into runs, then resolves any duplicate
    /// digram the new adjacency exposed. Every resolution step either
    /// shrinks the structure or removes a duplicate, so the cascade reaches
    /// a fixed point.
    pub(crate) fn on_link(&mut self, first_key: DefaultKey) {
        if self.try_merge_with_next(first_key) {
            if let Some(prev) = self.symbols[first_key].prev {
                if !self.is_sequence_start(&self.symbols[prev].symbol) {
                    if let Some(other) = self.find_and_add_digram(prev, first_key) {
                        self.resolve_duplicate(prev, other);
                    }
                }
            }

            if !self.symbols.contains_key(first_key) {
                return;
            }
            if let Some(next) = self.symbols[first_key].next {
                if !self.is_sequence_end(&self.symbols[next].symbol) {
                    if let Some(other) = self.find_and_add_digram(first_key, next) {
                        self.resolve_duplicate(first_key, other);
                    }
                }
            }
            return;
        }

        let Some(second_key) = self.symbols[first_key].next else {
            return;
        };

        if let Some(other) = self.find_and_add_digram(first_key, second_key) {
            self.resolve_duplicate(first_key, other);
        }
    }

    /// Resolves one digram occurring at two locations.
    ///
    /// Reuses an existing rule whenever either occurrence is a complete rule
    /// body covered by the other occurrence's runs; otherwise promotes the
    /// digram to a fresh rule. The residue left by run trimming is what
    /// keeps a donor rule body from ever collapsing below two elements.
    fn resolve_duplicate(&mut self, first_key: DefaultKey, match_key: DefaultKey) {
        let second_key = self.symbols[first_key].next.expect("digram has a successor");

        if let Some((head_key, body_first_run, body_second_run)) = self.complete_rule_at(match_key)
        {
            if self.symbols[first_key].run >= body_first_run
                && self.symbols[second_key].run >= body_second_run
            {
                let (trimmed, _) =
                    self.trim_digram_to_runs(first_key, body_first_run, body_second_run);
                let Symbol::RuleHead { rule_id, .. } = self.symbols[head_key].symbol else {
                    unreachable!()
                };
                debug!(rule_id, "folded duplicate digram into existing rule");
                let ref_key = self.substitute_with_rule(trimmed, head_key);
                self.check_new_links(ref_key);
                return;
            }
        }

        if let Some((head_key, body_first_run, body_second_run)) = self.complete_rule_at(first_key)
        {
            let match_second = self.symbols[match_key].next.expect("digram has a successor");
            if self.symbols[match_key].run >= body_first_run
                && self.symbols[match_second].run >= body_second_run
            {
                let (trimmed, _) =
                    self.trim_digram_to_runs(match_key, body_first_run, body_second_run);
                let Symbol::RuleHead { rule_id, .. } = self.symbols[head_key].symbol else {
                    unreachable!()
                };

                // The index still names the occurrence being consumed; its
                // canonical location is this rule's body.
                let digram_key = DigramKey::from_symbols(
                    &self.symbols[first_key].symbol,
                    &self.symbols[second_key].symbol,
                );
                self.digram_index.insert(digram_key, first_key);

                debug!(rule_id, "folded duplicate digram into existing rule");
                let ref_key = self.substitute_with_rule(trimmed, head_key);
                self.check_new_links(ref_key);
                return;
            }
        }

        let (loc1, loc2) = self.promote_digram_to_rule(first_key, match_key);
        self.check_new_links(loc1);
        if self.symbols.contains_key(loc2) {
            self.check_new_links(loc2);
        }
    }

    /// Re-checks the two adjacencies around a freshly inserted reference.
    pub(crate) fn check_new_links(&mut self, ref_key: DefaultKey) {
        if !self.symbols.contains_key(ref_key) {
            return;
        }

        if let Some(prev) = self.symbols[ref_key].prev {
            if !self.is_sequence_start(&self.symbols[prev].symbol) {
                self.on_link(prev);
            }
        }

        if !self.symbols.contains_key(ref_key) {
            return;
        }

        if let Some(next) = self.symbols[ref_key].next {
            if !self.is_sequence_end(&self.symbols[next].symbol)
                && !self.is_sequence_start(&self.symbols[ref_key].symbol)
            {
                self.on_link(ref_key);
            }
        }
    }

    // ========================================================================
    // Usage counters
    // ========================================================================

    /// Adds a body node's references to its rule's usage counter.
    #[inline]
    pub(crate) fn bump_usage_for_refs(&mut self, key: DefaultKey) {
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            let run = self.symbols[key].run;
            if let Some(&head_key) = self.rule_index.get(&rule_id) {
                for _ in 0..run {
                    self.bump_usage(head_key);
                }
            }
        }
    }

    /// Removes a consumed node's references from its rule's usage counter.
    #[inline]
    pub(crate) fn drop_usage_for_refs(&mut self, key: DefaultKey) {
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            let run = self.symbols[key].run;
            if let Some(&head_key) = self.rule_index.get(&rule_id) {
                for _ in 0..run {
                    self.drop_usage(head_key);
                }
            }
        }
    }

    #[inline]
    fn bump_usage(&mut self, head_key: DefaultKey) {
        if let Symbol::RuleHead {
            rule_id,
            count,
            tail,
        } = self.symbols[head_key].symbol
        {
            self.symbols[head_key].symbol = Symbol::RuleHead {
                rule_id,
                count: count + 1,
                tail,
            };
        }
    }

    #[inline]
    fn drop_usage(&mut self, head_key: DefaultKey) {
        if let Symbol::RuleHead {
            rule_id,
            count,
            tail,
        } = self.symbols[head_key].symbol
        {
            debug_assert!(count > 0, "usage counter cannot drop below 0");
            self.symbols[head_key].symbol = Symbol::RuleHead {
                rule_id,
                count: count - 1,
                tail,
            };
        }
    }
}
