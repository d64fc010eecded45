// Mutable letter transducer used during compilation.
//
// States are dense integers, edges are labelled with alphabet pair codes and
// carry a weight. The graph form favours incremental construction; the
// read-optimized form lives in `exec`.

use crate::alphabet::Alphabet;
use crate::codec;
use crate::headers::{self, transducer_features, HEADER_TRANSDUCER};
use crate::FstError;
use hashbrown::HashMap;
use ltk_core::symbol::Symbol;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

/// Weight assigned when none is given.
pub const DEFAULT_WEIGHT: f64 = 0.0;

type Edges = BTreeMap<i32, Vec<(i32, f64)>>;

#[derive(Debug, Clone, Default)]
pub struct Transducer {
    initial: i32,
    finals: BTreeMap<i32, f64>,
    transitions: BTreeMap<i32, Edges>,
}

impl Transducer {
    pub fn new() -> Self {
        let mut t = Transducer {
            initial: 0,
            finals: BTreeMap::new(),
            transitions: BTreeMap::new(),
        };
        t.initial = t.new_state();
        t
    }

    /// Allocate a fresh state and return its id.
    pub fn new_state(&mut self) -> i32 {
        let mut state = self.transitions.len() as i32;
        while self.transitions.contains_key(&state) {
            state += 1;
        }
        self.transitions.insert(state, Edges::new());
        state
    }

    pub fn get_initial(&self) -> i32 {
        self.initial
    }

    pub fn is_final(&self, state: i32) -> bool {
        self.finals.contains_key(&state)
    }

    pub fn set_final(&mut self, state: i32, weight: f64) {
        self.finals.insert(state, weight);
    }

    pub fn remove_final(&mut self, state: i32) {
        self.finals.remove(&state);
    }

    pub fn finals(&self) -> &BTreeMap<i32, f64> {
        &self.finals
    }

    pub fn has_no_finals(&self) -> bool {
        self.finals.is_empty()
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// True for a freshly created or cleared transducer.
    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.transitions.len() == 1
    }

    pub fn transition_count(&self) -> usize {
        self.transitions
            .values()
            .map(|edges| edges.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn clear(&mut self) {
        self.finals.clear();
        self.transitions.clear();
        self.initial = self.new_state();
    }

    /// Insert a transition from `source`, reusing an existing destination
    /// where possible.
    ///
    /// With exactly one existing edge on `tag` the destination is reused;
    /// with two (a self-loop plus a forward edge) the forward destination is
    /// returned; otherwise a fresh state is allocated. Returns -1 when the
    /// source does not exist or the edge multiplicity is unexpected.
    pub fn insert_single_transduction(&mut self, tag: i32, source: i32, weight: f64) -> i32 {
        let existing: Vec<i32> = match self.transitions.get(&source) {
            Some(edges) => edges
                .get(&tag)
                .map(|dests| dests.iter().map(|&(d, _)| d).collect())
                .unwrap_or_default(),
            None => return -1,
        };
        match existing.len() {
            0 => {
                let state = self.new_state();
                self.transitions
                    .get_mut(&source)
                    .unwrap()
                    .entry(tag)
                    .or_default()
                    .push((state, weight));
                state
            }
            1 => existing[0],
            2 => existing.into_iter().find(|&d| d != source).unwrap_or(-1),
            _ => -1,
        }
    }

    /// Insert a transition from `source` to a freshly allocated state.
    pub fn insert_new_single_transduction(&mut self, tag: i32, source: i32, weight: f64) -> i32 {
        let state = self.new_state();
        self.transitions
            .get_mut(&source)
            .expect("source state does not exist")
            .entry(tag)
            .or_default()
            .push((state, weight));
        state
    }

    /// Add an edge between two existing states. A duplicate edge (same
    /// source, destination and label) is a no-op.
    pub fn link_states(&mut self, source: i32, target: i32, tag: i32, weight: f64) {
        assert!(
            self.transitions.contains_key(&source) && self.transitions.contains_key(&target),
            "linking nonexistent states ({source}, {target}, {tag})"
        );
        let dests = self
            .transitions
            .get_mut(&source)
            .unwrap()
            .entry(tag)
            .or_default();
        if !dests.iter().any(|&(d, _)| d == target) {
            dests.push((target, weight));
        }
    }

    /// Forward reachability through edges labelled `epsilon_tag` only.
    pub fn closure(&self, state: i32, epsilon_tag: i32) -> BTreeSet<i32> {
        let mut result = BTreeSet::from([state]);
        let mut pending = vec![state];
        while let Some(current) = pending.pop() {
            if let Some(dests) = self
                .transitions
                .get(&current)
                .and_then(|edges| edges.get(&epsilon_tag))
            {
                for &(dest, _) in dests {
                    if result.insert(dest) {
                        pending.push(dest);
                    }
                }
            }
        }
        result
    }

    /// Replace the final set by a single state reached from every old final
    /// through an epsilon edge carrying the final's weight.
    pub fn join_finals(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        if self.finals.len() > 1 {
            let state = self.new_state();
            for (old, weight) in std::mem::take(&mut self.finals) {
                self.link_states(old, state, epsilon_tag, weight);
            }
            self.finals.insert(state, DEFAULT_WEIGHT);
        } else if self.finals.is_empty() {
            return Err(FstError::EmptyFinals);
        }
        Ok(())
    }

    /// Copy `other` into this transducer below `source`.
    ///
    /// `other`'s finals are first coalesced into one; every state is mapped
    /// to a fresh id here; an epsilon edge links `source` to the image of
    /// `other`'s initial. Returns the image of `other`'s single final.
    pub fn insert_transducer(
        &mut self,
        source: i32,
        other: &Transducer,
        epsilon_tag: i32,
    ) -> Result<i32, FstError> {
        let mut other = other.clone();
        other.join_finals(epsilon_tag)?;

        let mut mapping: HashMap<i32, i32> = HashMap::new();
        for &state in other.transitions.keys() {
            mapping.insert(state, 0);
        }
        // deterministic allocation order
        let mut states: Vec<i32> = other.transitions.keys().copied().collect();
        states.sort_unstable();
        for state in states {
            let image = self.new_state();
            mapping.insert(state, image);
        }

        for (state, edges) in &other.transitions {
            for (&tag, dests) in edges {
                for &(dest, weight) in dests {
                    let from = mapping[state];
                    let to = mapping[&dest];
                    self.transitions
                        .get_mut(&from)
                        .unwrap()
                        .entry(tag)
                        .or_default()
                        .push((to, weight));
                }
            }
        }

        self.link_states(source, mapping[&other.initial], epsilon_tag, DEFAULT_WEIGHT);
        Ok(mapping[other.finals.keys().next().unwrap()])
    }

    /// Nondeterministic union: branch to `other` from the initial state.
    pub fn union_with(&mut self, other: &Transducer, epsilon_tag: i32) -> Result<(), FstError> {
        let joined = self.insert_transducer(self.initial, other, epsilon_tag)?;
        self.finals.insert(joined, DEFAULT_WEIGHT);
        Ok(())
    }

    /// Accept the empty string as well.
    pub fn optional(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        self.join_finals(epsilon_tag)?;
        let state = self.new_state();
        self.link_states(state, self.initial, epsilon_tag, DEFAULT_WEIGHT);
        self.initial = state;

        let state = self.new_state();
        let old_final = *self.finals.keys().next().unwrap();
        self.link_states(old_final, state, epsilon_tag, DEFAULT_WEIGHT);
        self.finals.clear();
        self.finals.insert(state, DEFAULT_WEIGHT);
        self.link_states(self.initial, state, epsilon_tag, DEFAULT_WEIGHT);
        Ok(())
    }

    /// Accept one or more concatenated repetitions.
    pub fn one_or_more(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        self.join_finals(epsilon_tag)?;
        let state = self.new_state();
        self.link_states(state, self.initial, epsilon_tag, DEFAULT_WEIGHT);
        self.initial = state;

        let state = self.new_state();
        let old_final = *self.finals.keys().next().unwrap();
        self.link_states(old_final, state, epsilon_tag, DEFAULT_WEIGHT);
        self.finals.clear();
        self.finals.insert(state, DEFAULT_WEIGHT);
        self.link_states(state, self.initial, epsilon_tag, DEFAULT_WEIGHT);
        Ok(())
    }

    /// Accept zero or more concatenated repetitions.
    pub fn zero_or_more(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        self.one_or_more(epsilon_tag)?;
        self.optional(epsilon_tag)
    }

    /// Reverse every edge, swapping the initial state and the (coalesced)
    /// final state. Edge weights travel with their edges.
    pub fn reverse(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        self.join_finals(epsilon_tag)?;

        let mut reversed: BTreeMap<i32, Edges> = BTreeMap::new();
        for &state in self.transitions.keys() {
            reversed.insert(state, Edges::new());
        }
        for (&state, edges) in &self.transitions {
            for (&tag, dests) in edges {
                for &(dest, weight) in dests {
                    reversed
                        .get_mut(&dest)
                        .unwrap()
                        .entry(tag)
                        .or_default()
                        .push((state, weight));
                }
            }
        }

        let old_final = *self.finals.keys().next().unwrap();
        self.transitions = reversed;
        self.finals.clear();
        self.finals.insert(self.initial, DEFAULT_WEIGHT);
        self.initial = old_final;
        Ok(())
    }

    /// Subset construction over epsilon closures.
    ///
    /// The result is deterministic with dense state ids starting at 0.
    /// Weights are not carried into the result (unambiguous or equal-weight
    /// paths are assumed); weight-bearing transducers should not be
    /// re-normalized after weighting.
    pub fn determinize(&mut self, epsilon_tag: i32) {
        let mut subsets: Vec<BTreeSet<i32>> = vec![self.closure(self.initial, epsilon_tag)];
        let mut subset_ids: HashMap<BTreeSet<i32>, i32> = HashMap::new();
        subset_ids.insert(subsets[0].clone(), 0);

        let mut new_transitions: BTreeMap<i32, Edges> = BTreeMap::new();
        let mut new_finals: BTreeMap<i32, f64> = BTreeMap::new();
        let mut pending: Vec<i32> = vec![0];

        while let Some(id) = pending.pop() {
            let subset = subsets[id as usize].clone();
            new_transitions.entry(id).or_default();

            if subset.iter().any(|s| self.finals.contains_key(s)) {
                new_finals.insert(id, DEFAULT_WEIGHT);
            }

            let mut grouped: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
            for &state in &subset {
                if let Some(edges) = self.transitions.get(&state) {
                    for (&tag, dests) in edges {
                        if tag == epsilon_tag {
                            continue;
                        }
                        let group = grouped.entry(tag).or_default();
                        for &(dest, _) in dests {
                            group.extend(self.closure(dest, epsilon_tag));
                        }
                    }
                }
            }

            for (tag, target) in grouped {
                let target_id = match subset_ids.get(&target) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = subsets.len() as i32;
                        subset_ids.insert(target.clone(), fresh);
                        subsets.push(target);
                        pending.push(fresh);
                        fresh
                    }
                };
                new_transitions
                    .entry(id)
                    .or_default()
                    .entry(tag)
                    .or_default()
                    .push((target_id, DEFAULT_WEIGHT));
            }
        }

        self.transitions = new_transitions;
        self.finals = new_finals;
        self.initial = 0;
    }

    /// Brzozowski minimization: reverse, determinize, reverse, determinize.
    pub fn minimize(&mut self, epsilon_tag: i32) -> Result<(), FstError> {
        self.reverse(epsilon_tag)?;
        self.determinize(epsilon_tag);
        self.reverse(epsilon_tag)?;
        self.determinize(epsilon_tag);
        Ok(())
    }

    /// Debugging acceptor run: does any path spell `pattern` on its input
    /// side?
    pub fn recognise(&self, pattern: &str, alphabet: &Alphabet) -> bool {
        let mut states: BTreeSet<i32> = self.closure(self.initial, 0);
        for c in pattern.chars() {
            let mut next: BTreeSet<i32> = BTreeSet::new();
            for &state in &states {
                if let Some(edges) = self.transitions.get(&state) {
                    for (&tag, dests) in edges {
                        let (left, _) = alphabet.decode(tag);
                        let mut text = String::new();
                        alphabet.get_symbol(&mut text, left, false);
                        if text.contains(c) {
                            for &(dest, _) in dests {
                                next.extend(self.closure(dest, 0));
                            }
                        }
                    }
                }
            }
            states = next;
        }
        states.iter().any(|s| self.finals.contains_key(s))
    }

    /// Append loops over `loopback_symbols` on every final state, yielding
    /// the `prefix.*` shape used when trimming against another dictionary.
    pub fn append_dot_star(
        &self,
        loopback_symbols: &BTreeSet<i32>,
        epsilon_tag: i32,
    ) -> Transducer {
        let mut prefix = self.clone();
        let finals: Vec<i32> = prefix.finals.keys().copied().collect();
        for state in finals {
            for &sym in loopback_symbols {
                if sym != epsilon_tag {
                    prefix.link_states(state, state, sym, DEFAULT_WEIGHT);
                }
            }
        }
        prefix
    }

    fn product_state(
        result: &mut Transducer,
        mapping: &mut HashMap<(i32, i32), i32>,
        pending: &mut Vec<(i32, i32)>,
        key: (i32, i32),
    ) -> i32 {
        match mapping.get(&key) {
            Some(&id) => id,
            None => {
                let id = result.new_state();
                mapping.insert(key, id);
                pending.push(key);
                id
            }
        }
    }

    /// Product construction keeping only moves whose output side can be
    /// consumed by `other`'s input side. Edge labels are this transducer's
    /// pair codes; a state is final when both components are.
    pub fn trim(
        &self,
        other: &Transducer,
        self_alphabet: &Alphabet,
        other_alphabet: &Alphabet,
    ) -> Transducer {
        let mut result = Transducer::new();
        let mut mapping: HashMap<(i32, i32), i32> = HashMap::new();
        let start = (self.initial, other.initial);
        mapping.insert(start, result.initial);
        let mut pending = vec![start];

        while let Some((s1, s2)) = pending.pop() {
            let from = mapping[&(s1, s2)];

            if let Some(edges) = self.transitions.get(&s1) {
                for (&tag, dests) in edges {
                    let (_, right) = self_alphabet.decode(tag);
                    for &(d1, w1) in dests {
                        if right == 0 {
                            // nothing for the right side to consume
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (d1, s2),
                            );
                            result.link_states(from, to, tag, w1);
                            continue;
                        }
                        if let Some(other_edges) = other.transitions.get(&s2) {
                            for (&other_tag, other_dests) in other_edges {
                                let (other_left, _) = other_alphabet.decode(other_tag);
                                if other_left == 0 {
                                    continue;
                                }
                                if self_alphabet.same_symbol(
                                    right,
                                    other_alphabet,
                                    other_left,
                                    true,
                                ) {
                                    for &(d2, _) in other_dests {
                                        let to = Self::product_state(
                                            &mut result,
                                            &mut mapping,
                                            &mut pending,
                                            (d1, d2),
                                        );
                                        result.link_states(from, to, tag, w1);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // other may advance alone over its epsilon-input edges
            if let Some(other_edges) = other.transitions.get(&s2) {
                for (&other_tag, other_dests) in other_edges {
                    let (other_left, _) = other_alphabet.decode(other_tag);
                    if other_left == 0 {
                        for &(d2, w2) in other_dests {
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (s1, d2),
                            );
                            result.link_states(from, to, 0, w2);
                        }
                    }
                }
            }

            if let (Some(&w1), Some(&w2)) = (self.finals.get(&s1), other.finals.get(&s2)) {
                result.set_final(from, w1 + w2);
            }
        }
        result
    }

    /// Product construction on equal pairs (input and output both match
    /// across alphabets).
    pub fn intersect(
        &self,
        other: &Transducer,
        self_alphabet: &Alphabet,
        other_alphabet: &Alphabet,
    ) -> Transducer {
        let mut result = Transducer::new();
        let mut mapping: HashMap<(i32, i32), i32> = HashMap::new();
        let start = (self.initial, other.initial);
        mapping.insert(start, result.initial);
        let mut pending = vec![start];

        while let Some((s1, s2)) = pending.pop() {
            let from = mapping[&(s1, s2)];

            if let Some(edges) = self.transitions.get(&s1) {
                for (&tag, dests) in edges {
                    let (l1, r1) = self_alphabet.decode(tag);
                    for &(d1, w1) in dests {
                        if tag == 0 {
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (d1, s2),
                            );
                            result.link_states(from, to, 0, w1);
                            continue;
                        }
                        if let Some(other_edges) = other.transitions.get(&s2) {
                            for (&other_tag, other_dests) in other_edges {
                                if other_tag == 0 {
                                    continue;
                                }
                                let (l2, r2) = other_alphabet.decode(other_tag);
                                if self_alphabet.same_symbol(l1, other_alphabet, l2, false)
                                    && self_alphabet.same_symbol(r1, other_alphabet, r2, false)
                                {
                                    for &(d2, _) in other_dests {
                                        let to = Self::product_state(
                                            &mut result,
                                            &mut mapping,
                                            &mut pending,
                                            (d1, d2),
                                        );
                                        result.link_states(from, to, tag, w1);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if let Some(other_edges) = other.transitions.get(&s2) {
                if let Some(other_dests) = other_edges.get(&0) {
                    for &(d2, w2) in other_dests {
                        let to = Self::product_state(
                            &mut result,
                            &mut mapping,
                            &mut pending,
                            (s1, d2),
                        );
                        result.link_states(from, to, 0, w2);
                    }
                }
            }

            if let (Some(&w1), Some(&w2)) = (self.finals.get(&s1), other.finals.get(&s2)) {
                result.set_final(from, w1 + w2);
            }
        }
        result
    }

    /// Compose this transducer with `other`.
    ///
    /// One side of each of this transducer's pairs (the output side, or the
    /// input side when `inverted`) is matched against `other`'s input side;
    /// the result pairs the unmatched side with `other`'s output. With
    /// `anywhere`, `other` may be applied over any substring of a path
    /// instead of the whole path. New pairs and imported tags are interned
    /// into `self_alphabet`.
    pub fn compose(
        &self,
        other: &Transducer,
        self_alphabet: &mut Alphabet,
        other_alphabet: &Alphabet,
        inverted: bool,
        anywhere: bool,
    ) -> Transducer {
        fn import(dest: &mut Alphabet, src: &Alphabet, sym: Symbol) -> Symbol {
            if sym < 0 {
                let name = src.tag_name(sym).to_string();
                dest.include_symbol(&name);
                dest.tag_code(&name)
            } else {
                sym
            }
        }

        let mut result = Transducer::new();
        let mut mapping: HashMap<(i32, i32), i32> = HashMap::new();
        let start = (self.initial, other.initial);
        mapping.insert(start, result.initial);
        let mut pending = vec![start];

        while let Some((s1, s2)) = pending.pop() {
            let from = mapping[&(s1, s2)];
            let other_passive = s2 == other.initial || other.finals.contains_key(&s2);

            if let Some(edges) = self.transitions.get(&s1) {
                let edge_list: Vec<(i32, Vec<(i32, f64)>)> = edges
                    .iter()
                    .map(|(&tag, dests)| (tag, dests.clone()))
                    .collect();
                for (tag, dests) in edge_list {
                    let (left, right) = self_alphabet.decode(tag);
                    let (keep, matched) = if inverted { (right, left) } else { (left, right) };
                    for &(d1, w1) in &dests {
                        if matched == 0 {
                            let label = self_alphabet.pair(keep, 0);
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (d1, s2),
                            );
                            result.link_states(from, to, label, w1);
                            continue;
                        }
                        if anywhere && other_passive {
                            // outside the applied region the pair passes through
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (d1, s2),
                            );
                            result.link_states(from, to, tag, w1);
                        }
                        if let Some(other_edges) = other.transitions.get(&s2) {
                            let other_list: Vec<(i32, Vec<(i32, f64)>)> = other_edges
                                .iter()
                                .map(|(&t, d)| (t, d.clone()))
                                .collect();
                            for (other_tag, other_dests) in other_list {
                                let (other_left, other_right) = other_alphabet.decode(other_tag);
                                if other_left == 0 {
                                    continue;
                                }
                                if self_alphabet.same_symbol(
                                    matched,
                                    other_alphabet,
                                    other_left,
                                    false,
                                ) {
                                    let out = import(self_alphabet, other_alphabet, other_right);
                                    let label = self_alphabet.pair(keep, out);
                                    for &(d2, w2) in &other_dests {
                                        let to = Self::product_state(
                                            &mut result,
                                            &mut mapping,
                                            &mut pending,
                                            (d1, d2),
                                        );
                                        result.link_states(from, to, label, w1 + w2);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // other advances alone over its epsilon-input edges
            if let Some(other_edges) = other.transitions.get(&s2) {
                let other_list: Vec<(i32, Vec<(i32, f64)>)> = other_edges
                    .iter()
                    .map(|(&t, d)| (t, d.clone()))
                    .collect();
                for (other_tag, other_dests) in other_list {
                    let (other_left, other_right) = other_alphabet.decode(other_tag);
                    if other_left == 0 && other_tag != 0 {
                        let out = import(self_alphabet, other_alphabet, other_right);
                        let label = self_alphabet.pair(0, out);
                        for &(d2, w2) in &other_dests {
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (s1, d2),
                            );
                            result.link_states(from, to, label, w2);
                        }
                    } else if other_tag == 0 {
                        for &(d2, w2) in &other_dests {
                            let to = Self::product_state(
                                &mut result,
                                &mut mapping,
                                &mut pending,
                                (s1, d2),
                            );
                            result.link_states(from, to, 0, w2);
                        }
                    }
                }
            }

            if let Some(&w1) = self.finals.get(&s1) {
                if let Some(&w2) = other.finals.get(&s2) {
                    result.set_final(from, w1 + w2);
                } else if anywhere && s2 == other.initial {
                    result.set_final(from, w1);
                }
            }
        }
        result
    }

    /// True when any edge or final carries a non-default weight.
    pub fn weighted(&self) -> bool {
        self.finals.values().any(|&w| w != DEFAULT_WEIGHT)
            || self.transitions.values().any(|edges| {
                edges
                    .values()
                    .any(|dests| dests.iter().any(|&(_, w)| w != DEFAULT_WEIGHT))
            })
    }

    /// Write the delta-encoded binary body, preceded by its header.
    ///
    /// State ids must be dense (`0..len`), which holds after any of the
    /// normalization operations. `tag_offset` is added to every emitted tag
    /// delta.
    pub fn write<W: Write>(&self, output: &mut W, tag_offset: u32) -> Result<(), FstError> {
        let weighted = self.weighted();
        let features = if weighted { transducer_features::WEIGHTS } else { 0 };
        headers::write_header(&HEADER_TRANSDUCER, features, output)?;

        codec::write_int(self.initial as u32, output)?;
        codec::write_int(self.finals.len() as u32, output)?;
        let mut base = 0i32;
        for (&state, &weight) in &self.finals {
            codec::write_int((state - base) as u32, output)?;
            if weighted {
                codec::write_double(weight, output)?;
            }
            base = state;
        }

        let state_count = self.transitions.len() as i32;
        codec::write_int(state_count as u32, output)?;
        for (&state, edges) in &self.transitions {
            let count: usize = edges.values().map(Vec::len).sum();
            codec::write_int(count as u32, output)?;
            let mut tag_base = 0i32;
            for (&tag, dests) in edges {
                for &(dest, weight) in dests {
                    codec::write_int((tag - tag_base) as u32 + tag_offset, output)?;
                    tag_base = tag;
                    let relative = (dest - state).rem_euclid(state_count);
                    codec::write_int(relative as u32, output)?;
                    if weighted {
                        codec::write_double(weight, output)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read a binary body written by [`Transducer::write`].
    pub fn read<R: Read>(input: &mut R, tag_offset: u32) -> Result<Self, FstError> {
        let features =
            headers::read_header(&HEADER_TRANSDUCER, transducer_features::UNKNOWN, input)?;
        let weighted = features & transducer_features::WEIGHTS != 0;

        let mut t = Transducer {
            initial: codec::read_int(input)? as i32,
            finals: BTreeMap::new(),
            transitions: BTreeMap::new(),
        };

        let final_count = codec::read_int(input)?;
        let mut base = 0i32;
        for _ in 0..final_count {
            base += codec::read_int(input)? as i32;
            let weight = if weighted {
                codec::read_double(input)?
            } else {
                DEFAULT_WEIGHT
            };
            t.finals.insert(base, weight);
        }

        let state_count = codec::read_int(input)? as i32;
        for state in 0..state_count {
            t.transitions.entry(state).or_default();
        }
        for state in 0..state_count {
            let edge_count = codec::read_int(input)?;
            let mut tag_base = 0i32;
            for _ in 0..edge_count {
                tag_base += codec::read_int(input)? as i32 - tag_offset as i32;
                let dest = (state + codec::read_int(input)? as i32).rem_euclid(state_count);
                let weight = if weighted {
                    codec::read_double(input)?
                } else {
                    DEFAULT_WEIGHT
                };
                t.transitions
                    .get_mut(&state)
                    .unwrap()
                    .entry(tag_base)
                    .or_default()
                    .push((dest, weight));
            }
        }
        Ok(t)
    }

    /// Dump the transducer in ATT format: one tab-separated line per edge,
    /// then one line per final state.
    pub fn show<W: Write>(&self, alphabet: &Alphabet, output: &mut W) -> std::io::Result<()> {
        for (&state, edges) in &self.transitions {
            for (&tag, dests) in edges {
                let (left, right) = alphabet.decode(tag);
                let mut left_text = String::new();
                alphabet.get_symbol(&mut left_text, left, false);
                let mut right_text = String::new();
                alphabet.get_symbol(&mut right_text, right, false);
                for &(dest, weight) in dests {
                    writeln!(
                        output,
                        "{}\t{}\t{}\t{}\t{:.6}",
                        state,
                        dest,
                        if left_text.is_empty() { "ε" } else { &left_text },
                        if right_text.is_empty() { "ε" } else { &right_text },
                        weight
                    )?;
                }
            }
        }
        for (&state, &weight) in &self.finals {
            writeln!(output, "{state}\t{weight:.6}")?;
        }
        Ok(())
    }

    pub(crate) fn states(&self) -> &BTreeMap<i32, Edges> {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // a:b c:d with per-pair codes from the given alphabet
    fn word_pair(a: &mut Alphabet, pairs: &[(char, char)]) -> Transducer {
        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for &(i, o) in pairs {
            let tag = a.pair(i as Symbol, o as Symbol);
            state = t.insert_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        t.set_final(state, DEFAULT_WEIGHT);
        t
    }

    #[test]
    fn insert_single_is_idempotent() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        let tag = a.pair('x' as Symbol, 'x' as Symbol);
        let s1 = t.insert_single_transduction(tag, t.get_initial(), DEFAULT_WEIGHT);
        let s2 = t.insert_single_transduction(tag, t.get_initial(), DEFAULT_WEIGHT);
        assert_eq!(s1, s2);
        assert_eq!(t.transition_count(), 1);
    }

    #[test]
    fn insert_single_skips_self_loop() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        let tag = a.pair('x' as Symbol, 'x' as Symbol);
        let initial = t.get_initial();
        let forward = t.insert_single_transduction(tag, initial, DEFAULT_WEIGHT);
        t.link_states(initial, initial, tag, DEFAULT_WEIGHT);
        assert_eq!(t.insert_single_transduction(tag, initial, DEFAULT_WEIGHT), forward);
    }

    #[test]
    fn link_states_suppresses_duplicates() {
        let mut t = Transducer::new();
        let s = t.new_state();
        t.link_states(t.get_initial(), s, 7, DEFAULT_WEIGHT);
        t.link_states(t.get_initial(), s, 7, DEFAULT_WEIGHT);
        assert_eq!(t.transition_count(), 1);
    }

    #[test]
    fn closure_follows_epsilon_only() {
        let mut t = Transducer::new();
        let s1 = t.new_state();
        let s2 = t.new_state();
        let s3 = t.new_state();
        t.link_states(t.get_initial(), s1, 0, DEFAULT_WEIGHT);
        t.link_states(s1, s2, 0, DEFAULT_WEIGHT);
        t.link_states(s2, s3, 5, DEFAULT_WEIGHT);
        let c = t.closure(t.get_initial(), 0);
        assert_eq!(c, BTreeSet::from([t.get_initial(), s1, s2]));
    }

    #[test]
    fn join_finals_requires_a_final() {
        let mut t = Transducer::new();
        assert!(matches!(t.join_finals(0), Err(FstError::EmptyFinals)));
        t.set_final(t.get_initial(), DEFAULT_WEIGHT);
        assert!(t.join_finals(0).is_ok());
        assert_eq!(t.finals().len(), 1);
    }

    #[test]
    fn insert_transducer_reaches_returned_final() {
        let mut a = Alphabet::new();
        let inner = word_pair(&mut a, &[('a', 'x'), ('b', 'y')]);
        let mut outer = Transducer::new();
        let joined = outer
            .insert_transducer(outer.get_initial(), &inner, 0)
            .unwrap();
        outer.set_final(joined, DEFAULT_WEIGHT);
        assert!(outer.recognise("ab", &a));
        assert!(!outer.recognise("a", &a));
    }

    #[test]
    fn union_accepts_both_languages() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('a', 'a')]);
        let u = word_pair(&mut a, &[('b', 'b')]);
        t.union_with(&u, 0).unwrap();
        assert!(t.recognise("a", &a));
        assert!(t.recognise("b", &a));
        assert!(!t.recognise("c", &a));
    }

    #[test]
    fn one_or_more_repeats() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('a', 'a'), ('b', 'b')]);
        t.one_or_more(0).unwrap();
        assert!(t.recognise("ab", &a));
        assert!(t.recognise("abab", &a));
        assert!(t.recognise("ababab", &a));
        assert!(!t.recognise("aba", &a));
    }

    #[test]
    fn optional_accepts_empty() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('a', 'a')]);
        t.optional(0).unwrap();
        assert!(t.recognise("", &a));
        assert!(t.recognise("a", &a));
        assert!(!t.recognise("aa", &a));
    }

    #[test]
    fn minimize_equal_languages_equal_sizes() {
        let mut a = Alphabet::new();
        // the same word built twice via different unions
        let mut t1 = word_pair(&mut a, &[('a', 'a'), ('b', 'b')]);
        let extra = word_pair(&mut a, &[('a', 'a'), ('b', 'b')]);
        t1.union_with(&extra, 0).unwrap();
        let mut t2 = word_pair(&mut a, &[('a', 'a'), ('b', 'b')]);
        t1.minimize(0).unwrap();
        t2.minimize(0).unwrap();
        assert_eq!(t1.len(), t2.len());
        assert!(t1.recognise("ab", &a));
    }

    #[test]
    fn determinize_keeps_language() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('a', 'a')]);
        let u = word_pair(&mut a, &[('a', 'a'), ('b', 'b')]);
        t.union_with(&u, 0).unwrap();
        t.determinize(0);
        assert!(t.recognise("a", &a));
        assert!(t.recognise("ab", &a));
        assert!(!t.recognise("b", &a));
    }

    #[test]
    fn binary_roundtrip_unweighted() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('c', 'c'), ('a', 'a'), ('t', 't')]);
        t.minimize(0).unwrap();

        let mut buf = Vec::new();
        t.write(&mut buf, 0).unwrap();
        let u = Transducer::read(&mut Cursor::new(buf), 0).unwrap();
        assert_eq!(u.len(), t.len());
        assert_eq!(u.transition_count(), t.transition_count());
        assert!(u.recognise("cat", &a));
        assert!(!u.weighted());
    }

    #[test]
    fn binary_roundtrip_weighted() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        let tag = a.pair('r' as Symbol, 'r' as Symbol);
        let s = t.insert_single_transduction(tag, t.get_initial(), 1.5);
        t.set_final(s, 0.25);

        let mut buf = Vec::new();
        t.write(&mut buf, 0).unwrap();
        let u = Transducer::read(&mut Cursor::new(buf), 0).unwrap();
        assert!(u.weighted());
        assert_eq!(u.finals().values().copied().collect::<Vec<_>>(), vec![0.25]);
        let edges: f64 = u
            .states()
            .values()
            .flat_map(|e| e.values())
            .flat_map(|d| d.iter().map(|&(_, w)| w))
            .sum();
        assert!((edges - 1.5).abs() < 1e-9);
    }

    #[test]
    fn trim_drops_untranslatable_paths() {
        // monodix: cat -> cat<n>, dog -> dog<n>
        let mut mono_a = Alphabet::new();
        mono_a.include_symbol("<n>");
        let n_mono = mono_a.tag_code("<n>");
        let mut mono = Transducer::new();
        for word in ["cat", "dog"] {
            let mut state = mono.get_initial();
            for c in word.chars() {
                let tag = mono_a.pair(c as Symbol, c as Symbol);
                state = mono.insert_new_single_transduction(tag, state, DEFAULT_WEIGHT);
            }
            let tag = mono_a.pair(0, n_mono);
            state = mono.insert_new_single_transduction(tag, state, DEFAULT_WEIGHT);
            mono.set_final(state, DEFAULT_WEIGHT);
        }

        // bidix only knows cat<n>
        let mut bi_a = Alphabet::new();
        bi_a.include_symbol("<n>");
        let n_bi = bi_a.tag_code("<n>");
        let mut bi = Transducer::new();
        let mut state = bi.get_initial();
        for c in "cat".chars() {
            let tag = bi_a.pair(c as Symbol, c as Symbol);
            state = bi.insert_new_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        let tag = bi_a.pair(n_bi, n_bi);
        state = bi.insert_new_single_transduction(tag, state, DEFAULT_WEIGHT);
        bi.set_final(state, DEFAULT_WEIGHT);

        let mut trimmed = mono.trim(&bi, &mono_a, &bi_a);
        trimmed.minimize(0).unwrap();
        assert!(trimmed.recognise("cat", &mono_a));
        assert!(!trimmed.recognise("dog", &mono_a));
    }

    #[test]
    fn intersect_keeps_common_pairs() {
        let mut a = Alphabet::new();
        let mut t1 = word_pair(&mut a, &[('a', 'x')]);
        let extra = word_pair(&mut a, &[('b', 'y')]);
        t1.union_with(&extra, 0).unwrap();
        let t2 = word_pair(&mut a, &[('a', 'x')]);
        let mut both = t1.intersect(&t2, &a, &a);
        both.minimize(0).unwrap();
        assert!(both.recognise("a", &a));
        assert!(!both.recognise("b", &a));
    }

    #[test]
    fn clear_resets_to_a_fresh_graph() {
        let mut a = Alphabet::new();
        let mut t = word_pair(&mut a, &[('a', 'a')]);
        assert!(!t.is_empty());
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.get_initial(), 0);
    }

    #[test]
    fn dot_star_loops_allow_trailing_material() {
        // the lt-trim shape: bidix plus loops over the monodix output side
        let mut mono_a = Alphabet::new();
        mono_a.include_symbol("<n>");
        let n = mono_a.tag_code("<n>");
        mono_a.pair('c' as Symbol, 'c' as Symbol);
        mono_a.pair(0, n);

        let mut bi_a = Alphabet::new();
        let mut bi = Transducer::new();
        let mut state = bi.get_initial();
        for c in "cat".chars() {
            let tag = bi_a.pair(c as Symbol, c as Symbol);
            state = bi.insert_new_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        bi.set_final(state, DEFAULT_WEIGHT);

        let mut loops = BTreeSet::new();
        bi_a.create_loopback_symbols(&mut loops, &mono_a, crate::alphabet::Side::Right, false);
        let looped = bi.append_dot_star(&loops, 0);

        // the loop admits any number of <n>:<n> symbols after "cat"
        assert!(looped.recognise("cat", &bi_a));
        let bi_n = bi_a.tag_code("<n>");
        let final_state = *looped.finals().keys().next().unwrap();
        let pair = *loops.iter().next().unwrap();
        assert_eq!(bi_a.decode(pair), (bi_n, bi_n));
        assert!(looped
            .states()
            .get(&final_state)
            .and_then(|edges| edges.get(&pair))
            .is_some_and(|dests| dests.iter().any(|&(d, _)| d == final_state)));
    }

    #[test]
    fn compose_chains_outputs() {
        // f: a -> b, g: b -> c; f∘g: a -> c
        let mut fa = Alphabet::new();
        let mut f = Transducer::new();
        let tag = fa.pair('a' as Symbol, 'b' as Symbol);
        let s = f.insert_single_transduction(tag, f.get_initial(), DEFAULT_WEIGHT);
        f.set_final(s, DEFAULT_WEIGHT);

        let mut ga = Alphabet::new();
        let mut g = Transducer::new();
        let tag = ga.pair('b' as Symbol, 'c' as Symbol);
        let s = g.insert_single_transduction(tag, g.get_initial(), DEFAULT_WEIGHT);
        g.set_final(s, DEFAULT_WEIGHT);

        let composed = f.compose(&g, &mut fa, &ga, false, false);
        assert!(!composed.has_no_finals());
        // the composed edge must be a:c
        let mut found = false;
        for edges in composed.states().values() {
            for &tag in edges.keys() {
                if fa.decode(tag) == ('a' as Symbol, 'c' as Symbol) {
                    found = true;
                }
            }
        }
        assert!(found);
    }
}
