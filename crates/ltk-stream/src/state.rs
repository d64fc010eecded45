// Multi-path traversal state over an executable transducer.
//
// Paths are stored as a growing arena of Step records linked backwards by
// index; the active frontier is the range [start, end). Advancing the
// frontier never rewrites earlier steps, so a finished path can be read
// back by walking the prev links. The frontier is kept epsilon-closed.

use hashbrown::HashMap;
use ltk_core::case;
use ltk_core::symbol::Symbol;
use ltk_fst::alphabet::Alphabet;
use ltk_fst::exec::TransducerExe;
use std::collections::BTreeSet;

/// Arena size kept across words; anything beyond this is released when a
/// new word begins.
const RESET_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
struct Step {
    node: u64,
    symbol: Symbol,
    weight: f64,
    dirty: bool,
    prev: usize,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    steps: Vec<Step>,
    start: usize,
    end: usize,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// Number of alive paths.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn is_alive(&self) -> bool {
        self.end > self.start
    }

    fn push_step(&mut self, step: Step) {
        if self.end < self.steps.len() {
            self.steps[self.end] = step;
        } else {
            self.steps.push(step);
        }
        self.end += 1;
    }

    /// Reset to a single path at `initial`, releasing excess arena space.
    pub fn init(&mut self, exe: &TransducerExe, initial: u64) {
        if self.steps.len() > RESET_CAPACITY {
            self.steps.truncate(RESET_CAPACITY);
            self.steps.shrink_to(RESET_CAPACITY);
        }
        self.start = 0;
        self.end = 0;
        self.push_step(Step { node: initial, ..Step::default() });
        self.epsilon_closure(exe);
    }

    /// Add a fresh root at `initial` to the current frontier without
    /// touching the existing paths.
    pub fn reinit(&mut self, exe: &TransducerExe, initial: u64) {
        let start_was = self.start;
        self.start = self.end;
        self.push_step(Step { node: initial, ..Step::default() });
        self.epsilon_closure(exe);
        self.start = start_was;
    }

    fn apply(
        &mut self,
        exe: &TransducerExe,
        input: Symbol,
        pos: usize,
        old_sym: Symbol,
        new_sym: Symbol,
        dirty: bool,
    ) -> bool {
        let prev = self.steps[pos];
        let set_dirty = prev.dirty || dirty;
        let range = exe.get_range(prev.node, input);
        if range.is_empty() {
            return false;
        }
        // the slice borrows the transducer, not the arena
        let transitions: Vec<_> = range.to_vec();
        for t in transitions {
            let mut symbol = t.osym;
            if old_sym != 0 && symbol == old_sym {
                symbol = new_sym;
            }
            self.push_step(Step {
                node: t.dest,
                symbol,
                weight: t.weight,
                dirty: set_dirty,
                prev: pos,
            });
        }
        true
    }

    fn epsilon_closure(&mut self, exe: &TransducerExe) {
        let mut i = self.start;
        while i < self.end {
            self.apply(exe, 0, i, 0, 0, false);
            i += 1;
        }
    }

    /// Advance every path over `input`.
    pub fn step(&mut self, exe: &TransducerExe, input: Symbol) {
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, 0, 0, false);
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Advance over `input`, also trying `alt`; paths taken through the
    /// alternative are marked dirty.
    pub fn step_alt(&mut self, exe: &TransducerExe, input: Symbol, alt: Symbol) {
        if alt == 0 || alt == input {
            self.step(exe, input);
            return;
        }
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, 0, 0, false);
            self.apply(exe, alt, i, 0, 0, true);
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Advance over `input` with two alternatives.
    pub fn step_alt2(&mut self, exe: &TransducerExe, input: Symbol, alt1: Symbol, alt2: Symbol) {
        if alt1 == 0 || alt1 == input || alt1 == alt2 {
            self.step_alt(exe, input, alt2);
            return;
        }
        if alt2 == 0 || alt2 == input {
            self.step_alt(exe, input, alt1);
            return;
        }
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, 0, 0, false);
            self.apply(exe, alt1, i, 0, 0, true);
            self.apply(exe, alt2, i, 0, 0, true);
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Advance over `input` and a whole set of alternatives (used for
    /// diacritic restoration).
    pub fn step_alts(&mut self, exe: &TransducerExe, input: Symbol, alts: &BTreeSet<Symbol>) {
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, 0, 0, false);
            for &alt in alts {
                if alt == 0 || alt == input {
                    continue;
                }
                self.apply(exe, alt, i, 0, 0, true);
            }
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Advance over `input`, trying `alt` only where `input` itself has no
    /// transition.
    pub fn step_careful(&mut self, exe: &TransducerExe, input: Symbol, alt: Symbol) {
        if alt == 0 || alt == input {
            self.step(exe, input);
            return;
        }
        let new_start = self.end;
        for i in self.start..new_start {
            if !self.apply(exe, input, i, 0, 0, false) {
                self.apply(exe, alt, i, 0, 0, true);
            }
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Advance over `input`, rewriting any traversed output symbol equal to
    /// `old_sym` into `new_sym`.
    pub fn step_override(&mut self, exe: &TransducerExe, input: Symbol, old_sym: Symbol, new_sym: Symbol) {
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, old_sym, new_sym, false);
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Like [`State::step_override`] with a case-folding alternative.
    pub fn step_override_alt(
        &mut self,
        exe: &TransducerExe,
        input: Symbol,
        alt: Symbol,
        old_sym: Symbol,
        new_sym: Symbol,
    ) {
        if alt == 0 || alt == input {
            self.step_override(exe, input, old_sym, new_sym);
            return;
        }
        let new_start = self.end;
        for i in self.start..new_start {
            self.apply(exe, input, i, old_sym, new_sym, false);
            self.apply(exe, alt, i, old_sym, new_sym, true);
        }
        self.start = new_start;
        self.epsilon_closure(exe);
    }

    /// Like [`State::step`] but paths that cannot advance survive in place.
    pub fn step_optional(&mut self, exe: &TransducerExe, input: Symbol) {
        let old_start = self.start;
        self.step(exe, input);
        self.start = old_start;
    }

    /// Case-folding step: an uppercase character also tries its lowercase
    /// form unless matching is case-sensitive.
    pub fn step_case(&mut self, exe: &TransducerExe, val: Symbol, case_sensitive: bool) {
        if !case::symbol_is_upper(val) || case_sensitive {
            self.step(exe, val);
        } else {
            self.step_alt(exe, val, case::lower_symbol(val));
        }
    }

    /// Case-folding step that keeps the surface (uppercase) symbol on the
    /// output trace where the dictionary stored the lowercase form.
    pub fn step_case_override(&mut self, exe: &TransducerExe, val: Symbol, case_sensitive: bool) {
        if !case::symbol_is_upper(val) || case_sensitive {
            self.step(exe, val);
        } else {
            let lower = case::lower_symbol(val);
            self.step_override_alt(exe, val, lower, lower, val);
        }
    }

    /// True when any path sits on a final node of `finals`.
    pub fn is_final(&self, finals: &HashMap<u64, f64>) -> bool {
        (self.start..self.end).any(|i| finals.contains_key(&self.steps[i].node))
    }

    fn extract(
        &self,
        pos: usize,
        result: &mut String,
        weight: &mut f64,
        alphabet: &Alphabet,
        escaped_chars: &BTreeSet<char>,
        uppercase: bool,
    ) {
        let mut symbols = Vec::new();
        let mut idx = pos;
        while idx != 0 {
            let step = &self.steps[idx];
            *weight += step.weight;
            if step.symbol != 0 {
                symbols.push(step.symbol);
            }
            idx = step.prev;
        }
        for &sym in symbols.iter().rev() {
            if sym > 0 {
                if let Some(c) = char::from_u32(sym as u32) {
                    if escaped_chars.contains(&c) {
                        result.push('\\');
                    }
                }
            }
            alphabet.get_symbol(result, sym, uppercase);
        }
    }

    /// Collect the outputs of all paths on final nodes, ranked by weight.
    ///
    /// Results are sorted by ascending total weight, capped at
    /// `max_analyses` entries and `max_weight_classes` distinct weights,
    /// deduplicated, and emitted as `/output` per reading, optionally
    /// followed by `<W:weight>`.
    #[allow(clippy::too_many_arguments)]
    pub fn filter_finals(
        &self,
        finals: &HashMap<u64, f64>,
        alphabet: &Alphabet,
        escaped_chars: &BTreeSet<char>,
        display_weights: bool,
        max_analyses: usize,
        max_weight_classes: usize,
        uppercase: bool,
        firstupper: bool,
        firstchar: usize,
    ) -> String {
        let mut results: Vec<(f64, String)> = Vec::new();

        for i in self.start..self.end {
            let step = &self.steps[i];
            if let Some(&final_weight) = finals.get(&step.node) {
                let mut weight = final_weight;
                let mut text = String::new();
                self.extract(i, &mut text, &mut weight, alphabet, escaped_chars, uppercase);
                if firstupper && step.dirty {
                    text = uppercase_at(&text, firstchar);
                }
                results.push((weight, text));
            }
        }

        cap_results(&mut results, max_analyses, max_weight_classes);

        let mut output = String::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for (weight, text) in &results {
            if !seen.insert(text.as_str()) {
                continue;
            }
            output.push('/');
            output.push_str(text);
            if display_weights {
                output.push_str(&format!("<W:{weight:.6}>"));
            }
        }
        output
    }

    fn path_symbols(&self, pos: usize) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        let mut idx = pos;
        while idx != 0 {
            let step = &self.steps[idx];
            if step.symbol != 0 {
                symbols.push(step.symbol);
            }
            idx = step.prev;
        }
        symbols.reverse();
        symbols
    }

    /// Translation-memory flavour of [`State::filter_finals`]: number tags
    /// are re-substituted from the captured-numbers table in reading order,
    /// and spaces re-expand to the queued blanks.
    pub fn filter_finals_tm(
        &self,
        finals: &HashMap<u64, f64>,
        alphabet: &Alphabet,
        escaped_chars: &BTreeSet<char>,
        blankqueue: &mut std::collections::VecDeque<String>,
        numbers: &[String],
        number_tag: Symbol,
    ) -> String {
        let mut result = String::new();
        let mut number_index = 0;
        for i in self.start..self.end {
            if !finals.contains_key(&self.steps[i].node) {
                continue;
            }
            result.push('/');
            for sym in self.path_symbols(i) {
                if sym == number_tag && number_index < numbers.len() {
                    result.push_str(&numbers[number_index]);
                    number_index += 1;
                } else if sym == ' ' as Symbol {
                    match blankqueue.pop_front() {
                        Some(blank) => result.push_str(&blank),
                        None => result.push(' '),
                    }
                } else {
                    if let Some(c) = ltk_core::symbol::to_char(sym) {
                        if escaped_chars.contains(&c) {
                            result.push('\\');
                        }
                    }
                    alphabet.get_symbol(&mut result, sym, false);
                }
            }
        }
        result
    }

    /// SAO flavour of [`State::filter_finals`]: tags are rendered as SGML
    /// entities.
    pub fn filter_finals_sao(
        &self,
        finals: &HashMap<u64, f64>,
        alphabet: &Alphabet,
        escaped_chars: &BTreeSet<char>,
        uppercase: bool,
        firstupper: bool,
    ) -> String {
        let mut result = String::new();
        for i in self.start..self.end {
            if !finals.contains_key(&self.steps[i].node) {
                continue;
            }
            let mut reading = String::new();
            for sym in self.path_symbols(i) {
                if let Some(c) = ltk_core::symbol::to_char(sym) {
                    if escaped_chars.contains(&c) {
                        reading.push('\\');
                    }
                }
                if sym < 0 {
                    let name = alphabet.tag_name(sym);
                    let inner: String = name
                        .chars()
                        .skip(1)
                        .take(name.chars().count().saturating_sub(2))
                        .collect();
                    reading.push('&');
                    reading.push_str(&inner);
                    reading.push(';');
                } else {
                    alphabet.get_symbol(&mut reading, sym, uppercase);
                }
            }
            if firstupper {
                reading = uppercase_at(&reading, 0);
            }
            result.push('/');
            result.push_str(&reading);
        }
        result
    }

    /// Does the last segment of the path ending at arena index `pos`
    /// contain `symbol`? `separator` bounds the segment (0 = whole path).
    pub fn last_part_has_required_symbol(
        &self,
        pos: usize,
        symbol: Symbol,
        separator: Symbol,
    ) -> bool {
        let mut idx = pos;
        while idx != 0 {
            let step = &self.steps[idx];
            if step.symbol == symbol {
                return true;
            }
            if separator != 0 && step.symbol == separator {
                return false;
            }
            idx = step.prev;
        }
        false
    }

    /// Does any alive path carry `symbol` anywhere in its trace?
    pub fn has_symbol(&self, symbol: Symbol) -> bool {
        (self.start..self.end).any(|i| self.last_part_has_required_symbol(i, symbol, 0))
    }

    /// Keep only the paths with the fewest separators that still carry
    /// `required` in their last segment, and drop paths with more than
    /// `max_elements` segments.
    pub fn prune_compounds(&mut self, required: Symbol, separator: Symbol, max_elements: usize) {
        let len = self.size();
        let mut counts = vec![0usize; len];
        let mut min = max_elements;
        for i in 0..len {
            let mut found = false;
            let mut idx = self.start + i;
            while idx != 0 {
                let step = self.steps[idx];
                if step.symbol == required && counts[i] == 0 {
                    found = true;
                } else if step.symbol == separator {
                    if found {
                        counts[i] += 1;
                    } else {
                        counts[i] = usize::MAX;
                        break;
                    }
                }
                idx = step.prev;
            }
            if counts[i] < min {
                min = counts[i];
            }
        }
        let mut keep = 0;
        for i in 0..len {
            if counts[i] == min {
                let src = self.start + i;
                let dest = self.start + keep;
                if src != dest {
                    self.steps[dest] = self.steps[src];
                }
                keep += 1;
            }
        }
        self.end = self.start + keep;
    }

    /// For every path on a final node whose last segment carries
    /// `required`, start a fresh branch at `restart` joined through a
    /// `separator` output symbol.
    pub fn restart_finals(
        &mut self,
        exe: &TransducerExe,
        finals: &HashMap<u64, f64>,
        required: Symbol,
        restart: u64,
        separator: Symbol,
    ) {
        let limit = self.end;
        for i in self.start..limit {
            let step = self.steps[i];
            if finals.contains_key(&step.node)
                && self.last_part_has_required_symbol(i, required, separator)
            {
                let start_was = self.start;
                self.start = self.end;
                self.push_step(Step {
                    node: restart,
                    symbol: separator,
                    weight: 0.0,
                    dirty: false,
                    prev: i,
                });
                self.epsilon_closure(exe);
                self.start = start_was;
            }
        }
    }

    /// Drop paths whose last segment carries `symbol`.
    pub fn prune_states_with_forbidden_symbol(&mut self, symbol: Symbol) {
        let mut keep = 0;
        for i in self.start..self.end {
            if !self.last_part_has_required_symbol(i, symbol, 0) {
                let dest = self.start + keep;
                if i != dest {
                    self.steps[dest] = self.steps[i];
                }
                keep += 1;
            }
        }
        self.end = self.start + keep;
    }
}

/// Uppercase the character at char position `idx` (skipping a leading `~`).
fn uppercase_at(text: &str, idx: usize) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut idx = idx;
    if chars.get(idx) == Some(&'~') {
        idx += 1;
    }
    if let Some(c) = chars.get(idx) {
        chars[idx] = case::to_upper(*c);
    }
    chars.into_iter().collect()
}

fn cap_results(results: &mut Vec<(f64, String)>, max_analyses: usize, max_weight_classes: usize) {
    if results.is_empty() {
        return;
    }
    results.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    if max_analyses < results.len() {
        results.truncate(max_analyses);
    }
    if max_weight_classes < results.len() {
        let mut remaining = max_weight_classes;
        let mut last_weight = results[0].0 + 1.0;
        let mut i = 0;
        while i < results.len() {
            if results[i].0 != last_weight {
                last_weight = results[i].0;
                if remaining == 0 {
                    results.truncate(i);
                    return;
                }
                remaining -= 1;
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltk_fst::transducer::{Transducer, DEFAULT_WEIGHT};

    fn escaped() -> BTreeSet<char> {
        BTreeSet::new()
    }

    // cat -> cat<n>, with a second weighted reading cat<v>
    fn fixture() -> (Alphabet, TransducerExe, HashMap<u64, f64>) {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        a.include_symbol("<v>");
        let n = a.tag_code("<n>");
        let v = a.tag_code("<v>");

        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for c in "cat".chars() {
            let tag = a.pair(c as Symbol, c as Symbol);
            state = t.insert_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        let noun = t.insert_new_single_transduction(a.pair(0, n), state, 0.0);
        t.set_final(noun, 1.0);
        let verb = t.insert_new_single_transduction(a.pair(0, v), state, 0.0);
        t.set_final(verb, 2.0);

        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();
        (a, exe, finals)
    }

    fn filter(state: &State, a: &Alphabet, finals: &HashMap<u64, f64>) -> String {
        state.filter_finals(
            finals,
            a,
            &escaped(),
            false,
            usize::MAX,
            usize::MAX,
            false,
            false,
            0,
        )
    }

    #[test]
    fn walk_and_collect() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
            assert!(s.is_alive());
        }
        assert!(s.is_final(&finals));
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/cat<n>/cat<v>");
    }

    #[test]
    fn dead_on_unknown_input() {
        let (_a, exe, _finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step(&exe, 'x' as Symbol);
        assert!(!s.is_alive());
    }

    #[test]
    fn weights_rank_ascending() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
        }
        let out = s.filter_finals(
            &finals,
            &a,
            &escaped(),
            true,
            usize::MAX,
            usize::MAX,
            false,
            false,
            0,
        );
        assert_eq!(out, "/cat<n><W:1.000000>/cat<v><W:2.000000>");
    }

    #[test]
    fn max_analyses_caps_output() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
        }
        let out = s.filter_finals(
            &finals,
            &a,
            &escaped(),
            false,
            1,
            usize::MAX,
            false,
            false,
            0,
        );
        assert_eq!(out, "/cat<n>");
    }

    #[test]
    fn weight_classes_cap_output() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
        }
        let out = s.filter_finals(
            &finals,
            &a,
            &escaped(),
            false,
            usize::MAX,
            1,
            false,
            false,
            0,
        );
        assert_eq!(out, "/cat<n>");
    }

    #[test]
    fn case_folding_marks_dirty_and_restores() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step_case(&exe, 'C' as Symbol, false);
        for c in "at".chars() {
            s.step_case(&exe, c as Symbol, false);
        }
        let out = s.filter_finals(
            &finals,
            &a,
            &escaped(),
            false,
            usize::MAX,
            usize::MAX,
            false,
            true, // firstupper
            0,
        );
        assert_eq!(out, "/Cat<n>/Cat<v>");
    }

    #[test]
    fn case_sensitive_rejects_folded() {
        let (_a, exe, _finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step_case(&exe, 'C' as Symbol, true);
        assert!(!s.is_alive());
    }

    #[test]
    fn epsilon_closure_is_idempotent() {
        let (_a, exe, _finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        let frontier = s.size();
        s.epsilon_closure(&exe);
        assert_eq!(s.size(), frontier);
    }

    #[test]
    fn deterministic_filtering() {
        let (a, exe, finals) = fixture();
        let mut first = None;
        for _ in 0..3 {
            let mut s = State::new();
            s.init(&exe, exe.initial);
            for c in "cat".chars() {
                s.step(&exe, c as Symbol);
            }
            let out = filter(&s, &a, &finals);
            if let Some(prev) = &first {
                assert_eq!(&out, prev);
            }
            first = Some(out);
        }
    }

    #[test]
    fn step_override_rewrites_output() {
        let mut a = Alphabet::new();
        a.include_symbol("<mark>");
        let mark = a.tag_code("<mark>");
        let mut t = Transducer::new();
        let tag = a.pair('x' as Symbol, mark);
        let s1 = t.insert_single_transduction(tag, t.get_initial(), DEFAULT_WEIGHT);
        t.set_final(s1, DEFAULT_WEIGHT);
        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step_override(&exe, 'x' as Symbol, mark, 'y' as Symbol);
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/y");
    }

    #[test]
    fn step_careful_prefers_primary() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        // both X and x lead somewhere; careful must only take X
        let sx =
            t.insert_single_transduction(a.pair('X' as Symbol, 'X' as Symbol), 0, DEFAULT_WEIGHT);
        t.set_final(sx, DEFAULT_WEIGHT);
        let sl =
            t.insert_single_transduction(a.pair('x' as Symbol, 'x' as Symbol), 0, DEFAULT_WEIGHT);
        t.set_final(sl, DEFAULT_WEIGHT);
        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step_careful(&exe, 'X' as Symbol, 'x' as Symbol);
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/X");
    }

    #[test]
    fn compound_restart_and_prune() {
        // house<L> + boat<R> as a compound
        let mut a = Alphabet::new();
        a.include_symbol("<L>");
        a.include_symbol("<R>");
        let l = a.tag_code("<L>");
        let r = a.tag_code("<R>");

        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for c in "house".chars() {
            state = t.insert_new_single_transduction(
                a.pair(c as Symbol, c as Symbol),
                state,
                DEFAULT_WEIGHT,
            );
        }
        state = t.insert_new_single_transduction(a.pair(0, l), state, DEFAULT_WEIGHT);
        t.set_final(state, DEFAULT_WEIGHT);
        let mut state = t.get_initial();
        for c in "boat".chars() {
            state = t.insert_new_single_transduction(
                a.pair(c as Symbol, c as Symbol),
                state,
                DEFAULT_WEIGHT,
            );
        }
        state = t.insert_new_single_transduction(a.pair(0, r), state, DEFAULT_WEIGHT);
        t.set_final(state, DEFAULT_WEIGHT);

        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "houseboat".chars() {
            s.step(&exe, c as Symbol);
            s.restart_finals(&exe, &finals, l, exe.initial, '+' as Symbol);
            assert!(s.is_alive(), "died at '{c}'");
        }
        s.prune_compounds(r, '+' as Symbol, 4);
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/house<L>+boat<R>");
    }

    #[test]
    fn step_alt2_tries_both_alternatives() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        let s1 =
            t.insert_single_transduction(a.pair('b' as Symbol, 'b' as Symbol), 0, DEFAULT_WEIGHT);
        t.set_final(s1, DEFAULT_WEIGHT);
        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        // the primary and first alternative miss, the second one hits
        s.step_alt2(&exe, 'a' as Symbol, 'x' as Symbol, 'b' as Symbol);
        assert!(s.is_final(&finals));
    }

    #[test]
    fn step_case_override_keeps_surface_symbol() {
        let mut a = Alphabet::new();
        let mut t = Transducer::new();
        let s1 =
            t.insert_single_transduction(a.pair('x' as Symbol, 'x' as Symbol), 0, DEFAULT_WEIGHT);
        t.set_final(s1, DEFAULT_WEIGHT);
        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step_case_override(&exe, 'X' as Symbol, false);
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/X");
    }

    #[test]
    fn step_optional_keeps_stuck_paths() {
        let (_a, exe, _finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        let before = s.size();
        s.step_optional(&exe, 'z' as Symbol);
        assert_eq!(s.size(), before);
    }

    #[test]
    fn reinit_adds_a_fresh_root() {
        let (_a, exe, _finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        s.step(&exe, 'c' as Symbol);
        let alive = s.size();
        s.reinit(&exe, exe.initial);
        assert!(s.size() > alive);
    }

    #[test]
    fn tm_filtering_substitutes_numbers_and_blanks() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        let n = a.tag_code("<n>");
        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for pair in [
            a.pair('x' as Symbol, 'x' as Symbol),
            a.pair(' ' as Symbol, ' ' as Symbol),
            a.pair(n, n),
        ] {
            state = t.insert_new_single_transduction(pair, state, DEFAULT_WEIGHT);
        }
        t.set_final(state, DEFAULT_WEIGHT);
        let exe = TransducerExe::from_transducer(&t, &a);
        let finals: HashMap<u64, f64> =
            exe.finals().iter().map(|f| (f.state, f.weight)).collect();

        let mut s = State::new();
        s.init(&exe, exe.initial);
        for sym in ['x' as Symbol, ' ' as Symbol, n] {
            s.step(&exe, sym);
        }
        let mut blanks = std::collections::VecDeque::from(["[ ]".to_string()]);
        let numbers = vec!["42".to_string()];
        let out = s.filter_finals_tm(&finals, &a, &escaped(), &mut blanks, &numbers, n);
        assert_eq!(out, "/x[ ]42");
    }

    #[test]
    fn sao_filtering_renders_tags_as_entities() {
        let (a, exe, finals) = fixture();
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
        }
        let out = s.filter_finals_sao(&finals, &a, &escaped(), false, true);
        assert_eq!(out, "/Cat&n;/Cat&v;");
    }

    #[test]
    fn forbidden_symbol_pruning() {
        let (a, exe, finals) = fixture();
        let v = a.tag_code("<v>");
        let mut s = State::new();
        s.init(&exe, exe.initial);
        for c in "cat".chars() {
            s.step(&exe, c as Symbol);
        }
        s.prune_states_with_forbidden_symbol(v);
        let out = filter(&s, &a, &finals);
        assert_eq!(out, "/cat<n>");
    }
}
