// Mode-shared lower layer of the stream processor: loaded automaton,
// per-class finals, blank queues, stream readers and print helpers.
//
// Each operating mode lives in its own module and drives this state.

use crate::buffer::InputBuffer;
use crate::input::InputText;
use crate::state::State;
use crate::StreamError;
use hashbrown::HashMap;
use ltk_core::case::{self, CasePattern};
use ltk_core::symbol::{self, Symbol};
use ltk_fst::alphabet::Alphabet;
use ltk_fst::container::{self, TransducerSet};
use ltk_fst::exec::TransducerExe;
use std::collections::{BTreeSet, VecDeque};
use std::io::{Read, Write};

/// Kind of output produced by the generation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// Strip unknown-word marks and tags.
    Clean,
    /// Keep unknown-word marks, strip tags.
    #[default]
    Unknown,
    /// Keep everything.
    All,
    /// Surface form plus the original lexical form after a slash.
    Tagged,
    /// Like `Tagged` but with the marks removed from the surface side.
    TaggedNoMark,
    /// Try the lowercase form only where the surface form has no match.
    CarefulCase,
}

/// Runtime switches shared by all modes.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Never try case-folded alternatives.
    pub case_sensitive: bool,
    /// Use the dictionary case, discarding surface case.
    pub dictionary_case: bool,
    /// Flush output at every `\0` in the input.
    pub null_flush: bool,
    /// Skip the configured ignorable characters.
    pub use_ignored_chars: bool,
    /// Skip the built-in ignorable characters (soft hyphen).
    pub use_default_ignored_chars: bool,
    /// Consult the diacritic-restoration map on each analysis step.
    pub use_restore_chars: bool,
    /// Append `<W:...>` weights to every reading.
    pub display_weights: bool,
    /// Keep compound control symbols visible in output.
    pub show_control_symbols: bool,
    /// Bilingual mode: input carries surface forms to be stripped.
    pub bilingual_surface_forms: bool,
    /// Cap on the number of printed analyses per word.
    pub max_analyses: usize,
    /// Cap on the number of distinct weights per word.
    pub max_weight_classes: usize,
    /// Cap on compound elements per word.
    pub compound_max_elements: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            case_sensitive: false,
            dictionary_case: false,
            null_flush: false,
            use_ignored_chars: false,
            use_default_ignored_chars: true,
            use_restore_chars: false,
            display_weights: false,
            show_control_symbols: false,
            bilingual_surface_forms: false,
            max_analyses: usize::MAX,
            max_weight_classes: usize::MAX,
            compound_max_elements: 4,
        }
    }
}

pub struct FstProcessor {
    pub settings: Settings,

    pub(crate) alphabet: Alphabet,
    /// Characters the dictionary declares alphabetic.
    pub(crate) letters: BTreeSet<char>,
    /// All sections merged under one epsilon root.
    pub(crate) exe: TransducerExe,
    /// Per-section final states, in container order.
    pub(crate) sections: Vec<(String, HashMap<u64, f64>)>,

    pub(crate) standard: HashMap<u64, f64>,
    pub(crate) inconditional: HashMap<u64, f64>,
    pub(crate) postblank: HashMap<u64, f64>,
    pub(crate) preblank: HashMap<u64, f64>,
    pub(crate) all_finals: HashMap<u64, f64>,

    pub(crate) initial_state: State,
    pub(crate) input_buffer: InputBuffer,
    pub(crate) blankqueue: VecDeque<String>,
    pub(crate) wblankqueue: VecDeque<String>,

    pub(crate) escaped_chars: BTreeSet<char>,
    pub(crate) ignored_chars: BTreeSet<char>,
    pub(crate) rcx_map: HashMap<Symbol, BTreeSet<Symbol>>,

    pub(crate) numbers: Vec<String>,
    pub(crate) out_of_word: bool,
    pub(crate) is_wblank: bool,
    /// Ring positions whose space symbol stands for a word-bound blank.
    pub(crate) wblank_locs: BTreeSet<usize>,
    pub(crate) is_last_blank_tm: bool,
    pub(crate) null_flush_generation: bool,

    pub(crate) do_decomposition: bool,
    pub(crate) compound_only_l: Symbol,
    pub(crate) compound_r: Symbol,

    pub(crate) translit_drop_tilde: bool,
    pub(crate) translit_reread_suffix: bool,
}

impl FstProcessor {
    /// Load a compiled container and merge its sections into one automaton.
    pub fn load<R: Read>(input: &mut R) -> Result<Self, StreamError> {
        let TransducerSet { letters, alphabet, sections } =
            container::read_transducer_set(input)?;
        let (names, exes): (Vec<String>, Vec<TransducerExe>) = sections.into_iter().unzip();
        let (exe, finals) = TransducerExe::merge(&exes);
        let sections: Vec<(String, HashMap<u64, f64>)> =
            names.into_iter().zip(finals).collect();

        let mut initial_state = State::new();
        initial_state.init(&exe, exe.initial);

        Ok(FstProcessor {
            settings: Settings::default(),
            alphabet,
            letters,
            exe,
            sections,
            standard: HashMap::new(),
            inconditional: HashMap::new(),
            postblank: HashMap::new(),
            preblank: HashMap::new(),
            all_finals: HashMap::new(),
            initial_state,
            input_buffer: InputBuffer::default(),
            blankqueue: VecDeque::new(),
            wblankqueue: VecDeque::new(),
            escaped_chars: BTreeSet::from([
                '[', ']', '{', '}', '^', '$', '/', '\\', '@', '<', '>',
            ]),
            ignored_chars: BTreeSet::from(['\u{00AD}']),
            rcx_map: HashMap::new(),
            numbers: Vec::new(),
            out_of_word: false,
            is_wblank: false,
            wblank_locs: BTreeSet::new(),
            is_last_blank_tm: false,
            null_flush_generation: false,
            do_decomposition: false,
            compound_only_l: 0,
            compound_r: 0,
            translit_drop_tilde: false,
            translit_reread_suffix: false,
        })
    }

    /// Characters the processor treats as ignorable (ICX data).
    pub fn set_ignored_chars(&mut self, chars: BTreeSet<char>) {
        self.ignored_chars = chars;
        self.settings.use_ignored_chars = !self.ignored_chars.is_empty();
    }

    /// Diacritic-restoration equivalences (RCX data).
    pub fn set_restore_chars(&mut self, map: HashMap<char, BTreeSet<char>>) {
        self.rcx_map = map
            .into_iter()
            .map(|(c, set)| {
                (
                    c as Symbol,
                    set.into_iter().map(|r| r as Symbol).collect::<BTreeSet<Symbol>>(),
                )
            })
            .collect();
        self.settings.use_restore_chars = !self.rcx_map.is_empty();
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    fn classify_finals(&mut self) -> Result<(), StreamError> {
        self.standard.clear();
        self.inconditional.clear();
        self.postblank.clear();
        self.preblank.clear();
        for (name, finals) in &self.sections {
            let target = if name.ends_with("@inconditional") {
                &mut self.inconditional
            } else if name.ends_with("@standard") {
                &mut self.standard
            } else if name.ends_with("@postblank") {
                &mut self.postblank
            } else if name.ends_with("@preblank") {
                &mut self.preblank
            } else {
                return Err(StreamError::UnsupportedSection(name.clone()));
            };
            target.extend(finals.iter().map(|(&k, &v)| (k, v)));
        }
        Ok(())
    }

    fn merge_all_finals(&mut self) {
        self.all_finals.clear();
        for (_, finals) in &self.sections {
            self.all_finals.extend(finals.iter().map(|(&k, &v)| (k, v)));
        }
    }

    pub fn init_analysis(&mut self) -> Result<(), StreamError> {
        self.classify_finals()?;
        self.merge_all_finals();
        Ok(())
    }

    pub fn init_sao(&mut self) -> Result<(), StreamError> {
        self.init_analysis()
    }

    pub fn init_tm_analysis(&mut self) {
        self.merge_all_finals();
    }

    pub fn init_generation(&mut self) {
        self.settings.use_ignored_chars = false;
        self.merge_all_finals();
    }

    pub fn init_postgeneration(&mut self) {
        self.init_generation();
    }

    pub fn init_biltrans(&mut self) {
        self.init_generation();
    }

    pub fn init_decomposition(&mut self) -> Result<(), StreamError> {
        self.do_decomposition = true;
        self.init_analysis()?;
        self.init_decomposition_symbols();
        Ok(())
    }

    /// Resolve the compound control tags, trying the historical spellings.
    fn init_decomposition_symbols(&mut self) {
        let only_l_names = [
            "<:co:only-L>",
            "<:compound:only-L>",
            "<@co:only-L>",
            "<@compound:only-L>",
            symbol::COMPOUND_ONLY_L,
        ];
        self.compound_only_l = only_l_names
            .iter()
            .find_map(|name| self.alphabet.tag_code_checked(name))
            .unwrap_or(0);
        if self.compound_only_l == 0 {
            log::warn!("decomposition symbol <compound-only-L> not found");
        } else if !self.settings.show_control_symbols {
            self.alphabet.set_symbol(self.compound_only_l, "");
        }

        let compound_r_names = [
            "<:co:R>",
            "<:compound:R>",
            "<@co:R>",
            "<@compound:R>",
            symbol::COMPOUND_R,
        ];
        self.compound_r = compound_r_names
            .iter()
            .find_map(|name| self.alphabet.tag_code_checked(name))
            .unwrap_or(0);
        if self.compound_r == 0 {
            log::warn!("decomposition symbol <compound-R> not found");
        } else if !self.settings.show_control_symbols {
            self.alphabet.set_symbol(self.compound_r, "");
        }
    }

    /// Dictionary sanity checks: the initial state must not be final, and no
    /// entry may begin with whitespace.
    pub fn valid(&self) -> bool {
        if self.initial_state.is_final(&self.all_finals) {
            log::error!("invalid dictionary: the left side of an entry is empty");
            return false;
        }
        let mut probe = self.initial_state.clone();
        probe.step(&self.exe, ' ' as Symbol);
        if probe.is_alive() {
            log::error!("invalid dictionary: an entry begins with whitespace");
            return false;
        }
        true
    }

    // ----- character classification -------------------------------------

    pub(crate) fn is_escaped(&self, c: char) -> bool {
        self.escaped_chars.contains(&c)
    }

    pub(crate) fn is_alphabetic(&self, sym: Symbol) -> bool {
        match symbol::to_char(sym) {
            Some(c) => c.is_alphanumeric() || self.letters.contains(&c),
            None => false,
        }
    }

    fn is_ignored(&self, sym: Symbol) -> bool {
        if !(self.settings.use_ignored_chars || self.settings.use_default_ignored_chars) {
            return false;
        }
        symbol::to_char(sym).is_some_and(|c| self.ignored_chars.contains(&c))
    }

    // ----- stream readers -----------------------------------------------

    /// One symbol of raw text in analysis position: tags collapse to their
    /// codes, blanks go to the queue as a single space, escapes are
    /// unwrapped.
    pub(crate) fn read_analysis<R: Read>(
        &mut self,
        input: &mut InputText<R>,
    ) -> Result<Symbol, StreamError> {
        if !self.input_buffer.is_empty() {
            let mut val = self.input_buffer.next();
            while self.is_ignored(val) {
                val = self.input_buffer.next();
            }
            return Ok(val);
        }

        let mut val = match input.get()? {
            None => {
                self.input_buffer.add(0);
                return Ok(0);
            }
            Some('\0') => {
                self.input_buffer.add(0);
                return Ok(0);
            }
            Some(c) => c,
        };

        while self.is_ignored(val as Symbol) {
            self.input_buffer.add(val as Symbol);
            val = match input.get()? {
                None | Some('\0') => {
                    self.input_buffer.add(0);
                    return Ok(0);
                }
                Some(c) => c,
            };
        }

        if self.is_escaped(val) {
            match val {
                '<' => {
                    let block = input.read_block('<', '>')?;
                    let tag = self.alphabet.tag_code(&block);
                    self.input_buffer.add(tag);
                    return Ok(tag);
                }
                '[' => {
                    if input.peek()? == Some('[') {
                        input.get()?;
                        let wblank = input.finish_wblank()?;
                        self.blankqueue.push_back(wblank);
                    } else {
                        let blank = input.read_block('[', ']')?;
                        self.blankqueue.push_back(blank);
                    }
                    self.input_buffer.add(' ' as Symbol);
                    return Ok(' ' as Symbol);
                }
                '\\' => {
                    let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
                    self.input_buffer.add(escaped as Symbol);
                    return Ok(escaped as Symbol);
                }
                _ => return Err(StreamError::MalformedStream),
            }
        }

        if val == ' ' {
            self.blankqueue.push_back(" ".to_string());
        }
        self.input_buffer.add(val as Symbol);
        Ok(val as Symbol)
    }

    /// Copy text through until `target`, honouring escapes and flush
    /// markers.
    pub(crate) fn skip_until<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        target: char,
    ) -> Result<(), StreamError> {
        loop {
            let Some(val) = input.get()? else { return Ok(()) };
            match val {
                '\\' => {
                    let Some(escaped) = input.get()? else { return Ok(()) };
                    write_char(output, '\\')?;
                    write_char(output, escaped)?;
                }
                '\0' => {
                    write_char(output, val)?;
                    if self.null_flush_generation {
                        output.flush()?;
                    }
                }
                _ if val == target => return Ok(()),
                _ => write_char(output, val)?,
            }
        }
    }

    // ----- printing helpers ---------------------------------------------

    pub(crate) fn write_char_escaped(
        &self,
        val: char,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        if val != '\0' {
            if self.is_escaped(val) {
                write_char(output, '\\')?;
            }
            write_char(output, val)?;
        }
        Ok(())
    }

    pub(crate) fn write_escaped(
        &self,
        text: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        for c in text.chars() {
            self.write_char_escaped(c, output)?;
        }
        Ok(())
    }

    /// Write `text` escaping characters; every space printed may pop one
    /// queued single-space blank. Returns how many non-trivial blanks are
    /// still owed after the word.
    pub(crate) fn write_escaped_pop_blanks(
        &mut self,
        text: &str,
        output: &mut dyn Write,
    ) -> Result<usize, StreamError> {
        let mut postpop = 0;
        for c in text.chars() {
            self.write_char_escaped(c, output)?;
            if c == ' ' {
                if self.blankqueue.front().map(String::as_str) == Some(" ") {
                    self.blankqueue.pop_front();
                } else {
                    postpop += 1;
                }
            }
        }
        Ok(postpop)
    }

    /// Write escaping characters until the first tag, which is emitted raw
    /// together with everything after it.
    pub(crate) fn write_escaped_with_tags(
        &self,
        text: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        let chars: Vec<char> = text.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if c == '<' && i >= 1 && chars[i - 1] != '\\' {
                let rest: String = chars[i..].iter().collect();
                output.write_all(rest.as_bytes())?;
                return Ok(());
            }
            self.write_char_escaped(c, output)?;
        }
        Ok(())
    }

    pub(crate) fn print_word(
        &self,
        surface: &str,
        lexical: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        write_char(output, '^')?;
        self.write_escaped(surface, output)?;
        output.write_all(lexical.as_bytes())?;
        write_char(output, '$')?;
        Ok(())
    }

    pub(crate) fn print_word_pop_blank(
        &mut self,
        surface: &str,
        lexical: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        write_char(output, '^')?;
        let mut postpop = self.write_escaped_pop_blanks(surface, output)?;
        output.write_all(lexical.as_bytes())?;
        write_char(output, '$')?;
        while postpop > 0 {
            let Some(blank) = self.blankqueue.pop_front() else { break };
            output.write_all(blank.as_bytes())?;
            postpop -= 1;
        }
        Ok(())
    }

    pub(crate) fn print_word_bilingual(
        &self,
        surface: &str,
        lexical: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        write_char(output, '^')?;
        output.write_all(surface.as_bytes())?;
        output.write_all(lexical.as_bytes())?;
        write_char(output, '$')?;
        Ok(())
    }

    pub(crate) fn print_unknown_word(
        &self,
        surface: &str,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        write_char(output, '^')?;
        self.write_escaped(surface, output)?;
        write_char(output, '/')?;
        write_char(output, '*')?;
        self.write_escaped(surface, output)?;
        write_char(output, '$')?;
        Ok(())
    }

    /// Print one blank from the queue if any, otherwise the given space.
    pub(crate) fn print_space(
        &mut self,
        val: char,
        output: &mut dyn Write,
        flush: bool,
    ) -> Result<(), StreamError> {
        if self.blankqueue.is_empty() {
            write_char(output, val)?;
        } else if flush {
            self.flush_blanks(output)?;
        } else if let Some(blank) = self.blankqueue.pop_front() {
            output.write_all(blank.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn print_char(
        &mut self,
        val: char,
        output: &mut dyn Write,
        flush: bool,
    ) -> Result<(), StreamError> {
        if val.is_whitespace() {
            self.print_space(val, output, flush)
        } else {
            self.write_char_escaped(val, output)
        }
    }

    pub(crate) fn flush_blanks(&mut self, output: &mut dyn Write) -> Result<(), StreamError> {
        while let Some(blank) = self.blankqueue.pop_front() {
            output.write_all(blank.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn flush_wblanks(&mut self, output: &mut dyn Write) -> Result<(), StreamError> {
        while let Some(wblank) = self.wblankqueue.pop_front() {
            output.write_all(wblank.as_bytes())?;
        }
        Ok(())
    }

    // ----- word-level helpers -------------------------------------------

    /// Char position of the last character that is not a dictionary
    /// letter, or 0.
    pub(crate) fn last_blank(&self, text: &str) -> usize {
        let chars: Vec<char> = text.chars().collect();
        for i in (0..chars.len()).rev() {
            if !self.letters.contains(&chars[i]) {
                return i;
            }
        }
        0
    }

    /// Char position of the first non-alphabetic character.
    pub(crate) fn first_not_alpha(&self, text: &str) -> Option<usize> {
        for (i, c) in text.chars().enumerate() {
            if !(c.is_alphanumeric() || self.letters.contains(&c)) {
                return Some(i);
            }
        }
        None
    }

    /// Weight-ranked readings of `state`, with surface case restored from
    /// `casefrom`.
    pub(crate) fn filter_finals_for(&self, state: &State, casefrom: &str) -> String {
        let pattern = if self.settings.dictionary_case {
            CasePattern::default()
        } else {
            case::surface_case(casefrom)
        };
        state.filter_finals(
            &self.all_finals,
            &self.alphabet,
            &self.escaped_chars,
            self.settings.display_weights,
            self.settings.max_analyses,
            self.settings.max_weight_classes,
            pattern.uppercase,
            pattern.firstupper,
            0,
        )
    }

    /// Everything before the first unescaped tag.
    pub(crate) fn remove_tags(text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        for i in 0..chars.len() {
            if chars[i] == '<' && i >= 1 && chars[i - 1] != '\\' {
                return chars[..i].iter().collect();
            }
        }
        text.to_string()
    }

    /// Try to read `word` as a compound of dictionary entries.
    ///
    /// Returns the readings string, or empty when the word does not
    /// decompose within the configured limits.
    pub(crate) fn compound_analysis(&self, word: &str) -> String {
        const MAX_COMBINATIONS: usize = 32767;

        let mut state = self.initial_state.clone();
        let chars: Vec<char> = word.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            state.step_case(&self.exe, c as Symbol, self.settings.case_sensitive);

            if state.size() > MAX_COMBINATIONS {
                log::warn!(
                    "compound search space exceeded for '{word}'; gave up at character {i}"
                );
                return String::new();
            }

            if i + 1 < chars.len() {
                state.restart_finals(
                    &self.exe,
                    &self.all_finals,
                    self.compound_only_l,
                    self.exe.initial,
                    '+' as Symbol,
                );
            }
            if !state.is_alive() {
                return String::new();
            }
        }

        state.prune_compounds(
            self.compound_r,
            '+' as Symbol,
            self.settings.compound_max_elements,
        );
        self.filter_finals_for(&state, word)
    }
}

/// Write one character to a byte stream.
pub(crate) fn write_char(output: &mut dyn Write, c: char) -> std::io::Result<()> {
    let mut buf = [0u8; 4];
    output.write_all(c.encode_utf8(&mut buf).as_bytes())
}

/// First `n` chars of `text`.
pub(crate) fn prefix_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Number of chars in `text`.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_tags_stops_at_first_tag() {
        assert_eq!(FstProcessor::remove_tags("house<n><pl>"), "house");
        assert_eq!(FstProcessor::remove_tags("house"), "house");
        assert_eq!(FstProcessor::remove_tags("a\\<b<n>"), "a\\<b");
    }

    #[test]
    fn prefix_and_len_are_char_based() {
        assert_eq!(prefix_chars("ñandú", 3), "ñan");
        assert_eq!(char_len("ñandú"), 5);
    }
}
