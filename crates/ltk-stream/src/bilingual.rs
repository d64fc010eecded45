// Bilingual mode: `^surface/analysis$` in, `^surface/translation$` out.
//
// Tags seen after a successful partial match are queued rather than stepped
// and spliced into the first `/` position of every translation at the end
// of the lexical unit.

use crate::input::InputText;
use crate::processor::{write_char, FstProcessor, GenerationMode};
use crate::StreamError;
use ltk_core::case::{self, lexical_case};
use ltk_core::symbol::{self, Symbol};
use std::io::{Read, Write};

impl FstProcessor {
    /// One symbol of an LU in bilingual position. Returns the textual form
    /// of an unknown tag together with its (epsilon) code; `None` code is
    /// end of stream.
    pub(crate) fn read_bilingual<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(String, Option<Symbol>), StreamError> {
        loop {
            let Some(mut val) = input.get()? else { return Ok((String::new(), None)) };

            if self.out_of_word {
                if val == '^' {
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok((String::new(), None)),
                    };
                } else if val == '\\' {
                    write_char(output, val)?;
                    let Some(escaped) = input.get()? else {
                        return Ok((String::new(), None));
                    };
                    write_char(output, escaped)?;
                    self.skip_until(input, output, '^')?;
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok((String::new(), None)),
                    };
                } else {
                    write_char(output, val)?;
                    self.skip_until(input, output, '^')?;
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok((String::new(), None)),
                    };
                }
                self.out_of_word = false;
            }

            match val {
                '\\' => {
                    let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
                    return Ok((String::new(), Some(escaped as Symbol)));
                }
                '$' => {
                    self.out_of_word = true;
                    return Ok((String::new(), Some('$' as Symbol)));
                }
                '<' => {
                    let block = input.read_block('<', '>')?;
                    let code = self.alphabet.tag_code(&block);
                    if code == 0 {
                        // unknown tag: pass its text through
                        return Ok((block, Some(0)));
                    }
                    return Ok((String::new(), Some(code)));
                }
                '[' => {
                    if input.peek()? == Some('[') {
                        input.get()?;
                        let wblank = input.finish_wblank()?;
                        output.write_all(wblank.as_bytes())?;
                    } else {
                        let blank = input.read_block('[', ']')?;
                        output.write_all(blank.as_bytes())?;
                    }
                }
                _ => return Ok((String::new(), Some(val as Symbol))),
            }
        }
    }

    /// Splice `queue` into the first `/` position of each reading.
    pub(crate) fn compose_queue(lexforms: &str, queue: &str) -> String {
        let mut result = String::with_capacity(lexforms.len() + 2 * queue.len());
        result.push('/');
        let chars: Vec<char> = lexforms.chars().collect();
        let mut i = 1;
        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    result.push('\\');
                    i += 1;
                    if i < chars.len() {
                        result.push(chars[i]);
                    }
                }
                '/' => {
                    result.push_str(queue);
                    result.push('/');
                }
                c => result.push(c),
            }
            i += 1;
        }
        result.push_str(queue);
        result
    }

    /// Run bilingual lookup over the whole stream.
    pub fn bilingual<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        mode: GenerationMode,
    ) -> Result<(), StreamError> {
        if self.settings.null_flush {
            self.null_flush_generation = true;
            while !input.eof()? {
                self.bilingual_inner(input, output, mode)?;
                write_char(output, '\0')?;
                output.flush()?;
            }
            return Ok(());
        }
        self.bilingual_inner(input, output, mode)
    }

    fn bilingual_inner<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        mode: GenerationMode,
    ) -> Result<(), StreamError> {
        let mut current_state = self.initial_state.clone();
        let mut sf = String::new(); // source-language analysis
        let mut queue = String::new(); // unmatched trailing tags
        let mut result = String::new(); // bidix lookup result
        let mut seen_tags = false;
        let mut seen_surface = false;
        let mut surface = String::new();

        self.out_of_word = false;
        self.skip_until(input, output, '^')?;

        loop {
            let (mut tag_text, mut maybe_val) = self.read_bilingual(input, output)?;

            if self.settings.bilingual_surface_forms && !seen_surface && !self.out_of_word {
                // strip `surface/` up to the first slash
                while let Some(val) = maybe_val {
                    if val == '/' as Symbol {
                        break;
                    }
                    surface.push_str(&tag_text);
                    self.alphabet.get_symbol(&mut surface, val, false);
                    (tag_text, maybe_val) = self.read_bilingual(input, output)?;
                }
                if maybe_val.is_none() {
                    break;
                }
                seen_surface = true;
                (tag_text, maybe_val) = self.read_bilingual(input, output)?;
            }

            let Some(val) = maybe_val else { break };

            if val == '$' as Symbol && self.out_of_word {
                if !seen_tags {
                    // no tags at all: only a complete match counts
                    let pattern = lexical_case(&sf);
                    result = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        self.settings.display_weights,
                        self.settings.max_analyses,
                        self.settings.max_weight_classes,
                        pattern.uppercase,
                        pattern.firstupper,
                        0,
                    );
                }

                if sf.starts_with('*') {
                    if mode == GenerationMode::Clean {
                        let stripped: String = sf.chars().skip(1).collect();
                        self.print_word_bilingual(&sf, &format!("/{stripped}"), output)?;
                    } else {
                        self.print_word_bilingual(&sf, &format!("/{sf}"), output)?;
                    }
                } else if !result.is_empty() {
                    let spliced = Self::compose_queue(&result, &queue);
                    self.print_word_bilingual(&sf, &spliced, output)?;
                } else {
                    let prefix = if mode == GenerationMode::All { "/#" } else { "/@" };
                    if self.settings.bilingual_surface_forms {
                        let lexical = format!("{prefix}{surface}");
                        self.print_word_bilingual(&surface, &lexical, output)?;
                    } else {
                        let lexical = format!("{prefix}{sf}");
                        self.print_word_bilingual(&sf, &lexical, output)?;
                    }
                }

                seen_surface = false;
                surface.clear();
                queue.clear();
                result.clear();
                current_state = self.initial_state.clone();
                sf.clear();
                seen_tags = false;
            } else if sym_is_space(val) && sf.is_empty() {
                // stray blank
            } else if sf.starts_with('*') {
                if val > 0 && self.is_escaped(symbol::to_char(val).unwrap_or('\0')) {
                    sf.push('\\');
                }
                self.alphabet.get_symbol(&mut sf, val, false);
                if val == 0 {
                    sf.push_str(&tag_text);
                }
            } else {
                if val > 0 && self.is_escaped(symbol::to_char(val).unwrap_or('\0')) {
                    sf.push('\\');
                }
                self.alphabet.get_symbol(&mut sf, val, false);
                if val == 0 {
                    sf.push_str(&tag_text);
                }
                if self.alphabet.is_tag(val) || val == 0 {
                    seen_tags = true;
                }
                if current_state.is_alive() {
                    current_state.step_case(&self.exe, val, self.settings.case_sensitive);
                }
                if current_state.is_final(&self.all_finals) {
                    let pattern = lexical_case(&sf);
                    queue.clear(); // the intervening tags were matched
                    result = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        self.settings.display_weights,
                        self.settings.max_analyses,
                        self.settings.max_weight_classes,
                        pattern.uppercase,
                        pattern.firstupper,
                        0,
                    );
                } else if !result.is_empty() {
                    // a result exists but the analysis goes on; queue the
                    // following tags to re-attach on output
                    if self.alphabet.is_tag(val) {
                        self.alphabet.get_symbol(&mut queue, val, false);
                    } else if val == 0 {
                        queue.push_str(&tag_text);
                    } else if !current_state.is_alive() {
                        // a non-tag after the match: unknown word
                        result.clear();
                    }
                }
            }
        }
        Ok(())
    }

    /// Translate one `^...$`-delimited lexical unit given as a string.
    pub fn biltrans(&self, input_word: &str, with_delim: bool) -> String {
        self.biltrans_with_queue(input_word, with_delim).0
    }

    /// Like [`FstProcessor::biltrans`], also returning the length of the
    /// unmatched tag queue.
    pub fn biltrans_with_queue(&self, input_word: &str, with_delim: bool) -> (String, usize) {
        let chars: Vec<char> = input_word.chars().collect();
        let mut start_point = 1;
        let mut end_point = chars.len().saturating_sub(2);
        if !with_delim {
            start_point = 0;
            end_point = chars.len().saturating_sub(1);
        }
        if chars.is_empty() || start_point >= chars.len() {
            return (input_word.to_string(), 0);
        }

        if chars[start_point] == '*' {
            return (input_word.to_string(), 0);
        }
        let mut mark = false;
        if chars[start_point] == '=' {
            start_point += 1;
            mark = true;
        }

        let firstupper = chars.get(start_point).copied().is_some_and(case::is_upper);
        let uppercase =
            firstupper && chars.get(start_point + 1).copied().is_some_and(case::is_upper);

        let mut current_state = self.initial_state.clone();
        let mut result = String::new();
        let mut queue = String::new();
        let mut seen_tags = false;

        let mut i = start_point;
        while i <= end_point && i < chars.len() {
            let mut tag_text = String::new();
            let val: Symbol;
            if chars[i] == '\\' {
                i += 1;
                val = chars.get(i).copied().unwrap_or('\0') as Symbol;
            } else if chars[i] == '<' {
                seen_tags = true;
                let mut tag = String::from('<');
                let mut j = i + 1;
                while j <= end_point {
                    tag.push(chars[j]);
                    if chars[j] == '>' {
                        i = j;
                        break;
                    }
                    j += 1;
                }
                val = self.alphabet.tag_code(&tag);
                tag_text = tag;
            } else {
                val = chars[i] as Symbol;
            }

            if current_state.is_alive() {
                if !self.alphabet.is_tag(val)
                    && case::symbol_is_upper(val)
                    && !self.settings.case_sensitive
                {
                    current_state.step_alt(&self.exe, val, case::lower_symbol(val));
                } else {
                    current_state.step(&self.exe, val);
                }
            }
            if current_state.is_final(&self.all_finals) {
                result.clear();
                if with_delim {
                    result.push('^');
                }
                if mark {
                    result.push('=');
                }
                let readings = current_state.filter_finals(
                    &self.all_finals,
                    &self.alphabet,
                    &self.escaped_chars,
                    self.settings.display_weights,
                    self.settings.max_analyses,
                    self.settings.max_weight_classes,
                    uppercase,
                    firstupper,
                    0,
                );
                result.push_str(&readings[1..]);
            }

            if !current_state.is_alive() {
                if !tag_text.is_empty() && !result.is_empty() {
                    queue.push_str(&tag_text);
                } else {
                    // word not present
                    let missing = if with_delim {
                        format!("^@{}", &input_word[1..])
                    } else {
                        format!("@{input_word}")
                    };
                    return (missing, 0);
                }
            }
            i += 1;
        }

        if !seen_tags
            && current_state
                .filter_finals(
                    &self.all_finals,
                    &self.alphabet,
                    &self.escaped_chars,
                    self.settings.display_weights,
                    self.settings.max_analyses,
                    self.settings.max_weight_classes,
                    uppercase,
                    firstupper,
                    0,
                )
                .is_empty()
        {
            let missing = if with_delim {
                format!("^@{}", &input_word[1..])
            } else {
                format!("@{input_word}")
            };
            return (missing, 0);
        }

        if !queue.is_empty() {
            let mut with_queue = Self::compose_queue(&format!("/{}", &result), &queue);
            with_queue.remove(0);
            let mut full = with_queue;
            if with_delim {
                full.push('$');
            }
            (full, queue.chars().count())
        } else {
            let mut full = result;
            if with_delim {
                full.push('$');
            }
            (full, 0)
        }
    }
}

fn sym_is_space(sym: Symbol) -> bool {
    symbol::to_char(sym).is_some_and(char::is_whitespace)
}
