// Analysis mode: raw text in, `^surface/reading1/reading2$` out.

use crate::input::InputText;
use crate::processor::{char_len, prefix_chars, write_char, FstProcessor};
use crate::StreamError;
use ltk_core::symbol::{self, Symbol};
use std::io::{Read, Write};

fn sym_is_space(sym: Symbol) -> bool {
    symbol::to_char(sym).is_some_and(char::is_whitespace)
}

impl FstProcessor {
    /// Run analysis over the whole stream.
    pub fn analysis<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        if self.settings.null_flush {
            while !input.eof()? {
                self.analysis_inner(input, output)?;
                write_char(output, '\0')?;
                output.flush()?;
                // the inner loop does not always drain the ring; do it
                // here so the next document starts clean
                while !self.input_buffer.is_empty() {
                    self.input_buffer.next();
                }
            }
            return Ok(());
        }
        self.analysis_inner(input, output)
    }

    fn analysis_inner<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        let mut last_incond = false;
        let mut last_postblank = false;
        let mut last_preblank = false;
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new(); // lexical forms of the last match
        let mut sf = String::new(); // surface form read so far
        let mut lf_spcmp: String; // blank-crossing compound reading
        let mut seen_compound_l = false;
        let mut last = 0usize; // ring position after the last match
        let mut last_size = 0usize; // chars of sf at the last match

        loop {
            let mut val = self.read_analysis(input)?;

            if current_state.is_final(&self.all_finals) {
                if current_state.is_final(&self.inconditional) {
                    if self.do_decomposition && self.compound_only_l != 0 {
                        current_state
                            .prune_states_with_forbidden_symbol(self.compound_only_l);
                    }
                    lf = self.filter_finals_for(&current_state, &sf);
                    last_incond = true;
                    last = self.input_buffer.pos();
                    last_size = char_len(&sf);
                } else if current_state.is_final(&self.postblank) {
                    if self.do_decomposition && self.compound_only_l != 0 {
                        current_state
                            .prune_states_with_forbidden_symbol(self.compound_only_l);
                    }
                    lf = self.filter_finals_for(&current_state, &sf);
                    last_postblank = true;
                    last = self.input_buffer.pos();
                    last_size = char_len(&sf);
                } else if current_state.is_final(&self.preblank) {
                    if self.do_decomposition && self.compound_only_l != 0 {
                        current_state
                            .prune_states_with_forbidden_symbol(self.compound_only_l);
                    }
                    lf = self.filter_finals_for(&current_state, &sf);
                    last_preblank = true;
                    last = self.input_buffer.pos();
                    last_size = char_len(&sf);
                } else if !self.is_alphabetic(val) {
                    if self.do_decomposition && self.compound_only_l != 0 {
                        current_state
                            .prune_states_with_forbidden_symbol(self.compound_only_l);
                    }
                    lf = self.filter_finals_for(&current_state, &sf);
                    last_postblank = false;
                    last_preblank = false;
                    last_incond = false;
                    last = self.input_buffer.pos();
                    last_size = char_len(&sf);
                } else if self.do_decomposition
                    && self.compound_only_l != 0
                    && current_state.has_symbol(self.compound_only_l)
                {
                    // a compound head may continue past a blank
                    seen_compound_l = true;
                }
            } else if sf.is_empty() && sym_is_space(val) {
                lf = format!("/*{sf}");
                last_postblank = false;
                last_preblank = false;
                last_incond = false;
                last = self.input_buffer.pos();
                last_size = char_len(&sf);
            }

            if self.settings.use_restore_chars && self.rcx_map.contains_key(&val) {
                let mut alts = self.rcx_map[&val].clone();
                if ltk_core::case::symbol_is_upper(val) && !self.settings.case_sensitive {
                    let lower = ltk_core::case::lower_symbol(val);
                    alts.insert(lower);
                    if let Some(extra) = self.rcx_map.get(&lower) {
                        alts.extend(extra.iter().copied());
                    }
                }
                current_state.step_alts(&self.exe, val, &alts);
            } else {
                current_state.step_case(&self.exe, val, self.settings.case_sensitive);
            }

            if current_state.is_alive() {
                if val != 0 {
                    self.alphabet.get_symbol(&mut sf, val, false);
                }
            } else {
                // try a blank-crossing compound before falling back
                lf_spcmp = String::new();
                if seen_compound_l
                    && self.is_alphabetic(val)
                    && !sf.is_empty()
                    && last_size <= self.last_blank(&sf)
                {
                    let old_val = val;
                    let old_sf = sf.clone();
                    loop {
                        self.alphabet.get_symbol(&mut sf, val, false);
                        val = self.read_analysis(input)?;
                        if val == 0 || !self.is_alphabetic(val) {
                            break;
                        }
                    }
                    lf_spcmp = self.compound_analysis(&sf);
                    if lf_spcmp.is_empty() {
                        // no luck, rewind
                        self.input_buffer.back(char_len(&sf) - char_len(&old_sf));
                        val = old_val;
                        sf = old_sf;
                    } else {
                        self.input_buffer.back(1);
                        val = self.input_buffer.peek();
                    }
                }
                seen_compound_l = false;

                if !lf_spcmp.is_empty() {
                    let surface = sf.clone();
                    self.print_word_pop_blank(&surface, &lf_spcmp, output)?;
                } else if !self.is_alphabetic(val) && sf.is_empty() {
                    if let Some(c) = symbol::to_char(val) {
                        self.print_char(c, output, false)?;
                    }
                } else if last_postblank {
                    let surface = prefix_chars(&sf, last_size);
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    write_char(output, ' ')?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if last_preblank {
                    write_char(output, ' ')?;
                    let surface = prefix_chars(&sf, last_size);
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if last_incond {
                    let surface = prefix_chars(&sf, last_size);
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if self.is_alphabetic(val)
                    && (last_size > self.last_blank(&sf) || lf.is_empty())
                {
                    // unknown word: swallow the rest of the alphabetic run
                    loop {
                        self.alphabet.get_symbol(&mut sf, val, false);
                        val = self.read_analysis(input)?;
                        if val == 0 || !self.is_alphabetic(val) {
                            break;
                        }
                    }
                    self.print_unknown_run(&sf, output)?;
                } else if lf.is_empty() {
                    self.print_unknown_run(&sf, output)?;
                } else {
                    let surface = prefix_chars(&sf, last_size);
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                }

                if val == 0 && !self.input_buffer.is_empty() {
                    self.input_buffer.set_pos(last + 1);
                }

                current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
                last_incond = false;
                last_postblank = false;
                last_preblank = false;
            }

            if val == 0 {
                break;
            }
        }

        self.flush_blanks(output)
    }

    /// Emit the leading alphabetic run of `sf` as an unknown word (or a
    /// compound reading when decomposition is on), rewinding the ring past
    /// whatever was read beyond it.
    fn print_unknown_run(&mut self, sf: &str, output: &mut dyn Write) -> Result<(), StreamError> {
        let size = char_len(sf);
        let limit = self.first_not_alpha(sf).unwrap_or(size);
        if limit == 0 {
            self.input_buffer.back(size);
            let head = prefix_chars(sf, 1);
            self.write_escaped(&head, output)?;
        } else {
            self.input_buffer.back(1 + (size - limit));
            let unknown_word = prefix_chars(sf, limit);
            if self.do_decomposition {
                let compound = self.compound_analysis(&unknown_word);
                if !compound.is_empty() {
                    return self.print_word(&unknown_word, &compound, output);
                }
            }
            self.print_unknown_word(&unknown_word, output)?;
        }
        Ok(())
    }
}
