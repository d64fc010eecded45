// SAO mode: analysis with SGML-oriented output. Unknown words come out
// wrapped in `<d>...</d>` and tags are rendered as entities.

use crate::input::InputText;
use crate::processor::{char_len, write_char, FstProcessor};
use crate::state::State;
use crate::StreamError;
use ltk_core::case::surface_case;
use ltk_core::symbol::{self, Symbol};
use std::collections::BTreeSet;
use std::io::{Read, Write};

fn sym_is_space(sym: Symbol) -> bool {
    symbol::to_char(sym).is_some_and(char::is_whitespace)
}

impl FstProcessor {
    pub(crate) fn read_sao<R: Read>(
        &mut self,
        input: &mut InputText<R>,
    ) -> Result<Symbol, StreamError> {
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        let Some(val) = input.get()? else { return Ok(0) };

        if self.is_escaped(val) {
            if val == '<' {
                let mut block = input.read_block('<', '>')?;
                if block.starts_with("<![CDATA[") {
                    while !block.ends_with("]]>") {
                        let more = input.read_block('<', '>')?;
                        block.push_str(&more[1..]);
                    }
                    self.blankqueue.push_back(block);
                    self.input_buffer.add(' ' as Symbol);
                    return Ok(' ' as Symbol);
                }
                return Err(StreamError::MalformedStream);
            } else if val == '\\' {
                let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
                if !self.is_escaped(escaped) {
                    return Err(StreamError::MalformedStream);
                }
                self.input_buffer.add(escaped as Symbol);
                return Ok(escaped as Symbol);
            }
            return Err(StreamError::MalformedStream);
        }

        self.input_buffer.add(val as Symbol);
        Ok(val as Symbol)
    }

    fn print_sao_word(&self, lf: &str, output: &mut dyn Write) -> Result<(), StreamError> {
        for c in lf.chars().skip(1) {
            if c == '/' {
                break;
            }
            write_char(output, c)?;
        }
        Ok(())
    }

    fn filter_finals_sao_for(&self, state: &State, casefrom: &str) -> String {
        let pattern = surface_case(casefrom);
        state.filter_finals_sao(
            &self.all_finals,
            &self.alphabet,
            &self.escaped_chars,
            pattern.uppercase,
            pattern.firstupper,
        )
    }

    /// Run SAO-style analysis over the whole stream.
    pub fn sao<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        let mut last_incond = false;
        let mut last_postblank = false;
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last = 0usize;

        let saved_escapes = std::mem::replace(
            &mut self.escaped_chars,
            BTreeSet::from(['\\', '<', '>']),
        );

        let result = self.sao_inner(
            input,
            output,
            &mut current_state,
            &mut lf,
            &mut sf,
            &mut last,
            &mut last_incond,
            &mut last_postblank,
        );
        self.escaped_chars = saved_escapes;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn sao_inner<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        current_state: &mut State,
        lf: &mut String,
        sf: &mut String,
        last: &mut usize,
        last_incond: &mut bool,
        last_postblank: &mut bool,
    ) -> Result<(), StreamError> {
        loop {
            let mut val = self.read_sao(input)?;
            if val == 0 {
                break;
            }

            if current_state.is_final(&self.all_finals) {
                if current_state.is_final(&self.inconditional) {
                    *lf = self.filter_finals_sao_for(current_state, sf);
                    *last_incond = true;
                    *last = self.input_buffer.pos();
                } else if current_state.is_final(&self.postblank) {
                    *lf = self.filter_finals_sao_for(current_state, sf);
                    *last_postblank = true;
                    *last = self.input_buffer.pos();
                } else if !self.is_alphabetic(val) {
                    *lf = self.filter_finals_sao_for(current_state, sf);
                    *last_postblank = false;
                    *last_incond = false;
                    *last = self.input_buffer.pos();
                }
            } else if sf.is_empty() && sym_is_space(val) {
                *lf = format!("/*{sf}");
                *last_postblank = false;
                *last_incond = false;
                *last = self.input_buffer.pos();
            }

            current_state.step_case(&self.exe, val, self.settings.case_sensitive);

            if current_state.is_alive() {
                self.alphabet.get_symbol(sf, val, false);
            } else {
                if !self.is_alphabetic(val) && sf.is_empty() {
                    if let Some(c) = symbol::to_char(val) {
                        self.print_char(c, output, true)?;
                    }
                } else if *last_incond {
                    self.print_sao_word(lf, output)?;
                    self.input_buffer.set_pos(*last);
                    self.input_buffer.back(1);
                } else if *last_postblank {
                    self.print_sao_word(lf, output)?;
                    write_char(output, ' ')?;
                    self.input_buffer.set_pos(*last);
                    self.input_buffer.back(1);
                } else if self.is_alphabetic(val)
                    && (char_len(sf).wrapping_sub(self.input_buffer.diff_prev_pos(*last))
                        > self.last_blank(sf)
                        || lf.is_empty())
                {
                    loop {
                        self.alphabet.get_symbol(sf, val, false);
                        val = self.read_sao(input)?;
                        if val == 0 || !self.is_alphabetic(val) {
                            break;
                        }
                    }
                    self.print_sao_unknown(sf, output)?;
                } else if lf.is_empty() {
                    self.print_sao_unknown(sf, output)?;
                } else {
                    self.print_sao_word(lf, output)?;
                    self.input_buffer.set_pos(*last);
                    self.input_buffer.back(1);
                }

                *current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
                *last_incond = false;
                *last_postblank = false;
            }
        }

        self.flush_blanks(output)
    }

    fn print_sao_unknown(&mut self, sf: &str, output: &mut dyn Write) -> Result<(), StreamError> {
        let size = char_len(sf);
        let limit = self.first_not_alpha(sf).unwrap_or(size);
        self.input_buffer.back(1 + (size - limit));
        output.write_all(b"<d>")?;
        output.write_all(sf.as_bytes())?;
        output.write_all(b"</d>")?;
        Ok(())
    }
}
