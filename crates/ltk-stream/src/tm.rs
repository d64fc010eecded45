// Translation-memory lookup: longest-match over the stream with number
// literals generalized to a `<n>` tag and restored on output.

use crate::input::InputText;
use crate::processor::{char_len, FstProcessor};
use crate::StreamError;
use ltk_core::symbol::{self, Symbol};
use std::io::{Read, Write};

fn sym_is_space(sym: Symbol) -> bool {
    symbol::to_char(sym).is_some_and(char::is_whitespace)
}

fn sym_is_punct(sym: Symbol) -> bool {
    match symbol::to_char(sym) {
        Some(c) => {
            c.is_ascii_punctuation()
                || matches!(
                    c,
                    '¡' | '¿' | '«' | '»' | '“' | '”' | '‘' | '’' | '…' | '–' | '—'
                )
        }
        None => false,
    }
}

impl FstProcessor {
    /// One symbol in translation-memory position: digit runs collapse to
    /// the number tag and are remembered verbatim.
    pub(crate) fn read_tm_analysis<R: Read>(
        &mut self,
        input: &mut InputText<R>,
    ) -> Result<Symbol, StreamError> {
        self.is_last_blank_tm = false;
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        let Some(val) = input.get()? else { return Ok(0) };

        if self.is_escaped(val) || val.is_ascii_digit() {
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
                    self.is_last_blank_tm = true;
                    return Ok(' ' as Symbol);
                }
                '\\' => {
                    let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
                    self.input_buffer.add(escaped as Symbol);
                    return Ok(escaped as Symbol);
                }
                '0'..='9' => {
                    let mut literal = String::new();
                    literal.push(val);
                    loop {
                        match input.get()? {
                            Some(c) if c.is_ascii_digit() => literal.push(c),
                            Some(c) => {
                                input.unget(c);
                                break;
                            }
                            None => break,
                        }
                    }
                    let tag = self.alphabet.tag_code(symbol::NUMBER_TAG);
                    self.input_buffer.add(tag);
                    self.numbers.push(literal);
                    return Ok(tag);
                }
                _ => return Err(StreamError::MalformedStream),
            }
        }

        self.input_buffer.add(val as Symbol);
        Ok(val as Symbol)
    }

    fn append_tm_symbol(&self, sf: &mut String, val: Symbol) {
        let number_tag = self.alphabet.tag_code(symbol::NUMBER_TAG);
        if val == number_tag && number_tag != 0 && !self.numbers.is_empty() {
            sf.push_str(&self.numbers[self.numbers.len() - 1]);
        } else if self.is_last_blank_tm && val == ' ' as Symbol {
            if let Some(blank) = self.blankqueue.back() {
                sf.push_str(blank);
            }
        } else {
            self.alphabet.get_symbol(sf, val, false);
        }
    }

    /// Run translation-memory lookup over the whole stream. Matched spans
    /// come out as `[translation]`; everything else passes through.
    pub fn tm_analysis<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last = 0usize;

        loop {
            let mut val = self.read_tm_analysis(input)?;
            if val == 0 {
                break;
            }

            if current_state.is_final(&self.all_finals) {
                if sym_is_punct(val) {
                    let number_tag = self.alphabet.tag_code(symbol::NUMBER_TAG);
                    let readings = current_state.filter_finals_tm(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        &mut self.blankqueue,
                        &self.numbers,
                        number_tag,
                    );
                    lf = readings.chars().skip(1).collect();
                    last = self.input_buffer.pos();
                    self.numbers.clear();
                }
            } else if sf.is_empty() && sym_is_space(val) {
                last = self.input_buffer.pos();
            }

            current_state.step_case(&self.exe, val, false);

            if current_state.is_alive() {
                self.append_tm_symbol(&mut sf, val);
            } else {
                if (sym_is_space(val) || sym_is_punct(val)) && sf.is_empty() {
                    if let Some(c) = symbol::to_char(val) {
                        self.print_char(c, output, true)?;
                    }
                } else if !sym_is_space(val)
                    && !sym_is_punct(val)
                    && (char_len(&sf).wrapping_sub(self.input_buffer.diff_prev_pos(last))
                        > self.last_blank(&sf)
                        || lf.is_empty())
                {
                    loop {
                        self.append_tm_symbol(&mut sf, val);
                        val = self.read_tm_analysis(input)?;
                        if val == 0 || sym_is_space(val) || sym_is_punct(val) {
                            break;
                        }
                    }
                    if val == 0 {
                        output.write_all(sf.as_bytes())?;
                        return Ok(());
                    }
                    self.input_buffer.back(1);
                    output.write_all(sf.as_bytes())?;
                    self.drop_queued_blanks();
                } else if lf.is_empty() {
                    self.input_buffer.back(1);
                    output.write_all(sf.as_bytes())?;
                    self.drop_queued_blanks();
                } else {
                    output.write_all(b"[")?;
                    output.write_all(lf.as_bytes())?;
                    output.write_all(b"]")?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                }

                current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
            }
        }

        self.flush_blanks(output)
    }

    /// Discard queued blanks already covered by a verbatim write, keeping
    /// the one a pending blank symbol still refers to.
    fn drop_queued_blanks(&mut self) {
        while !self.blankqueue.is_empty() {
            if self.blankqueue.len() == 1 && self.is_last_blank_tm {
                break;
            }
            self.blankqueue.pop_front();
        }
    }
}
