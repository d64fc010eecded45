// Generation mode: `^lexical-form$` in, surface form out.

use crate::input::InputText;
use crate::processor::{write_char, FstProcessor, GenerationMode};
use crate::StreamError;
use ltk_core::case::{self, lexical_case};
use ltk_core::symbol::{self, Symbol};
use std::io::{Read, Write};

impl FstProcessor {
    /// One symbol of an LU in generation position. Blanks are copied to the
    /// output immediately; `None` is end of stream.
    pub(crate) fn read_generation<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<Option<Symbol>, StreamError> {
        loop {
            let Some(mut val) = input.get()? else { return Ok(None) };

            if self.out_of_word {
                if val == '^' {
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok(None),
                    };
                } else if val == '\\' {
                    write_char(output, val)?;
                    let Some(escaped) = input.get()? else { return Ok(None) };
                    write_char(output, escaped)?;
                    self.skip_until(input, output, '^')?;
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok(None),
                    };
                } else {
                    write_char(output, val)?;
                    self.skip_until(input, output, '^')?;
                    val = match input.get()? {
                        Some(c) => c,
                        None => return Ok(None),
                    };
                }
                self.out_of_word = false;
            }

            match val {
                '\\' => {
                    let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
                    return Ok(Some(escaped as Symbol));
                }
                '$' => {
                    self.out_of_word = true;
                    return Ok(Some('$' as Symbol));
                }
                '<' => {
                    let block = input.read_block('<', '>')?;
                    return Ok(Some(self.alphabet.tag_code(&block)));
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
                    // keep reading: blanks are not part of the LU
                }
                _ => return Ok(Some(val as Symbol)),
            }
        }
    }

    /// Run generation over the whole stream.
    pub fn generation<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        mode: GenerationMode,
    ) -> Result<(), StreamError> {
        if self.settings.null_flush {
            self.null_flush_generation = true;
            while !input.eof()? {
                self.generation_inner(input, output, mode)?;
                write_char(output, '\0')?;
                output.flush()?;
            }
            return Ok(());
        }
        self.generation_inner(input, output, mode)
    }

    fn generation_inner<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
        mode: GenerationMode,
    ) -> Result<(), StreamError> {
        let mut current_state = self.initial_state.clone();
        let mut sf = String::new();

        self.out_of_word = false;
        self.skip_until(input, output, '^')?;

        while let Some(mut val) = self.read_generation(input, output)? {
            if sf.is_empty() && val == '=' as Symbol {
                write_char(output, '=')?;
                match self.read_generation(input, output)? {
                    Some(next) => val = next,
                    None => break,
                }
            }

            if val == '$' as Symbol && self.out_of_word {
                let first = sf.chars().next();
                if first == Some('*') || first == Some('%') {
                    match mode {
                        GenerationMode::Clean => {
                            // marker stripped, tags kept as written
                            self.write_escaped_with_tags(strip_first(&sf), output)?;
                        }
                        GenerationMode::TaggedNoMark => {
                            write_char(output, '^')?;
                            self.write_escaped(
                                &Self::remove_tags(strip_first(&sf)),
                                output,
                            )?;
                            write_char(output, '/')?;
                            self.write_escaped_with_tags(&sf, output)?;
                            write_char(output, '$')?;
                        }
                        _ => self.write_escaped(&sf, output)?,
                    }
                } else if first == Some('@') {
                    match mode {
                        GenerationMode::All => self.write_escaped(&sf, output)?,
                        GenerationMode::Clean => {
                            self.write_escaped(
                                &Self::remove_tags(strip_first(&sf)),
                                output,
                            )?;
                        }
                        GenerationMode::Unknown
                        | GenerationMode::Tagged
                        | GenerationMode::CarefulCase => {
                            self.write_escaped(&Self::remove_tags(&sf), output)?;
                        }
                        GenerationMode::TaggedNoMark => {
                            write_char(output, '^')?;
                            self.write_escaped(
                                &Self::remove_tags(strip_first(&sf)),
                                output,
                            )?;
                            write_char(output, '/')?;
                            self.write_escaped_with_tags(&sf, output)?;
                            write_char(output, '$')?;
                        }
                    }
                } else if current_state.is_final(&self.all_finals) {
                    let pattern = if self.settings.dictionary_case {
                        Default::default()
                    } else {
                        lexical_case(&sf)
                    };
                    if mode == GenerationMode::Tagged || mode == GenerationMode::TaggedNoMark {
                        write_char(output, '^')?;
                    }
                    let readings = current_state.filter_finals(
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
                    // drop the leading slash of the first reading
                    output.write_all(readings[1..].as_bytes())?;
                    if mode == GenerationMode::Tagged || mode == GenerationMode::TaggedNoMark {
                        write_char(output, '/')?;
                        self.write_escaped_with_tags(&sf, output)?;
                        write_char(output, '$')?;
                    }
                } else {
                    match mode {
                        GenerationMode::All => {
                            write_char(output, '#')?;
                            self.write_escaped(&sf, output)?;
                        }
                        GenerationMode::Clean => {
                            self.write_escaped(&Self::remove_tags(&sf), output)?;
                        }
                        GenerationMode::Unknown | GenerationMode::CarefulCase => {
                            if !sf.is_empty() {
                                write_char(output, '#')?;
                                self.write_escaped(&Self::remove_tags(&sf), output)?;
                            }
                        }
                        GenerationMode::Tagged => {
                            write_char(output, '#')?;
                            self.write_escaped(&Self::remove_tags(&sf), output)?;
                        }
                        GenerationMode::TaggedNoMark => {
                            write_char(output, '^')?;
                            self.write_escaped(&Self::remove_tags(&sf), output)?;
                            write_char(output, '/')?;
                            write_char(output, '#')?;
                            self.write_escaped_with_tags(&sf, output)?;
                            write_char(output, '$')?;
                        }
                    }
                }

                current_state = self.initial_state.clone();
                sf.clear();
            } else if sym_is_space(val) && sf.is_empty() {
                // stray blank between words
            } else if matches!(sf.chars().next(), Some('*' | '%')) {
                self.alphabet.get_symbol(&mut sf, val, false);
            } else {
                self.alphabet.get_symbol(&mut sf, val, false);
                if current_state.is_alive() {
                    if !self.alphabet.is_tag(val)
                        && case::symbol_is_upper(val)
                        && !self.settings.case_sensitive
                    {
                        if mode == GenerationMode::CarefulCase {
                            current_state.step_careful(
                                &self.exe,
                                val,
                                case::lower_symbol(val),
                            );
                        } else {
                            current_state.step_alt(&self.exe, val, case::lower_symbol(val));
                        }
                    } else {
                        current_state.step(&self.exe, val);
                    }
                }
            }
        }
        Ok(())
    }
}

fn sym_is_space(sym: Symbol) -> bool {
    symbol::to_char(sym).is_some_and(char::is_whitespace)
}

fn strip_first(text: &str) -> &str {
    match text.char_indices().nth(1) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
