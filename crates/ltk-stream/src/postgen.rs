// Post-generation and transliteration: context-sensitive longest-match
// rewriting of the surface stream.
//
// Matches substitute the FST output into the stream; on post-generation the
// matched suffix is re-read so chained rewrites compose, and the `~`
// wake-up mark is dropped. Word-bound blanks are never part of a match and
// are re-emitted in order at the boundary where they were read.

use crate::input::InputText;
use crate::processor::{write_char, FstProcessor};
use crate::StreamError;
use ltk_core::symbol::{self, Symbol};
use std::collections::VecDeque;
use std::io::{Read, Write};

/// Length of the common suffix of two strings, in chars, backing off one
/// matched character to guarantee forward progress on re-read.
fn common_suffix(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut len = 0;
    while len < a.len() && len < b.len() {
        if a[a.len() - 1 - len] == b[b.len() - 1 - len] {
            len += 1;
        } else {
            len = len.saturating_sub(1);
            break;
        }
    }
    len
}

fn count_spaces(text: &str) -> usize {
    text.chars().filter(|&c| c == ' ').count()
}

/// Take the next blank for a space about to be printed, consuming any
/// surplus single-space blanks the rewrite made redundant.
fn next_space(blankqueue: &mut VecDeque<String>, skip: &mut usize) -> String {
    while *skip > 0 && blankqueue.front().map(String::as_str) == Some(" ") {
        blankqueue.pop_front();
        *skip -= 1;
    }
    let Some(ret) = blankqueue.pop_front() else {
        return " ".to_string();
    };
    while *skip > 0 && blankqueue.front().map(String::as_str) == Some(" ") {
        blankqueue.pop_front();
        *skip -= 1;
    }
    ret
}

fn trim_last_char(text: &mut String) {
    if let Some(c) = text.chars().next_back() {
        text.truncate(text.len() - c.len_utf8());
    }
}

impl FstProcessor {
    /// One symbol of the surface stream in transliteration position.
    /// Blanks and word-bound blanks collapse to a space symbol; the latter
    /// are remembered by ring position so replays keep their identity.
    pub(crate) fn read_transliteration<R: Read>(
        &mut self,
        input: &mut InputText<R>,
    ) -> Result<Symbol, StreamError> {
        if !self.input_buffer.is_empty() {
            self.is_wblank = self.wblank_locs.contains(&self.input_buffer.pos());
            return Ok(self.input_buffer.next());
        }

        self.is_wblank = false;
        let Some(val) = input.get()? else { return Ok(0) };

        let sym: Symbol;
        if val == '\\' {
            let escaped = input.get()?.ok_or(StreamError::MalformedStream)?;
            sym = escaped as Symbol;
        } else if val == '<' {
            sym = self.alphabet.tag_code(&input.read_block('<', '>')?);
        } else if val == '[' && input.peek()? == Some('[') {
            input.get()?;
            let wblank = input.finish_wblank()?;
            self.wblankqueue.push_back(wblank);
            self.is_wblank = true;
            sym = ' ' as Symbol;
        } else if val == '[' || (val.is_whitespace() && val != '\0') {
            sym = ' ' as Symbol;
            let mut blank = String::new();
            let mut cur = Some(val);
            while let Some(c) = cur {
                if c == '[' {
                    if input.peek()? == Some('[') {
                        input.unget(c);
                        break;
                    }
                    blank.push_str(&input.read_block('[', ']')?);
                    cur = input.get()?;
                } else if c.is_whitespace() && c != '\0' {
                    blank.push(c);
                    cur = input.get()?;
                } else {
                    input.unget(c);
                    break;
                }
            }
            self.blankqueue.push_back(blank);
        } else {
            sym = val as Symbol;
        }

        if self.is_wblank {
            self.wblank_locs.insert(self.input_buffer.pos());
        }
        self.input_buffer.add(sym);
        Ok(sym)
    }

    /// Post-generation: transliteration with suffix re-read and the `~`
    /// wake-up mark dropped.
    pub fn postgeneration<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        self.translit_drop_tilde = true;
        self.translit_reread_suffix = true;
        self.transliteration(input, output)
    }

    /// Transliteration without the post-generation conventions.
    pub fn intergeneration<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        self.translit_drop_tilde = false;
        self.translit_reread_suffix = false;
        self.transliteration(input, output)
    }

    /// Longest-match rewriting over the surface stream.
    pub fn transliteration<R: Read>(
        &mut self,
        input: &mut InputText<R>,
        output: &mut dyn Write,
    ) -> Result<(), StreamError> {
        let mut current_state = self.initial_state.clone();
        let mut sf = String::new();
        let mut last_sf = String::new();
        let mut last_lf = String::new();
        let mut rewind_point = self.input_buffer.pos();
        let mut last_match = self.input_buffer.pos();
        let mut firstchar: Symbol = 0;
        let mut spaces_to_skip = 0usize;

        loop {
            let val = self.read_transliteration(input)?;

            if val == 0 && sf.is_empty() {
                // document boundary
                self.flush_wblanks(output)?;
                while let Some(blank) = self.blankqueue.pop_front() {
                    if blank != " " {
                        output.write_all(blank.as_bytes())?;
                    }
                }
                spaces_to_skip = 0;
                if input.eof()? {
                    break;
                }
                write_char(output, '\0')?;
                output.flush()?;
                current_state = self.initial_state.clone();
                sf.clear();
                last_sf.clear();
                last_lf.clear();
                rewind_point = self.input_buffer.pos();
                last_match = self.input_buffer.pos();
                firstchar = 0;
                self.wblank_locs.clear();
                continue;
            }

            let was_wblank = self.is_wblank;

            if sf.is_empty() {
                if !was_wblank {
                    firstchar = val;
                }
                rewind_point = self.input_buffer.pos();
            } else {
                let lf = self.filter_finals_for(&current_state, &sf);
                if !lf.is_empty() && lf[1..] != sf[..] && sf != last_sf {
                    last_match = self.input_buffer.pos();
                    last_lf = lf;
                    last_sf = sf.clone();
                }
            }

            if val != 0 && !was_wblank {
                current_state.step(&self.exe, val);
                self.alphabet.get_symbol(&mut sf, val, false);
            }

            if current_state.is_alive() && val != 0 && !(was_wblank && sf.is_empty()) {
                continue;
            }

            if last_lf.is_empty() {
                // no rewrite: pass the first symbol through and resume
                if was_wblank && sf.is_empty() {
                    if let Some(wblank) = self.wblankqueue.pop_front() {
                        output.write_all(wblank.as_bytes())?;
                    }
                } else if firstchar == '~' as Symbol && self.translit_drop_tilde {
                    // dropped
                } else if firstchar == ' ' as Symbol {
                    let space = next_space(&mut self.blankqueue, &mut spaces_to_skip);
                    output.write_all(space.as_bytes())?;
                } else if firstchar != 0 {
                    if let Some(c) = symbol::to_char(firstchar) {
                        self.write_char_escaped(c, output)?;
                    } else {
                        let mut tag = String::new();
                        self.alphabet.get_symbol(&mut tag, firstchar, false);
                        output.write_all(tag.as_bytes())?;
                    }
                }
                self.input_buffer.set_pos(rewind_point);
            } else {
                // rewrite: substitute the recorded match
                self.input_buffer.set_pos(last_match);
                self.input_buffer.back(1);
                if self.translit_reread_suffix {
                    let suffix = common_suffix(&last_lf, &last_sf);
                    for _ in 0..suffix {
                        trim_last_char(&mut last_lf);
                        trim_last_char(&mut last_sf);
                    }
                    self.input_buffer.back(suffix);
                }
                rewind_point = self.input_buffer.pos();
                if last_sf.ends_with(' ') && last_lf.ends_with(' ') {
                    trim_last_char(&mut last_sf);
                    trim_last_char(&mut last_lf);
                    self.input_buffer.back(1);
                }

                let sf_spaces = count_spaces(&last_sf);
                let lf_spaces = count_spaces(&last_lf);
                if sf_spaces > lf_spaces {
                    spaces_to_skip += sf_spaces - lf_spaces;
                }
                let mut spaces_printed = 0;
                for c in last_lf.chars().skip(1) {
                    if c == '~' && self.translit_drop_tilde {
                        continue;
                    }
                    if c.is_whitespace() {
                        if spaces_printed >= sf_spaces {
                            write_char(output, c)?;
                        } else {
                            let space = next_space(&mut self.blankqueue, &mut spaces_to_skip);
                            output.write_all(space.as_bytes())?;
                        }
                        spaces_printed += 1;
                    } else {
                        self.write_char_escaped(c, output)?;
                    }
                }
            }

            current_state = self.initial_state.clone();
            sf.clear();
            last_lf.clear();
            last_sf.clear();
            if self.wblankqueue.is_empty() {
                self.wblank_locs.clear();
            }
        }

        self.flush_blanks(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_suffix_counts_matching_tail() {
        assert_eq!(common_suffix("abcd", "xbcd"), 2);
        assert_eq!(common_suffix("abc", "xyz"), 0);
        assert_eq!(common_suffix("abc", "abc"), 3);
    }

    #[test]
    fn next_space_falls_back_to_plain_space() {
        let mut q = VecDeque::new();
        let mut skip = 0;
        assert_eq!(next_space(&mut q, &mut skip), " ");
        q.push_back("[b]".to_string());
        assert_eq!(next_space(&mut q, &mut skip), "[b]");
    }

    #[test]
    fn next_space_skips_surplus_spaces() {
        let mut q: VecDeque<String> =
            [" ", " ", "[b]"].iter().map(|s| s.to_string()).collect();
        let mut skip = 2;
        assert_eq!(next_space(&mut q, &mut skip), "[b]");
        assert_eq!(skip, 0);
    }
}
