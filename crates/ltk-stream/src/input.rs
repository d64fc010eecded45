// Character reader over a byte stream, with a small pushback stack and the
// block/blank readers of the stream syntax.

use crate::StreamError;
use std::io::Read;

/// Reads scalar values one at a time. `'\0'` is passed through as data (it
/// is the stream flush marker); end of file is `None`.
pub struct InputText<R> {
    input: R,
    pushback: Vec<char>,
    at_eof: bool,
}

impl<R: Read> InputText<R> {
    pub fn new(input: R) -> Self {
        InputText { input, pushback: Vec::with_capacity(4), at_eof: false }
    }

    fn read_scalar(&mut self) -> Result<Option<char>, StreamError> {
        let mut first = [0u8; 1];
        match self.input.read_exact(&mut first) {
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.at_eof = true;
                return Ok(None);
            }
            other => other?,
        }
        let lead = first[0];
        let extra = match lead {
            0x00..=0x7f => 0,
            0xc0..=0xdf => 1,
            0xe0..=0xef => 2,
            0xf0..=0xf7 => 3,
            _ => return Err(StreamError::Encoding),
        };
        if extra == 0 {
            return Ok(Some(lead as char));
        }
        let mut rest = [0u8; 3];
        self.input.read_exact(&mut rest[..extra]).map_err(|_| StreamError::Encoding)?;
        let mut buf = [0u8; 4];
        buf[0] = lead;
        buf[1..1 + extra].copy_from_slice(&rest[..extra]);
        let text = std::str::from_utf8(&buf[..1 + extra]).map_err(|_| StreamError::Encoding)?;
        Ok(text.chars().next())
    }

    /// Consume one character; `None` at end of file.
    pub fn get(&mut self) -> Result<Option<char>, StreamError> {
        if let Some(c) = self.pushback.pop() {
            return Ok(Some(c));
        }
        self.read_scalar()
    }

    /// Look at the next character without consuming it.
    pub fn peek(&mut self) -> Result<Option<char>, StreamError> {
        if let Some(&c) = self.pushback.last() {
            return Ok(Some(c));
        }
        match self.read_scalar()? {
            Some(c) => {
                self.pushback.push(c);
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }

    /// Return a character to the front of the stream.
    pub fn unget(&mut self, c: char) {
        self.pushback.push(c);
    }

    pub fn eof(&mut self) -> Result<bool, StreamError> {
        if !self.pushback.is_empty() {
            return Ok(false);
        }
        if self.at_eof {
            return Ok(true);
        }
        Ok(self.peek()?.is_none())
    }

    /// Read up to and including `close`, `open` having been consumed
    /// already. Backslash escapes are kept verbatim with their escaped
    /// character. Stops early at end of file or a flush marker.
    pub fn read_block(&mut self, open: char, close: char) -> Result<String, StreamError> {
        let mut result = String::new();
        result.push(open);
        loop {
            match self.get()? {
                None => break,
                Some('\0') => {
                    self.unget('\0');
                    break;
                }
                Some(c) => {
                    result.push(c);
                    if c == '\\' {
                        if let Some(escaped) = self.get()? {
                            result.push(escaped);
                        }
                    } else if c == close {
                        break;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Finish reading a word-bound blank whose `[[` opener was consumed;
    /// returns the whole `[[...]]` block.
    pub fn finish_wblank(&mut self) -> Result<String, StreamError> {
        let mut result = String::from("[[");
        loop {
            match self.get()? {
                None => break,
                Some('\0') => {
                    self.unget('\0');
                    break;
                }
                Some(c) => {
                    result.push(c);
                    if c == '\\' {
                        if let Some(escaped) = self.get()? {
                            result.push(escaped);
                        }
                    } else if c == ']' && self.peek()? == Some(']') {
                        if let Some(second) = self.get()? {
                            result.push(second);
                        }
                        break;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Read blank material up to the next `^`, flush marker or end of file.
    /// `[` opens an ordinary superblank; `[[` is consumed as a word-bound
    /// blank when `read_wblank`, and pushed back otherwise (stopping the
    /// blank).
    pub fn read_blank(&mut self, read_wblank: bool) -> Result<String, StreamError> {
        let mut result = String::new();
        loop {
            match self.get()? {
                None => break,
                Some(c @ ('^' | '\0')) => {
                    self.unget(c);
                    break;
                }
                Some('[') => {
                    if self.peek()? == Some('[') {
                        if read_wblank {
                            self.get()?;
                            result.push_str(&self.finish_wblank()?);
                        } else {
                            self.unget('[');
                            break;
                        }
                    } else {
                        result.push_str(&self.read_block('[', ']')?);
                    }
                }
                Some(c) => {
                    result.push(c);
                    if c == '\\' {
                        match self.get()? {
                            Some(escaped) => result.push(escaped),
                            None => return Err(StreamError::MalformedStream),
                        }
                    }
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> InputText<Cursor<Vec<u8>>> {
        InputText::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn get_and_unget() {
        let mut r = reader("ab");
        assert_eq!(r.get().unwrap(), Some('a'));
        r.unget('a');
        assert_eq!(r.get().unwrap(), Some('a'));
        assert_eq!(r.get().unwrap(), Some('b'));
        assert_eq!(r.get().unwrap(), None);
    }

    #[test]
    fn multibyte_scalars() {
        let mut r = reader("ñ€\u{10348}");
        assert_eq!(r.get().unwrap(), Some('ñ'));
        assert_eq!(r.get().unwrap(), Some('€'));
        assert_eq!(r.get().unwrap(), Some('\u{10348}'));
        assert_eq!(r.get().unwrap(), None);
    }

    #[test]
    fn nul_is_data() {
        let mut r = reader("a\0b");
        assert_eq!(r.get().unwrap(), Some('a'));
        assert_eq!(r.get().unwrap(), Some('\0'));
        assert_eq!(r.get().unwrap(), Some('b'));
    }

    #[test]
    fn read_block_keeps_escapes() {
        let mut r = reader(" a\\]b]rest");
        let block = r.read_block('[', ']').unwrap();
        assert_eq!(block, "[ a\\]b]");
        assert_eq!(r.get().unwrap(), Some('r'));
    }

    #[test]
    fn finish_wblank_reads_to_double_bracket() {
        let mut r = reader("t:x]]word");
        assert_eq!(r.finish_wblank().unwrap(), "[[t:x]]");
        assert_eq!(r.get().unwrap(), Some('w'));
    }

    #[test]
    fn read_blank_stops_at_lu() {
        let mut r = reader("  [<br/>] ^word$");
        let blank = r.read_blank(true).unwrap();
        assert_eq!(blank, "  [<br/>] ");
        assert_eq!(r.get().unwrap(), Some('^'));
    }

    #[test]
    fn read_blank_pushes_back_wblank() {
        let mut r = reader("x[[t:i]]^w$");
        let blank = r.read_blank(false).unwrap();
        assert_eq!(blank, "x");
        assert_eq!(r.get().unwrap(), Some('['));
        assert_eq!(r.get().unwrap(), Some('['));
    }

    #[test]
    fn read_blank_consumes_wblank_when_asked() {
        let mut r = reader("x[[t:i]]y^w$");
        let blank = r.read_blank(true).unwrap();
        assert_eq!(blank, "x[[t:i]]y");
    }
}
