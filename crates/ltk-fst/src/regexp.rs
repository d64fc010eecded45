// Recursive-descent compiler for the small regular-expression language.
//
// Reserved letters: ( ) [ ] * ? + - ^ \ | and end of input. Everything else
// is a literal matched as the identity pair. The result is an ordinary
// builder transducer assembled through the construction API.

use crate::alphabet::Alphabet;
use crate::transducer::{Transducer, DEFAULT_WEIGHT};
use crate::FstError;
use std::collections::BTreeSet;

/// End-of-input marker token.
const END: i32 = i32::MAX;

#[derive(Debug, thiserror::Error)]
pub enum RegexpError {
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),
    #[error("character range is reversed at position {0}")]
    ReversedRange(usize),
    #[error(transparent)]
    Fst(#[from] FstError),
}

pub struct RegexpCompiler<'a> {
    alphabet: &'a mut Alphabet,
    transducer: Transducer,
    input: Vec<i32>,
    index: usize,
    token: i32,
    state: i32,
    letter: i32,
    postop: Option<char>,
    brackets: BTreeSet<i32>,
}

impl<'a> RegexpCompiler<'a> {
    pub fn new(alphabet: &'a mut Alphabet) -> Self {
        RegexpCompiler {
            alphabet,
            transducer: Transducer::new(),
            input: Vec::new(),
            index: 0,
            token: END,
            state: 0,
            letter: 0,
            postop: None,
            brackets: BTreeSet::new(),
        }
    }

    /// Compile `expression` into a fresh transducer, replacing any previous
    /// result.
    pub fn compile(&mut self, expression: &str) -> Result<(), RegexpError> {
        self.input = expression.chars().map(|c| c as i32).collect();
        self.index = 0;
        self.token = self.input.first().copied().unwrap_or(END);
        self.transducer = Transducer::new();
        self.brackets.clear();
        self.postop = None;
        self.state = self.transducer.get_initial();
        self.expression()?;
        self.transducer.set_final(self.state, DEFAULT_WEIGHT);
        Ok(())
    }

    pub fn transducer(&self) -> &Transducer {
        &self.transducer
    }

    pub fn into_transducer(self) -> Transducer {
        self.transducer
    }

    fn is_reserved(token: i32) -> bool {
        matches!(
            token,
            t if t == END
        ) || matches!(
            char::from_u32(token.max(0) as u32),
            Some('(' | ')' | '[' | ']' | '*' | '?' | '+' | '-' | '^' | '\\' | '|')
        )
    }

    fn error<T>(&self) -> Result<T, RegexpError> {
        Err(RegexpError::UnexpectedToken(self.index))
    }

    fn consume(&mut self, token: i32) -> Result<(), RegexpError> {
        if self.token != token {
            return self.error();
        }
        self.index += 1;
        self.token = self.input.get(self.index).copied().unwrap_or(END);
        Ok(())
    }

    fn eps(&mut self) -> i32 {
        self.alphabet.pair(0, 0)
    }

    fn starts_term(token: i32) -> bool {
        token == '(' as i32 || token == '[' as i32 || token == '\\' as i32
            || !Self::is_reserved(token)
    }

    fn expression(&mut self) -> Result<(), RegexpError> {
        if Self::starts_term(self.token) {
            self.terms()?;
            self.alternatives()
        } else {
            self.error()
        }
    }

    fn terms(&mut self) -> Result<(), RegexpError> {
        if Self::starts_term(self.token) {
            self.term()?;
            self.terms_tail()
        } else {
            self.error()
        }
    }

    fn alternatives(&mut self) -> Result<(), RegexpError> {
        if self.token == END || self.token == ')' as i32 {
            Ok(())
        } else if self.token == '|' as i32 {
            let branch_end = self.state;
            self.state = self.transducer.get_initial();
            self.consume('|' as i32)?;
            self.terms()?;
            self.alternatives()?;

            let eps = self.eps();
            self.state = self
                .transducer
                .insert_new_single_transduction(eps, self.state, DEFAULT_WEIGHT);
            self.transducer
                .link_states(branch_end, self.state, eps, DEFAULT_WEIGHT);
            Ok(())
        } else {
            self.error()
        }
    }

    fn terms_tail(&mut self) -> Result<(), RegexpError> {
        if Self::starts_term(self.token) {
            self.term()?;
            self.terms_tail()
        } else if self.token == '|' as i32 || self.token == END || self.token == ')' as i32 {
            Ok(())
        } else {
            self.error()
        }
    }

    fn apply_postop(t: &mut Transducer, postop: Option<char>, eps: i32) -> Result<(), FstError> {
        match postop {
            Some('*') => t.zero_or_more(eps),
            Some('+') => t.one_or_more(eps),
            Some('?') => t.optional(eps),
            _ => Ok(()),
        }
    }

    fn term(&mut self) -> Result<(), RegexpError> {
        if !Self::is_reserved(self.token) || self.token == '\\' as i32 {
            let eps = self.eps();
            let mut t = Transducer::new();
            let start = t.get_initial();
            self.literal()?;
            let pair = self.alphabet.pair(self.letter, self.letter);
            let end = t.insert_new_single_transduction(pair, start, DEFAULT_WEIGHT);
            t.set_final(end, DEFAULT_WEIGHT);
            self.postfix()?;
            Self::apply_postop(&mut t, self.postop.take(), eps)?;
            self.state = self.transducer.insert_transducer(self.state, &t, eps)?;
            Ok(())
        } else if self.token == '(' as i32 {
            let eps = self.eps();
            let saved = std::mem::replace(&mut self.transducer, Transducer::new());
            let saved_state = self.state;
            self.state = self.transducer.get_initial();
            self.consume('(' as i32)?;
            self.expression()?;
            self.consume(')' as i32)?;
            self.transducer.set_final(self.state, DEFAULT_WEIGHT);
            self.postfix()?;
            Self::apply_postop(&mut self.transducer, self.postop.take(), eps)?;
            let inner = std::mem::replace(&mut self.transducer, saved);
            self.state = self
                .transducer
                .insert_transducer(saved_state, &inner, eps)?;
            Ok(())
        } else if self.token == '[' as i32 {
            self.consume('[' as i32)?;
            self.bracket()
        } else {
            self.error()
        }
    }

    fn bracket(&mut self) -> Result<(), RegexpError> {
        let eps = self.eps();
        let mut t = Transducer::new();
        if !Self::is_reserved(self.token)
            || self.token == '\\' as i32
            || self.token == ']' as i32
        {
            self.bracket_items()?;
            self.consume(']' as i32)?;
            self.postfix()?;
            for &sym in &self.brackets.clone() {
                let start = t.get_initial();
                let mid = t.insert_new_single_transduction(eps, start, DEFAULT_WEIGHT);
                let pair = self.alphabet.pair(sym, sym);
                let end = t.insert_new_single_transduction(pair, mid, DEFAULT_WEIGHT);
                t.set_final(end, DEFAULT_WEIGHT);
            }
            t.join_finals(eps).map_err(RegexpError::Fst)?;
        } else if self.token == '^' as i32 {
            self.consume('^' as i32)?;
            self.bracket_items()?;
            self.consume(']' as i32)?;
            self.postfix()?;
            for sym in 0..256 {
                if !self.brackets.contains(&sym) {
                    let start = t.get_initial();
                    let mid = t.insert_new_single_transduction(eps, start, DEFAULT_WEIGHT);
                    let pair = self.alphabet.pair(sym, sym);
                    let end = t.insert_new_single_transduction(pair, mid, DEFAULT_WEIGHT);
                    t.set_final(end, DEFAULT_WEIGHT);
                }
            }
            t.join_finals(eps).map_err(RegexpError::Fst)?;
        } else {
            return self.error();
        }

        Self::apply_postop(&mut t, self.postop.take(), eps)?;
        self.brackets.clear();
        self.state = self.transducer.insert_transducer(self.state, &t, eps)?;
        Ok(())
    }

    fn bracket_items(&mut self) -> Result<(), RegexpError> {
        if !Self::is_reserved(self.token) || self.token == '\\' as i32 {
            self.bracket_element()?;
            self.bracket_items()
        } else if self.token == ']' as i32 {
            Ok(())
        } else {
            self.error()
        }
    }

    fn bracket_element(&mut self) -> Result<(), RegexpError> {
        if !Self::is_reserved(self.token) || self.token == '\\' as i32 {
            self.literal()?;
            let low = self.letter;
            self.range_tail()?;
            let high = self.letter;
            if low > high {
                return Err(RegexpError::ReversedRange(self.index));
            }
            for sym in low..=high {
                self.brackets.insert(sym);
            }
            Ok(())
        } else {
            self.error()
        }
    }

    fn range_tail(&mut self) -> Result<(), RegexpError> {
        if self.token == '-' as i32 {
            self.consume('-' as i32)?;
            self.literal()
        } else if !Self::is_reserved(self.token)
            || self.token == '\\' as i32
            || self.token == ']' as i32
        {
            Ok(())
        } else {
            self.error()
        }
    }

    fn literal(&mut self) -> Result<(), RegexpError> {
        if !Self::is_reserved(self.token) {
            self.letter = self.token;
            self.consume(self.token)
        } else if self.token == '\\' as i32 {
            self.consume('\\' as i32)?;
            self.letter = self.token;
            self.reserved()
        } else {
            self.error()
        }
    }

    fn postfix(&mut self) -> Result<(), RegexpError> {
        match char::from_u32(self.token.max(0) as u32) {
            Some(op @ ('*' | '?' | '+')) => {
                self.consume(self.token)?;
                self.postop = Some(op);
                Ok(())
            }
            _ if Self::starts_term(self.token)
                || self.token == '|' as i32
                || self.token == END
                || self.token == ')' as i32 =>
            {
                Ok(())
            }
            _ => self.error(),
        }
    }

    fn reserved(&mut self) -> Result<(), RegexpError> {
        if Self::is_reserved(self.token) {
            self.consume(self.token)
        } else {
            self.error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &str) -> (Alphabet, Transducer) {
        let mut a = Alphabet::new();
        let mut c = RegexpCompiler::new(&mut a);
        c.compile(expr).unwrap();
        let t = c.into_transducer();
        (a, t)
    }

    #[test]
    fn plain_concatenation() {
        let (a, t) = compile("abc");
        assert!(t.recognise("abc", &a));
        assert!(!t.recognise("ab", &a));
        assert!(!t.recognise("abcd", &a));
    }

    #[test]
    fn alternation() {
        let (a, t) = compile("ab|cd");
        assert!(t.recognise("ab", &a));
        assert!(t.recognise("cd", &a));
        assert!(!t.recognise("ad", &a));
    }

    #[test]
    fn postfix_operators() {
        let (a, t) = compile("ab*");
        assert!(t.recognise("a", &a));
        assert!(t.recognise("abbb", &a));

        let (a, t) = compile("ab+");
        assert!(!t.recognise("a", &a));
        assert!(t.recognise("ab", &a));
        assert!(t.recognise("abb", &a));

        let (a, t) = compile("ab?");
        assert!(t.recognise("a", &a));
        assert!(t.recognise("ab", &a));
        assert!(!t.recognise("abb", &a));
    }

    #[test]
    fn groups() {
        let (a, t) = compile("a(bc)+");
        assert!(t.recognise("abc", &a));
        assert!(t.recognise("abcbc", &a));
        assert!(!t.recognise("ab", &a));
    }

    #[test]
    fn bracket_class_with_range() {
        let (a, t) = compile("[a-c]x");
        assert!(t.recognise("ax", &a));
        assert!(t.recognise("bx", &a));
        assert!(t.recognise("cx", &a));
        assert!(!t.recognise("dx", &a));
    }

    #[test]
    fn complemented_class() {
        let (a, t) = compile("[^ab]");
        assert!(t.recognise("c", &a));
        assert!(!t.recognise("a", &a));
        assert!(!t.recognise("b", &a));
    }

    #[test]
    fn escaped_reserved_letter() {
        let (a, t) = compile("a\\*b");
        assert!(t.recognise("a*b", &a));
        assert!(!t.recognise("ab", &a));
    }

    #[test]
    fn rejects_malformed() {
        let mut a = Alphabet::new();
        let mut c = RegexpCompiler::new(&mut a);
        assert!(c.compile("a|").is_err());
        assert!(c.compile("(ab").is_err());
        assert!(c.compile("").is_err());
        assert!(c.compile("*a").is_err());
    }

    #[test]
    fn rejects_reversed_range() {
        let mut a = Alphabet::new();
        let mut c = RegexpCompiler::new(&mut a);
        assert!(matches!(
            c.compile("[z-a]"),
            Err(RegexpError::ReversedRange(_))
        ));
    }
}
