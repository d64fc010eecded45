// Symbol and symbol-pair interning.
//
// Tags (multi-character symbols written `<...>`) get negative codes in
// insertion order; symbol pairs get dense non-negative codes used as edge
// labels by the transducers. Pair code 0 is always the epsilon pair (0, 0).

use crate::codec;
use crate::FstError;
use hashbrown::HashMap;
use ltk_core::case::to_upper;
use ltk_core::symbol::{self, Symbol, SymbolIter};
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// Which element of a pair to project in [`Alphabet::create_loopback_symbols`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    /// tag name (brackets included) -> negative code
    tags: HashMap<String, Symbol>,
    /// tag code -(n+1) -> name at index n
    tags_inv: Vec<String>,
    pairs: HashMap<(Symbol, Symbol), i32>,
    pairs_inv: Vec<(Symbol, Symbol)>,
}

impl Alphabet {
    pub fn new() -> Self {
        let mut a = Alphabet {
            tags: HashMap::new(),
            tags_inv: Vec::new(),
            pairs: HashMap::new(),
            pairs_inv: Vec::new(),
        };
        a.pairs.insert((0, 0), 0);
        a.pairs_inv.push((0, 0));
        a
    }

    /// Register a tag name (idempotent). The name includes its angle
    /// brackets. The allocated code is the negative of its 1-based index.
    pub fn include_symbol(&mut self, name: &str) {
        if !self.tags.contains_key(name) {
            let code = -(self.tags_inv.len() as Symbol + 1);
            self.tags.insert(name.to_string(), code);
            self.tags_inv.push(name.to_string());
        }
    }

    /// Runtime lookup: the code of a tag, or 0 when the tag is unknown.
    ///
    /// Returning epsilon for an unknown tag makes the affected path die
    /// downstream instead of aborting the stream.
    pub fn tag_code(&self, name: &str) -> Symbol {
        self.tags.get(name).copied().unwrap_or(0)
    }

    /// Construction-time lookup: `None` when the tag has not been interned.
    pub fn tag_code_checked(&self, name: &str) -> Option<Symbol> {
        self.tags.get(name).copied()
    }

    pub fn is_symbol_defined(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Number of interned tags.
    pub fn len(&self) -> usize {
        self.tags_inv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags_inv.is_empty()
    }

    /// Number of interned pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs_inv.len()
    }

    /// The code of the pair `(input, output)`, interning it if unseen.
    ///
    /// This is the canonical way to obtain edge labels; codes are dense and
    /// stable for the lifetime of the alphabet.
    pub fn pair(&mut self, input: Symbol, output: Symbol) -> i32 {
        if let Some(&code) = self.pairs.get(&(input, output)) {
            return code;
        }
        let code = self.pairs_inv.len() as i32;
        self.pairs.insert((input, output), code);
        self.pairs_inv.push((input, output));
        code
    }

    /// The `(input, output)` symbols of a pair code.
    pub fn decode(&self, pair_code: i32) -> (Symbol, Symbol) {
        self.pairs_inv[pair_code as usize]
    }

    pub fn is_tag(&self, sym: Symbol) -> bool {
        sym < 0
    }

    /// The textual form of a tag code.
    pub fn tag_name(&self, sym: Symbol) -> &str {
        &self.tags_inv[(-sym - 1) as usize]
    }

    /// Rewrite the textual form of a tag, e.g. to hide control symbols on
    /// output. Positive codes are left alone.
    pub fn set_symbol(&mut self, sym: Symbol, text: &str) {
        if sym < 0 {
            self.tags_inv[(-sym - 1) as usize] = text.to_string();
        }
    }

    /// Append the textual form of a symbol to `out`. Epsilon appends
    /// nothing; a character symbol may be uppercased on the way out.
    pub fn get_symbol(&self, out: &mut String, sym: Symbol, uppercase: bool) {
        if sym == 0 {
            return;
        }
        if sym < 0 {
            out.push_str(self.tag_name(sym));
        } else if let Some(c) = char::from_u32(sym as u32) {
            out.push(if uppercase { to_upper(c) } else { c });
        }
    }

    /// Write the textual form of a symbol to a byte stream.
    pub fn write_symbol<W: Write>(&self, sym: Symbol, out: &mut W) -> std::io::Result<()> {
        let mut buf = String::new();
        self.get_symbol(&mut buf, sym, false);
        out.write_all(buf.as_bytes())
    }

    /// Split `text` into symbol codes; `<...>` spans are interned on demand.
    pub fn tokenize(&mut self, text: &str) -> Vec<Symbol> {
        let mut result = Vec::new();
        for span in SymbolIter::new(text) {
            if span.chars().count() > 1 {
                self.include_symbol(span);
                result.push(self.tag_code(span));
            } else if let Some(c) = span.chars().next() {
                result.push(symbol::from_char(c));
            }
        }
        result
    }

    /// Cross-alphabet symbol equality.
    ///
    /// Character codes compare directly; tags compare by name. When
    /// `allow_anys` is set, the `<ANY_CHAR>` and `<ANY_TAG>` pseudo-tags on
    /// either side match any character or any tag respectively.
    pub fn same_symbol(
        &self,
        sym: Symbol,
        other: &Alphabet,
        other_sym: Symbol,
        allow_anys: bool,
    ) -> bool {
        if sym >= 0 && sym == other_sym {
            return true;
        }
        if sym < 0 && other_sym < 0 && self.tag_name(sym) == other.tag_name(other_sym) {
            return true;
        }
        if allow_anys {
            if sym < 0 {
                let name = self.tag_name(sym);
                if (name == symbol::ANY_CHAR && other_sym > 0)
                    || (name == symbol::ANY_TAG && other_sym < 0)
                {
                    return true;
                }
            }
            if other_sym < 0 {
                let name = other.tag_name(other_sym);
                if (name == symbol::ANY_CHAR && sym > 0)
                    || (name == symbol::ANY_TAG && sym < 0)
                {
                    return true;
                }
            }
        }
        false
    }

    /// All pair codes whose input symbol is `sym`.
    pub fn symbols_where_left_is(&self, sym: Symbol) -> BTreeSet<i32> {
        self.pairs_inv
            .iter()
            .enumerate()
            .filter(|&(_, &(l, _))| l == sym)
            .map(|(code, _)| code as i32)
            .collect()
    }

    /// Collect identity pairs over one side of every pair in `basis`.
    ///
    /// Tags seen on the requested side of `basis` are interned here by name
    /// so both alphabets share the spelling; character symbols keep the same
    /// code across alphabets and are included only when `non_tags_too`. The
    /// resulting codes refer to `self` and label the "anything goes on one
    /// side" loops used by trimming.
    pub fn create_loopback_symbols(
        &mut self,
        symbols: &mut BTreeSet<i32>,
        basis: &Alphabet,
        side: Side,
        non_tags_too: bool,
    ) {
        let mut tags: BTreeSet<Symbol> = BTreeSet::new();
        for &(l, r) in &basis.pairs_inv {
            let sym = match side {
                Side::Left => l,
                Side::Right => r,
            };
            if basis.is_tag(sym) {
                tags.insert(sym);
            } else if non_tags_too {
                symbols.insert(self.pair(sym, sym));
            }
        }
        for sym in tags {
            let name = basis.tag_name(sym).to_string();
            self.include_symbol(&name);
            let code = self.tag_code(&name);
            symbols.insert(self.pair(code, code));
        }
    }

    /// Serialize: tag names stripped of their brackets, then the pair list
    /// with both fields biased by the tag count so they are non-negative.
    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), FstError> {
        codec::write_int(self.tags_inv.len() as u32, output)?;
        for name in &self.tags_inv {
            let stripped: String = name
                .chars()
                .skip(1)
                .take(name.chars().count().saturating_sub(2))
                .collect();
            codec::write_string(&stripped, output)?;
        }
        let bias = self.tags_inv.len() as i64;
        codec::write_int(self.pairs_inv.len() as u32, output)?;
        for &(l, r) in &self.pairs_inv {
            codec::write_int((l as i64 + bias) as u32, output)?;
            codec::write_int((r as i64 + bias) as u32, output)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self, FstError> {
        let mut alphabet = Alphabet {
            tags: HashMap::new(),
            tags_inv: Vec::new(),
            pairs: HashMap::new(),
            pairs_inv: Vec::new(),
        };
        let tag_count = codec::read_int(input)?;
        for _ in 0..tag_count {
            let name = format!("<{}>", codec::read_string(input)?);
            let code = -(alphabet.tags_inv.len() as Symbol + 1);
            alphabet.tags.insert(name.clone(), code);
            alphabet.tags_inv.push(name);
        }
        let bias = alphabet.tags_inv.len() as i64;
        let pair_count = codec::read_int(input)?;
        for _ in 0..pair_count {
            let l = (codec::read_int(input)? as i64 - bias) as Symbol;
            let r = (codec::read_int(input)? as i64 - bias) as Symbol;
            let code = alphabet.pairs_inv.len() as i32;
            alphabet.pairs.insert((l, r), code);
            alphabet.pairs_inv.push((l, r));
        }
        Ok(alphabet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn epsilon_pair_is_zero() {
        let mut a = Alphabet::new();
        assert_eq!(a.pair(0, 0), 0);
        assert_eq!(a.decode(0), (0, 0));
    }

    #[test]
    fn tag_codes_are_negative_in_order() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        a.include_symbol("<vblex>");
        a.include_symbol("<n>"); // idempotent
        assert_eq!(a.tag_code("<n>"), -1);
        assert_eq!(a.tag_code("<vblex>"), -2);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn lookup_flavours() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        assert_eq!(a.tag_code("<adj>"), 0);
        assert!(!a.is_symbol_defined("<adj>"));
        assert_eq!(a.tag_code_checked("<adj>"), None);
        assert_eq!(a.tag_code_checked("<n>"), Some(-1));
    }

    #[test]
    fn pair_codes_are_stable() {
        let mut a = Alphabet::new();
        let p1 = a.pair('a' as Symbol, 'b' as Symbol);
        let p2 = a.pair('b' as Symbol, 'a' as Symbol);
        assert_eq!(p1, 1);
        assert_eq!(p2, 2);
        assert_eq!(a.pair('a' as Symbol, 'b' as Symbol), p1);
        assert_eq!(a.decode(p1), ('a' as Symbol, 'b' as Symbol));
        assert_eq!(a.decode(p2), ('b' as Symbol, 'a' as Symbol));
    }

    #[test]
    fn get_symbol_forms() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        let mut buf = String::new();
        a.get_symbol(&mut buf, 'x' as Symbol, false);
        a.get_symbol(&mut buf, 0, false);
        a.get_symbol(&mut buf, -1, false);
        a.get_symbol(&mut buf, 'y' as Symbol, true);
        assert_eq!(buf, "x<n>Y");
    }

    #[test]
    fn write_symbol_to_stream() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        let mut out = Vec::new();
        a.write_symbol('x' as Symbol, &mut out).unwrap();
        a.write_symbol(-1, &mut out).unwrap();
        a.write_symbol(0, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x<n>");
    }

    #[test]
    fn tokenize_mixes_chars_and_tags() {
        let mut a = Alphabet::new();
        let codes = a.tokenize("ab<n>");
        assert_eq!(codes, vec!['a' as Symbol, 'b' as Symbol, -1]);
        // a second pass reuses the interned tag
        assert_eq!(a.tokenize("<n>"), vec![-1]);
    }

    #[test]
    fn same_symbol_cross_alphabet() {
        let mut a = Alphabet::new();
        let mut b = Alphabet::new();
        a.include_symbol("<n>");
        b.include_symbol("<vblex>");
        b.include_symbol("<n>");
        assert!(a.same_symbol('k' as Symbol, &b, 'k' as Symbol, false));
        assert!(a.same_symbol(-1, &b, -2, false)); // both <n>
        assert!(!a.same_symbol(-1, &b, -1, false)); // <n> vs <vblex>
    }

    #[test]
    fn any_pseudo_tags() {
        let mut a = Alphabet::new();
        a.include_symbol("<ANY_CHAR>");
        a.include_symbol("<ANY_TAG>");
        let mut b = Alphabet::new();
        b.include_symbol("<n>");
        assert!(a.same_symbol(-1, &b, 'x' as Symbol, true));
        assert!(!a.same_symbol(-1, &b, -1, true));
        assert!(a.same_symbol(-2, &b, -1, true));
        assert!(!a.same_symbol(-2, &b, 'x' as Symbol, true));
        assert!(!a.same_symbol(-1, &b, 'x' as Symbol, false));
    }

    #[test]
    fn symbols_where_left_is_scans_pairs() {
        let mut a = Alphabet::new();
        let p1 = a.pair('a' as Symbol, 'x' as Symbol);
        a.pair('b' as Symbol, 'x' as Symbol);
        let p3 = a.pair('a' as Symbol, 'y' as Symbol);
        let found = a.symbols_where_left_is('a' as Symbol);
        assert_eq!(found, BTreeSet::from([p1, p3]));
    }

    #[test]
    fn loopback_symbols_share_tag_names() {
        let mut mono = Alphabet::new();
        mono.include_symbol("<n>");
        mono.pair('c' as Symbol, 'c' as Symbol);
        mono.pair('c' as Symbol, -1); // c:<n>
        let mut bi = Alphabet::new();
        bi.include_symbol("<vblex>");
        let mut loops = BTreeSet::new();
        bi.create_loopback_symbols(&mut loops, &mono, Side::Right, false);
        // <n> was interned into bi under a new code
        let code = bi.tag_code("<n>");
        assert!(code < 0);
        assert_eq!(loops.len(), 1);
        let pair_code = *loops.iter().next().unwrap();
        assert_eq!(bi.decode(pair_code), (code, code));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        a.include_symbol("<pl>");
        a.pair('h' as Symbol, 'h' as Symbol);
        a.pair('s' as Symbol, -1);
        a.pair(-2, 0);

        let mut buf = Vec::new();
        a.write(&mut buf).unwrap();
        let b = Alphabet::read(&mut Cursor::new(buf)).unwrap();

        assert_eq!(b.len(), 2);
        assert_eq!(b.tag_code("<n>"), -1);
        assert_eq!(b.tag_code("<pl>"), -2);
        assert_eq!(b.pair_count(), a.pair_count());
        for code in 0..a.pair_count() as i32 {
            assert_eq!(a.decode(code), b.decode(code));
        }
    }
}
