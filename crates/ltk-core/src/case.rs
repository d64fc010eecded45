// Per-character case mapping and surface-case detection.

use crate::symbol::Symbol;

/// Lowercase a character through the simple (one-to-one) mapping.
///
/// The full Unicode mappings can expand to several characters; the engine
/// only folds cased letters where the first scalar of the mapping is the
/// simple equivalent, so the remainder is dropped.
#[inline]
pub fn to_lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Uppercase a character through the simple (one-to-one) mapping.
#[inline]
pub fn to_upper(c: char) -> char {
    c.to_uppercase().next().unwrap_or(c)
}

#[inline]
pub fn is_upper(c: char) -> bool {
    c.is_uppercase()
}

/// Lowercase a symbol code; tags and epsilon pass through unchanged.
#[inline]
pub fn lower_symbol(sym: Symbol) -> Symbol {
    match char::from_u32(sym.max(0) as u32) {
        Some(c) if sym > 0 => to_lower(c) as Symbol,
        _ => sym,
    }
}

/// Uppercase a symbol code; tags and epsilon pass through unchanged.
#[inline]
pub fn upper_symbol(sym: Symbol) -> Symbol {
    match char::from_u32(sym.max(0) as u32) {
        Some(c) if sym > 0 => to_upper(c) as Symbol,
        _ => sym,
    }
}

/// True if the symbol is a character with uppercase form.
#[inline]
pub fn symbol_is_upper(sym: Symbol) -> bool {
    sym > 0 && char::from_u32(sym as u32).is_some_and(is_upper)
}

/// Case shape of a word, used to restore surface case on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CasePattern {
    /// The first character is uppercase.
    pub firstupper: bool,
    /// The whole word counts as uppercase.
    pub uppercase: bool,
}

/// Case shape of a surface form: uppercase when both the first and the last
/// character are uppercase.
pub fn surface_case(word: &str) -> CasePattern {
    let first = word.chars().next();
    let last = word.chars().next_back();
    let firstupper = first.is_some_and(is_upper);
    let uppercase =
        firstupper && word.chars().count() > 1 && last.is_some_and(is_upper);
    CasePattern { firstupper, uppercase }
}

/// Case shape of a lexical form: uppercase when the first two characters are
/// uppercase.
pub fn lexical_case(word: &str) -> CasePattern {
    let mut chars = word.chars();
    let firstupper = chars.next().is_some_and(is_upper);
    let uppercase = firstupper && chars.next().is_some_and(is_upper);
    CasePattern { firstupper, uppercase }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_mapping() {
        assert_eq!(to_lower('A'), 'a');
        assert_eq!(to_upper('a'), 'A');
        assert_eq!(to_lower('Ñ'), 'ñ');
        assert_eq!(to_upper('é'), 'É');
        assert_eq!(to_lower('3'), '3');
    }

    #[test]
    fn symbol_codes() {
        assert_eq!(lower_symbol('A' as Symbol), 'a' as Symbol);
        assert_eq!(upper_symbol('a' as Symbol), 'A' as Symbol);
        assert_eq!(lower_symbol(-4), -4);
        assert_eq!(upper_symbol(-4), -4);
        assert_eq!(lower_symbol(0), 0);
        assert!(symbol_is_upper('Q' as Symbol));
        assert!(!symbol_is_upper('q' as Symbol));
        assert!(!symbol_is_upper(-1));
    }

    #[test]
    fn surface_case_shapes() {
        assert_eq!(
            surface_case("cat"),
            CasePattern { firstupper: false, uppercase: false }
        );
        assert_eq!(
            surface_case("Cat"),
            CasePattern { firstupper: true, uppercase: false }
        );
        assert_eq!(
            surface_case("CAT"),
            CasePattern { firstupper: true, uppercase: true }
        );
        // only first and last characters are inspected
        assert_eq!(
            surface_case("CaT"),
            CasePattern { firstupper: true, uppercase: true }
        );
        assert_eq!(surface_case(""), CasePattern::default());
        assert_eq!(
            surface_case("C"),
            CasePattern { firstupper: true, uppercase: false }
        );
    }

    #[test]
    fn lexical_case_shapes() {
        assert_eq!(
            lexical_case("CAt"),
            CasePattern { firstupper: true, uppercase: true }
        );
        assert_eq!(
            lexical_case("Cat"),
            CasePattern { firstupper: true, uppercase: false }
        );
    }
}
