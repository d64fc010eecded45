// The compiled dictionary container: {letters, alphabet, named transducers}.

use crate::alphabet::Alphabet;
use crate::codec;
use crate::exec::TransducerExe;
use crate::headers::{self, container_features, HEADER_CONTAINER};
use crate::transducer::Transducer;
use crate::FstError;
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// A loaded container, with transducers in executable form.
#[derive(Debug, Default)]
pub struct TransducerSet {
    /// The characters the dictionary declares alphabetic.
    pub letters: BTreeSet<char>,
    pub alphabet: Alphabet,
    pub sections: Vec<(String, TransducerExe)>,
}

/// Write a container. With `mmap` the transducer bodies use the fixed-width
/// form; otherwise the delta-compressed form.
pub fn write_transducer_set<W: Write>(
    output: &mut W,
    letters: &str,
    alphabet: &Alphabet,
    sections: &[(String, &Transducer)],
    mmap: bool,
) -> Result<(), FstError> {
    let features = if mmap { container_features::MMAP } else { 0 };
    headers::write_header(&HEADER_CONTAINER, features, output)?;
    codec::write_string(letters, output)?;
    alphabet.write(output)?;
    codec::write_int(sections.len() as u32, output)?;
    for (name, transducer) in sections {
        codec::write_string(name, output)?;
        if mmap {
            TransducerExe::from_transducer(transducer, alphabet).write_fixed(output)?;
        } else {
            transducer.write(output, 0)?;
        }
    }
    Ok(())
}

/// Read a container into executable form. Both body forms are accepted;
/// each body's own header says which it uses.
pub fn read_transducer_set<R: Read>(input: &mut R) -> Result<TransducerSet, FstError> {
    headers::read_header(&HEADER_CONTAINER, container_features::UNKNOWN, input)?;

    let letters: BTreeSet<char> = codec::read_string(input)?.chars().collect();
    let alphabet = Alphabet::read(input)?;

    let count = codec::read_int(input)?;
    let mut sections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = codec::read_string(input)?;
        let exe = TransducerExe::read(input, &alphabet)?;
        sections.push((name, exe));
    }

    Ok(TransducerSet { letters, alphabet, sections })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transducer::DEFAULT_WEIGHT;
    use ltk_core::symbol::Symbol;
    use std::io::Cursor;

    fn sample() -> (Alphabet, Transducer) {
        let mut a = Alphabet::new();
        a.include_symbol("<n>");
        let n = a.tag_code("<n>");
        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for c in "sol".chars() {
            let tag = a.pair(c as Symbol, c as Symbol);
            state = t.insert_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        let tag = a.pair(0, n);
        state = t.insert_single_transduction(tag, state, DEFAULT_WEIGHT);
        t.set_final(state, DEFAULT_WEIGHT);
        (a, t)
    }

    #[test]
    fn roundtrip_compressed() {
        let (a, t) = sample();
        let mut buf = Vec::new();
        write_transducer_set(
            &mut buf,
            "slo",
            &a,
            &[("main@standard".to_string(), &t)],
            false,
        )
        .unwrap();

        let set = read_transducer_set(&mut Cursor::new(buf)).unwrap();
        assert_eq!(set.letters, BTreeSet::from(['s', 'l', 'o']));
        assert_eq!(set.alphabet.tag_code("<n>"), -1);
        assert_eq!(set.sections.len(), 1);
        assert_eq!(set.sections[0].0, "main@standard");
        let exe = &set.sections[0].1;
        assert_eq!(exe.get_range(exe.initial, 's' as Symbol).len(), 1);
    }

    #[test]
    fn roundtrip_fixed_width() {
        let (a, t) = sample();
        let mut buf = Vec::new();
        write_transducer_set(
            &mut buf,
            "slo",
            &a,
            &[("main@standard".to_string(), &t)],
            true,
        )
        .unwrap();

        let set = read_transducer_set(&mut Cursor::new(buf)).unwrap();
        let exe = &set.sections[0].1;
        assert_eq!(exe.state_count, 5);
        assert_eq!(exe.get_range(exe.initial, 's' as Symbol).len(), 1);
    }

    #[test]
    fn reject_garbage() {
        let buf = b"NOTAFILE".to_vec();
        assert!(matches!(
            read_transducer_set(&mut Cursor::new(buf)),
            Err(FstError::InvalidMagic(_))
        ));
    }

    #[test]
    fn reject_truncated_container() {
        let (a, t) = sample();
        let mut buf = Vec::new();
        write_transducer_set(&mut buf, "slo", &a, &[("x@standard".to_string(), &t)], false)
            .unwrap();
        buf.truncate(buf.len() / 2);
        assert!(read_transducer_set(&mut Cursor::new(buf)).is_err());
    }
}
