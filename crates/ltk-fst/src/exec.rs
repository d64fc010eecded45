// Read-optimized transducer: flat arrays, offset-indexed transitions.

use crate::alphabet::Alphabet;
use crate::codec;
use crate::headers::{self, transducer_features, HEADER_TRANSDUCER};
use crate::transducer::Transducer;
use crate::FstError;
use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;
use ltk_core::symbol::Symbol;
use std::io::{Read, Write};

/// One executable transition. The fixed-width binary form stores this
/// struct verbatim in little-endian field order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transition {
    pub isym: Symbol,
    pub osym: Symbol,
    pub dest: u64,
    pub weight: f64,
}

/// A final state and its weight.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Final {
    pub state: u64,
    pub weight: f64,
}

/// Executable transducer.
///
/// `transitions[offsets[s] .. offsets[s+1]]` are the out-edges of state `s`,
/// sorted by `(isym, osym)`, so the edges matching one input symbol form a
/// contiguous range found by binary search. `finals` is sorted by state.
#[derive(Debug, Clone, Default)]
pub struct TransducerExe {
    pub initial: u64,
    pub state_count: u64,
    finals: Vec<Final>,
    offsets: Vec<u64>,
    transitions: Vec<Transition>,
}

impl TransducerExe {
    /// Flatten a builder transducer. State ids must be dense.
    pub fn from_transducer(t: &Transducer, alphabet: &Alphabet) -> Self {
        let state_count = t.len() as u64;
        let mut offsets = Vec::with_capacity(state_count as usize + 1);
        let mut transitions = Vec::new();
        for (_, edges) in t.states() {
            offsets.push(transitions.len() as u64);
            let mut local: Vec<Transition> = Vec::new();
            for (&tag, dests) in edges {
                let (isym, osym) = alphabet.decode(tag);
                for &(dest, weight) in dests {
                    local.push(Transition { isym, osym, dest: dest as u64, weight });
                }
            }
            local.sort_by(|a, b| (a.isym, a.osym).cmp(&(b.isym, b.osym)));
            transitions.extend(local);
        }
        offsets.push(transitions.len() as u64);

        let finals = t
            .finals()
            .iter()
            .map(|(&state, &weight)| Final { state: state as u64, weight })
            .collect();

        TransducerExe {
            initial: t.get_initial() as u64,
            state_count,
            finals,
            offsets,
            transitions,
        }
    }

    /// Read either binary body form, dispatching on the header feature bits.
    pub fn read<R: Read>(input: &mut R, alphabet: &Alphabet) -> Result<Self, FstError> {
        let features =
            headers::read_header(&HEADER_TRANSDUCER, transducer_features::UNKNOWN, input)?;
        if features & transducer_features::MMAP != 0 {
            Self::read_fixed(input)
        } else {
            Self::read_compressed(
                input,
                alphabet,
                features & transducer_features::WEIGHTS != 0,
            )
        }
    }

    fn read_compressed<R: Read>(
        input: &mut R,
        alphabet: &Alphabet,
        weighted: bool,
    ) -> Result<Self, FstError> {
        let initial = codec::read_int(input)? as u64;

        let final_count = codec::read_int(input)?;
        let mut finals = Vec::with_capacity(final_count as usize);
        let mut state_base = 0u64;
        for _ in 0..final_count {
            state_base += codec::read_int(input)? as u64;
            let weight = if weighted { codec::read_double(input)? } else { 0.0 };
            finals.push(Final { state: state_base, weight });
        }

        let state_count = codec::read_int(input)? as u64;
        let mut offsets = Vec::with_capacity(state_count as usize + 1);
        let mut transitions = Vec::new();
        for state in 0..state_count {
            offsets.push(transitions.len() as u64);
            let edge_count = codec::read_int(input)?;
            let mut local: Vec<Transition> = Vec::with_capacity(edge_count as usize);
            let mut tag_base = 0i32;
            for _ in 0..edge_count {
                tag_base += codec::read_int(input)? as i32;
                let dest = (state + codec::read_int(input)? as u64) % state_count;
                let weight = if weighted { codec::read_double(input)? } else { 0.0 };
                let (isym, osym) = alphabet.decode(tag_base);
                local.push(Transition { isym, osym, dest, weight });
            }
            local.sort_by(|a, b| (a.isym, a.osym).cmp(&(b.isym, b.osym)));
            transitions.extend(local);
        }
        offsets.push(transitions.len() as u64);

        Ok(TransducerExe { initial, state_count, finals, offsets, transitions })
    }

    /// Write the fixed-width little-endian body for zero-copy loading.
    pub fn write_fixed<W: Write>(&self, output: &mut W) -> Result<(), FstError> {
        headers::write_header(&HEADER_TRANSDUCER, transducer_features::MMAP, output)?;
        headers::write_u64_le(self.initial, output)?;
        headers::write_u64_le(self.state_count, output)?;
        headers::write_u64_le(self.finals.len() as u64, output)?;
        headers::write_u64_le(self.transitions.len() as u64, output)?;
        output.write_all(bytemuck::cast_slice(&self.finals))?;
        output.write_all(bytemuck::cast_slice(&self.offsets))?;
        output.write_all(bytemuck::cast_slice(&self.transitions))?;
        Ok(())
    }

    fn read_fixed<R: Read>(input: &mut R) -> Result<Self, FstError> {
        let initial = headers::read_u64_le(input)?;
        let state_count = headers::read_u64_le(input)?;
        let final_count = headers::read_u64_le(input)? as usize;
        let transition_count = headers::read_u64_le(input)? as usize;

        fn read_pod_vec<T: Pod + Zeroable, R: Read>(
            input: &mut R,
            count: usize,
        ) -> Result<Vec<T>, FstError> {
            // copy into an owned, properly aligned buffer
            let mut vec = vec![T::zeroed(); count];
            let bytes = bytemuck::cast_slice_mut::<T, u8>(&mut vec);
            input.read_exact(bytes).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    FstError::Truncated
                } else {
                    FstError::Io(e)
                }
            })?;
            Ok(vec)
        }

        let finals = read_pod_vec::<Final, R>(input, final_count)?;
        let offsets = read_pod_vec::<u64, R>(input, state_count as usize + 1)?;
        let transitions = read_pod_vec::<Transition, R>(input, transition_count)?;

        Ok(TransducerExe { initial, state_count, finals, offsets, transitions })
    }

    /// The out-edges of `state` whose input symbol is `symbol`.
    pub fn get_range(&self, state: u64, symbol: Symbol) -> &[Transition] {
        let begin = self.offsets[state as usize] as usize;
        let end = self.offsets[state as usize + 1] as usize;
        let slice = &self.transitions[begin..end];
        let lower = slice.partition_point(|t| t.isym < symbol);
        let upper = slice.partition_point(|t| t.isym <= symbol);
        &slice[lower..upper]
    }

    /// The weight of `state` if it is final.
    pub fn find_final(&self, state: u64) -> Option<f64> {
        self.finals
            .binary_search_by(|f| f.state.cmp(&state))
            .ok()
            .map(|idx| self.finals[idx].weight)
    }

    pub fn is_final(&self, state: u64) -> bool {
        self.find_final(state).is_some()
    }

    pub fn finals(&self) -> &[Final] {
        &self.finals
    }

    /// Combine several sections into one automaton.
    ///
    /// States are renumbered section by section and a fresh root state is
    /// appended with an epsilon edge to every section's initial; the root
    /// becomes the combined initial. The second return value maps each
    /// section's final states (renumbered) to their weights.
    pub fn merge(sections: &[TransducerExe]) -> (TransducerExe, Vec<HashMap<u64, f64>>) {
        let total_states: u64 = sections.iter().map(|s| s.state_count).sum();
        let root = total_states;

        let mut finals = Vec::new();
        let mut offsets = Vec::with_capacity(total_states as usize + 2);
        let mut transitions = Vec::new();
        let mut section_finals = Vec::with_capacity(sections.len());

        let mut base = 0u64;
        for section in sections {
            for state in 0..section.state_count as usize {
                offsets.push(transitions.len() as u64);
                let begin = section.offsets[state] as usize;
                let end = section.offsets[state + 1] as usize;
                for t in &section.transitions[begin..end] {
                    transitions.push(Transition { dest: t.dest + base, ..*t });
                }
            }
            let mut map = HashMap::new();
            for f in &section.finals {
                finals.push(Final { state: f.state + base, weight: f.weight });
                map.insert(f.state + base, f.weight);
            }
            section_finals.push(map);
            base += section.state_count;
        }

        // root state: epsilon-branch to every section initial
        offsets.push(transitions.len() as u64);
        let mut base = 0u64;
        for section in sections {
            transitions.push(Transition {
                isym: 0,
                osym: 0,
                dest: section.initial + base,
                weight: 0.0,
            });
            base += section.state_count;
        }
        offsets.push(transitions.len() as u64);

        finals.sort_by_key(|f| f.state);

        let merged = TransducerExe {
            initial: root,
            state_count: total_states + 1,
            finals,
            offsets,
            transitions,
        };
        (merged, section_finals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transducer::DEFAULT_WEIGHT;
    use std::io::Cursor;

    fn cat_transducer(a: &mut Alphabet) -> Transducer {
        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for c in "cat".chars() {
            let tag = a.pair(c as Symbol, c as Symbol);
            state = t.insert_single_transduction(tag, state, DEFAULT_WEIGHT);
        }
        t.set_final(state, 0.5);
        t
    }

    #[test]
    fn flatten_and_query() {
        let mut a = Alphabet::new();
        let t = cat_transducer(&mut a);
        let exe = TransducerExe::from_transducer(&t, &a);

        assert_eq!(exe.state_count, 4);
        let range = exe.get_range(exe.initial, 'c' as Symbol);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].osym, 'c' as Symbol);
        assert!(exe.get_range(exe.initial, 'x' as Symbol).is_empty());

        let last = range[0].dest;
        assert!(!exe.is_final(last));
        let range = exe.get_range(last, 'a' as Symbol);
        let range = exe.get_range(range[0].dest, 't' as Symbol);
        assert_eq!(exe.find_final(range[0].dest), Some(0.5));
    }

    #[test]
    fn compressed_body_roundtrip() {
        let mut a = Alphabet::new();
        let t = cat_transducer(&mut a);
        let mut buf = Vec::new();
        t.write(&mut buf, 0).unwrap();

        let exe = TransducerExe::read(&mut Cursor::new(buf), &a).unwrap();
        assert_eq!(exe.state_count, 4);
        assert_eq!(exe.find_final(3), Some(0.5));
        assert_eq!(exe.get_range(exe.initial, 'c' as Symbol).len(), 1);
    }

    #[test]
    fn fixed_body_roundtrip() {
        let mut a = Alphabet::new();
        let t = cat_transducer(&mut a);
        let exe = TransducerExe::from_transducer(&t, &a);

        let mut buf = Vec::new();
        exe.write_fixed(&mut buf).unwrap();
        let back = TransducerExe::read(&mut Cursor::new(buf), &a).unwrap();

        assert_eq!(back.initial, exe.initial);
        assert_eq!(back.state_count, exe.state_count);
        assert_eq!(back.finals(), exe.finals());
        assert_eq!(back.get_range(0, 'c' as Symbol), exe.get_range(0, 'c' as Symbol));
    }

    #[test]
    fn fixed_body_truncation_is_fatal() {
        let mut a = Alphabet::new();
        let t = cat_transducer(&mut a);
        let exe = TransducerExe::from_transducer(&t, &a);
        let mut buf = Vec::new();
        exe.write_fixed(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(matches!(
            TransducerExe::read(&mut Cursor::new(buf), &a),
            Err(FstError::Truncated)
        ));
    }

    #[test]
    fn merge_adds_epsilon_root() {
        let mut a = Alphabet::new();
        let t1 = cat_transducer(&mut a);
        let mut t2 = Transducer::new();
        let tag = a.pair('d' as Symbol, 'd' as Symbol);
        let s = t2.insert_single_transduction(tag, t2.get_initial(), DEFAULT_WEIGHT);
        t2.set_final(s, DEFAULT_WEIGHT);

        let e1 = TransducerExe::from_transducer(&t1, &a);
        let e2 = TransducerExe::from_transducer(&t2, &a);
        let (merged, finals) = TransducerExe::merge(&[e1, e2]);

        assert_eq!(merged.state_count, 4 + 2 + 1);
        assert_eq!(merged.initial, 6);
        let eps = merged.get_range(merged.initial, 0);
        assert_eq!(eps.len(), 2);
        assert_eq!(finals.len(), 2);
        assert!(finals[0].contains_key(&3));
        assert!(finals[1].contains_key(&5));
        // the second section's edge survives renumbering
        let range = merged.get_range(4, 'd' as Symbol);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].dest, 5);
    }
}
