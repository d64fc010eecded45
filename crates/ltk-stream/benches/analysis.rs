// Criterion benchmark for the analysis fast path.
//
// A synthetic dictionary of short words is built in-process, so the bench
// needs no external data files.
//
// Run:
//   cargo bench -p ltk-stream

use criterion::{criterion_group, criterion_main, Criterion};
use ltk_core::symbol::Symbol;
use ltk_fst::alphabet::Alphabet;
use ltk_fst::container::write_transducer_set;
use ltk_fst::transducer::{Transducer, DEFAULT_WEIGHT};
use ltk_stream::input::InputText;
use ltk_stream::processor::FstProcessor;
use std::io::Cursor;

// ---------------------------------------------------------------------------
// Synthetic dictionary
// ---------------------------------------------------------------------------

const WORDS: &[&str] = &[
    "casa", "caso", "cosa", "gato", "gata", "perro", "perra", "sol", "mar",
    "pan", "vino", "agua", "luz", "red", "ala", "alas", "ola", "olas",
];

fn build_dictionary() -> Vec<u8> {
    let mut alphabet = Alphabet::new();
    alphabet.include_symbol("<n>");
    let n = alphabet.tag_code("<n>");

    let mut main = Transducer::new();
    for word in WORDS {
        let mut state = main.get_initial();
        for c in word.chars() {
            let pair = alphabet.pair(c as Symbol, c as Symbol);
            state = main.insert_single_transduction(pair, state, DEFAULT_WEIGHT);
        }
        let pair = alphabet.pair(0, n);
        state = main.insert_new_single_transduction(pair, state, DEFAULT_WEIGHT);
        main.set_final(state, DEFAULT_WEIGHT);
    }
    main.minimize(0).expect("minimize");

    let mut buf = Vec::new();
    write_transducer_set(
        &mut buf,
        "acdegilmnoprstuvz",
        &alphabet,
        &[("main@standard".to_string(), &main)],
        false,
    )
    .expect("container");
    buf
}

fn build_input() -> String {
    let mut text = String::new();
    for _ in 0..200 {
        for word in WORDS {
            text.push_str(word);
            text.push(' ');
        }
    }
    text.push('\n');
    text
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_analysis(c: &mut Criterion) {
    let container = build_dictionary();
    let text = build_input();

    c.bench_function("analysis_throughput", |b| {
        b.iter(|| {
            let mut processor =
                FstProcessor::load(&mut Cursor::new(container.clone())).unwrap();
            processor.init_analysis().unwrap();
            let mut input = InputText::new(Cursor::new(text.as_bytes().to_vec()));
            let mut output: Vec<u8> = Vec::with_capacity(text.len() * 4);
            processor.analysis(&mut input, &mut output).unwrap();
            output
        })
    });
}

fn bench_load(c: &mut Criterion) {
    let container = build_dictionary();
    c.bench_function("container_load", |b| {
        b.iter(|| FstProcessor::load(&mut Cursor::new(container.clone())).unwrap())
    });
}

criterion_group!(benches, bench_analysis, bench_load);
criterion_main!(benches);
