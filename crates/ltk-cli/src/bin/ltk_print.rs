// ltk-print: dump a compiled dictionary in ATT format.
//
// Usage:
//   ltk-print fst_file [output_file]
//
// Each section is printed as tab-separated transition lines followed by
// its final states, with a `-- name` header line between sections.

use ltk_fst::alphabet::Alphabet;
use ltk_fst::codec;
use ltk_fst::headers::{self, container_features, HEADER_CONTAINER};
use ltk_fst::transducer::Transducer;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

fn read_sections<R: Read>(
    input: &mut R,
) -> Result<(Alphabet, Vec<(String, Transducer)>), ltk_fst::FstError> {
    headers::read_header(&HEADER_CONTAINER, container_features::UNKNOWN, input)?;
    let _letters = codec::read_string(input)?;
    let alphabet = Alphabet::read(input)?;
    let count = codec::read_int(input)?;
    let mut sections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = codec::read_string(input)?;
        let transducer = Transducer::read(input, 0)?;
        sections.push((name, transducer));
    }
    Ok((alphabet, sections))
}

fn main() {
    ltk_cli::init_logger();
    let args: Vec<String> = std::env::args().skip(1).collect();

    if ltk_cli::wants_help(&args) || args.is_empty() {
        println!("ltk-print: dump a compiled dictionary in ATT format.");
        println!();
        println!("usage: ltk-print fst_file [output_file]");
        return;
    }

    let files = ltk_cli::positional(&args, &[]);
    if files.is_empty() {
        ltk_cli::fatal("no input file given");
    }

    let file = File::open(&files[0])
        .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot open '{}': {e}", files[0])));
    let mut reader = BufReader::new(file);
    let (alphabet, sections) = read_sections(&mut reader)
        .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot load '{}': {e}", files[0])));

    let mut output: Box<dyn Write> = match files.get(1) {
        Some(name) if name != "-" => Box::new(BufWriter::new(
            File::create(name)
                .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot create '{name}': {e}"))),
        )),
        _ => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for (i, (name, transducer)) in sections.iter().enumerate() {
        if i > 0 {
            let _ = writeln!(output, "--");
        }
        let _ = writeln!(output, "-- {name}");
        if let Err(e) = transducer.show(&alphabet, &mut output) {
            ltk_cli::fatal(&e.to_string());
        }
    }
    if let Err(e) = output.flush() {
        ltk_cli::fatal(&e.to_string());
    }
}
