// ltk-proc: run a compiled dictionary over a text stream in one of the
// processing modes.
//
// Usage:
//   ltk-proc [MODE] [OPTIONS] fst_file [input_file [output_file]]
//
// Modes:
//   -a, --analysis          morphological analysis (default)
//   -b, --bilingual         bilingual lookup over an analyzed stream
//   -o, --surf-bilingual    bilingual lookup with surface forms in the input
//   -g, --generation        generation
//   -e, --decompose         analysis with compound decomposition
//   -p, --post-generation   post-generation rewriting
//   -t, --transliteration   transliteration (no tilde handling)
//   -s, --sao               SAO-style analysis
//
// Generation output (imply -g):
//   -d, --debugged-gen  -l, --tagged-gen  -m, --tagged-nm-gen
//   -n, --non-marked-gen  -C, --careful-case
//
// Options:
//   -c, --case-sensitive    -w, --dictionary-case   -z, --null-flush
//   -I, --no-default-ignore -W, --show-weights
//   -N N, --analyses N      -L N, --weight-classes N
//   -M N, --compound-max-elements N

use ltk_stream::input::InputText;
use ltk_stream::processor::{FstProcessor, GenerationMode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

const VALUE_OPTIONS: &[&str] = &[
    "-N",
    "--analyses",
    "-L",
    "--weight-classes",
    "-M",
    "--compound-max-elements",
];

fn usage() -> ! {
    eprintln!("usage: ltk-proc [MODE] [OPTIONS] fst_file [input_file [output_file]]");
    eprintln!("run `ltk-proc --help` for the full option list");
    std::process::exit(1);
}

fn set_cmd(c: u8, current: &mut u8) {
    if *current != 0 && *current != c {
        usage();
    }
    *current = c;
}

fn parse_count(args: &[String], short: &str, long: &str) -> Option<usize> {
    ltk_cli::value_of(args, short, long).map(|v| match v.parse::<usize>() {
        Ok(n) if n >= 1 => n,
        _ => ltk_cli::fatal(&format!("invalid value for {long}: '{v}'")),
    })
}

fn main() {
    ltk_cli::init_logger();
    let args: Vec<String> = std::env::args().skip(1).collect();

    if ltk_cli::wants_help(&args) {
        println!("ltk-proc: drive a compiled dictionary over a text stream.");
        println!();
        println!("usage: ltk-proc [MODE] [OPTIONS] fst_file [input_file [output_file]]");
        println!();
        println!("modes:");
        println!("  -a, --analysis          morphological analysis (default)");
        println!("  -b, --bilingual         bilingual lookup");
        println!("  -o, --surf-bilingual    bilingual lookup with surface forms");
        println!("  -g, --generation        generation");
        println!("  -e, --decompose         analysis with compound decomposition");
        println!("  -p, --post-generation   post-generation rewriting");
        println!("  -t, --transliteration   transliteration");
        println!("  -s, --sao               SAO-style analysis");
        println!();
        println!("generation output (imply -g):");
        println!("  -d, --debugged-gen      keep all marks");
        println!("  -l, --tagged-gen        tagged output");
        println!("  -m, --tagged-nm-gen     tagged output without marks");
        println!("  -n, --non-marked-gen    clean output");
        println!("  -C, --careful-case      lowercase only as a fallback");
        println!();
        println!("options:");
        println!("  -c, --case-sensitive    no case folding");
        println!("  -w, --dictionary-case   use dictionary case on output");
        println!("  -z, --null-flush        flush output on \\0");
        println!("  -I, --no-default-ignore do not skip soft hyphens");
        println!("  -W, --show-weights      print <W:...> weights");
        println!("  -N N, --analyses N      print at most N analyses");
        println!("  -L N, --weight-classes N  print at most N weight classes");
        println!("  -M N, --compound-max-elements N");
        return;
    }

    let mut cmd = 0u8;

    if ltk_cli::flag(&args, "-a", "--analysis") {
        set_cmd(b'a', &mut cmd);
    }
    if ltk_cli::flag(&args, "-b", "--bilingual") {
        set_cmd(b'b', &mut cmd);
    }
    let surf_bilingual = ltk_cli::flag(&args, "-o", "--surf-bilingual");
    if surf_bilingual {
        set_cmd(b'b', &mut cmd);
    }
    if ltk_cli::flag(&args, "-g", "--generation") {
        set_cmd(b'g', &mut cmd);
    }
    if ltk_cli::flag(&args, "-e", "--decompose") {
        set_cmd(b'e', &mut cmd);
    }
    if ltk_cli::flag(&args, "-p", "--post-generation") {
        set_cmd(b'p', &mut cmd);
    }
    if ltk_cli::flag(&args, "-t", "--transliteration")
        || ltk_cli::flag(&args, "-x", "--inter-generation")
    {
        set_cmd(b't', &mut cmd);
    }
    if ltk_cli::flag(&args, "-s", "--sao") {
        set_cmd(b's', &mut cmd);
    }

    let mut genmode = GenerationMode::Unknown;
    for (short, long, mode) in [
        ("-d", "--debugged-gen", GenerationMode::All),
        ("-l", "--tagged-gen", GenerationMode::Tagged),
        ("-m", "--tagged-nm-gen", GenerationMode::TaggedNoMark),
        ("-n", "--non-marked-gen", GenerationMode::Clean),
        ("-C", "--careful-case", GenerationMode::CarefulCase),
    ] {
        if ltk_cli::flag(&args, short, long) {
            if cmd == 0 {
                cmd = b'g';
            }
            genmode = mode;
        }
    }

    let files = ltk_cli::positional(&args, VALUE_OPTIONS);
    if files.is_empty() {
        usage();
    }

    let dict = std::fs::read(&files[0])
        .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot read '{}': {e}", files[0])));
    let mut processor = FstProcessor::load(&mut io::Cursor::new(dict))
        .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot load '{}': {e}", files[0])));

    processor.settings.case_sensitive = ltk_cli::flag(&args, "-c", "--case-sensitive");
    processor.settings.dictionary_case = ltk_cli::flag(&args, "-w", "--dictionary-case");
    processor.settings.null_flush = ltk_cli::flag(&args, "-z", "--null-flush");
    processor.settings.use_default_ignored_chars =
        !ltk_cli::flag(&args, "-I", "--no-default-ignore");
    processor.settings.display_weights = ltk_cli::flag(&args, "-W", "--show-weights");
    processor.settings.bilingual_surface_forms = surf_bilingual;
    if let Some(n) = parse_count(&args, "-N", "--analyses") {
        processor.settings.max_analyses = n;
    }
    if let Some(n) = parse_count(&args, "-L", "--weight-classes") {
        processor.settings.max_weight_classes = n;
    }
    if let Some(n) = parse_count(&args, "-M", "--compound-max-elements") {
        processor.settings.compound_max_elements = n;
    }

    let reader: Box<dyn Read> = match files.get(1) {
        Some(name) if name != "-" => Box::new(BufReader::new(
            File::open(name)
                .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot open '{name}': {e}"))),
        )),
        _ => Box::new(io::stdin().lock()),
    };
    let mut input = InputText::new(reader);

    let mut output: Box<dyn Write> = match files.get(2) {
        Some(name) if name != "-" => Box::new(BufWriter::new(
            File::create(name)
                .unwrap_or_else(|e| ltk_cli::fatal(&format!("cannot create '{name}': {e}"))),
        )),
        _ => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let check_validity = |p: &FstProcessor| {
        if !p.valid() {
            ltk_cli::fatal("invalid dictionary");
        }
    };

    let result = match cmd {
        b'g' => {
            processor.init_generation();
            check_validity(&processor);
            processor.generation(&mut input, &mut output, genmode)
        }
        b'p' => {
            processor.init_postgeneration();
            check_validity(&processor);
            processor.postgeneration(&mut input, &mut output)
        }
        b't' => {
            processor.init_postgeneration();
            check_validity(&processor);
            processor.transliteration(&mut input, &mut output)
        }
        b'b' => {
            processor.init_biltrans();
            check_validity(&processor);
            processor.bilingual(&mut input, &mut output, genmode)
        }
        b'e' => {
            match processor.init_decomposition() {
                Ok(()) => {}
                Err(e) => ltk_cli::fatal(&e.to_string()),
            }
            check_validity(&processor);
            processor.analysis(&mut input, &mut output)
        }
        b's' => {
            match processor.init_sao() {
                Ok(()) => {}
                Err(e) => ltk_cli::fatal(&e.to_string()),
            }
            check_validity(&processor);
            processor.sao(&mut input, &mut output)
        }
        _ => {
            match processor.init_analysis() {
                Ok(()) => {}
                Err(e) => ltk_cli::fatal(&e.to_string()),
            }
            check_validity(&processor);
            processor.analysis(&mut input, &mut output)
        }
    };

    if let Err(e) = result {
        let _ = output.flush();
        ltk_cli::fatal(&e.to_string());
    }
    if let Err(e) = output.flush() {
        ltk_cli::fatal(&e.to_string());
    }
}
