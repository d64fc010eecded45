// ltk-cli: shared utilities for the command-line tools.

use std::process;

/// Exit with a message on stderr.
pub fn fatal(message: &str) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

/// True when `-h` or `--help` was given.
pub fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "-h" || a == "--help")
}

/// True when the short or long flag was given.
pub fn flag(args: &[String], short: &str, long: &str) -> bool {
    args.iter().any(|a| a == short || a == long)
}

/// The value of `-X N` / `--opt N` / `--opt=N`, if given.
pub fn value_of(args: &[String], short: &str, long: &str) -> Option<String> {
    let long_eq = format!("{long}=");
    for (i, arg) in args.iter().enumerate() {
        if arg == short || arg == long {
            return args.get(i + 1).cloned();
        }
        if let Some(v) = arg.strip_prefix(&long_eq) {
            return Some(v.to_string());
        }
    }
    None
}

/// The positional (non-flag) arguments, skipping option values.
pub fn positional(args: &[String], options_with_value: &[&str]) -> Vec<String> {
    let mut result = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if options_with_value.contains(&arg.as_str()) {
            skip = true;
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            continue;
        }
        result.push(arg.clone());
    }
    result
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().to_string().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Route library diagnostics to stderr.
pub fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Warn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_and_values() {
        let a = args(&["-z", "--analyses", "3", "dict.bin", "in.txt"]);
        assert!(flag(&a, "-z", "--null-flush"));
        assert!(!flag(&a, "-c", "--case-sensitive"));
        assert_eq!(value_of(&a, "-N", "--analyses"), Some("3".to_string()));
        assert_eq!(
            positional(&a, &["-N", "--analyses"]),
            args(&["dict.bin", "in.txt"])
        );
    }

    #[test]
    fn long_equals_form() {
        let a = args(&["--analyses=5"]);
        assert_eq!(value_of(&a, "-N", "--analyses"), Some("5".to_string()));
    }
}
