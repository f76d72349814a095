#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Bar-aligned sequence generator
//!
//! Reads commands from stdin, one per line, and prints what each one produced.
//!
//! ## Usage
//!
//! The input is just an enum with a `serde::Deserialize` impl, deserialized
//! with [RON](https://github.com/ron-rs/ron), so for the available commands see
//! the `Command` enum. For example:
//!
//! ```text
//! SecondsPerBar(90.0)
//! Window(3, true, Midi("primer.mid"))
//! Generate((model: drums_rnn, generator: drum_kit, bars: 4, start_with_primer: true))
//! ListGenerators
//! Concatenate(["a.mid", "b.mid"], Some(2), "output/merge.mid")
//! Split("output/merge.mid", 2, "output/pieces")
//! ```
//!
//! `Generate` writes `<model>_<generator>_<timestamp>.mid` into the request's
//! `output_dir` (`output/` unless set) and prints the path. See `filetests/` for
//! more complete inputs.
//!
//! A bad line is reported and skipped, the rest of the input still runs. Logging
//! goes through `env_logger`, so set `RUST_LOG=info` to see what the generators
//! are doing.

use bar_sequencer::{
    error::{Error, Result},
    generator::REGISTRY,
    pipeline::{self, GenerationRequest, Primer},
    timing::{self, GenerationWindow},
};
use serde::Deserialize;
use std::{
    fmt,
    io::{self, BufRead},
    path::PathBuf,
};

/// A command from the command line. We just parse this using `serde` and RON,
/// instead of inventing our own command language.
#[derive(Deserialize, Debug, Clone, PartialEq)]
enum Command {
    /// Generate new material and save it as a MIDI file.
    Generate(GenerationRequest),
    /// Print the window that `Generate` would fill for the given number of bars,
    /// whether to start after the primer, and the primer. Step-pattern primers are
    /// read at the default tempo.
    Window(u32, bool, Primer),
    /// Print the length of one bar, in seconds, at the given quarters per minute.
    SecondsPerBar(f64),
    /// Print every registered model/generator pair.
    ListGenerators,
    /// Join MIDI files end to end into the last path. With a number of bars, each
    /// input is padded out to that many bars.
    Concatenate(Vec<PathBuf>, Option<u32>, PathBuf),
    /// Cut a MIDI file into pieces of the given number of bars, written into the
    /// given directory.
    Split(PathBuf, u32, PathBuf),
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
enum Output {
    /// Path of a freshly written MIDI file
    Saved(PathBuf),
    /// Paths of several freshly written MIDI files
    SavedAll(Vec<PathBuf>),
    /// A generation window
    Window(GenerationWindow),
    /// Seconds in one bar
    SecondsPerBar(f64),
    /// One line per registered generator
    Generators(Vec<String>),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Saved(path) => write!(f, "saved {}", path.display()),
            Output::SavedAll(paths) => {
                let lines = paths
                    .iter()
                    .map(|path| format!("saved {}", path.display()))
                    .collect::<Vec<_>>();
                write!(f, "{}", lines.join("\n"))
            }
            Output::Window(window) => write!(f, "({}, {})", window.start_time, window.end_time),
            Output::SecondsPerBar(seconds) => write!(f, "{}", seconds),
            Output::Generators(lines) => write!(f, "{}", lines.join("\n")),
        }
    }
}

/// Parse one line of input.
fn parse(line: &str) -> Result<Command> {
    ron::from_str(line).map_err(|e| Error::BadCommand(e.to_string()))
}

/// Run one command.
fn execute(cmd: Command) -> Result<Output> {
    match cmd {
        Command::Generate(request) => pipeline::run(&request).map(Output::Saved),
        Command::Window(bars, start_with_primer, primer) => {
            let primer = primer.load(timing::DEFAULT_QUARTERS_PER_MINUTE)?;
            timing::generation_window(bars, &primer, start_with_primer).map(Output::Window)
        }
        Command::SecondsPerBar(qpm) => timing::seconds_per_bar(qpm).map(Output::SecondsPerBar),
        Command::ListGenerators => Ok(Output::Generators(
            REGISTRY
                .iter()
                .map(|entry| {
                    format!(
                        "{} {} ({}): {}",
                        entry.model,
                        entry.generator,
                        entry.generator.bundle_name(),
                        (entry.construct)().details().description
                    )
                })
                .collect(),
        )),
        Command::Concatenate(inputs, bars_each, output) => {
            pipeline::concatenate_files(&inputs, bars_each, &output).map(Output::Saved)
        }
        Command::Split(input, bars, output_dir) => {
            pipeline::split_file(&input, bars, &output_dir).map(Output::SavedAll)
        }
    }
}

fn main() {
    env_logger::init();

    let stdin = io::stdin();
    let stdin = stdin.lock();

    for line in stdin.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("failed to read stdin: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse(&line).and_then(execute) {
            Ok(output) => println!("{}", output),
            Err(e) => log::error!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{execute, parse, Command, Output};
    use bar_sequencer::{error::Error, midi, timing::GenerationWindow};

    // Generated output is random, so rather than comparing bytes we read every file
    // back and check it against the window the same input asks for.
    #[test]
    fn filetests() {
        use std::{ffi::OsStr, fs, path::PathBuf};

        let mut filetest_count = 0;

        let filetest_dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/filetests"));
        let output_dir = tempfile::tempdir().unwrap();

        for file in fs::read_dir(&filetest_dir).unwrap() {
            let file = file.unwrap();
            let path = file.path();

            if path.extension() == Some(OsStr::new("input")) {
                filetest_count += 1;

                let input = fs::read_to_string(&path).unwrap();
                let mut window = None;

                for line in input.lines().filter(|line| !line.trim().is_empty()) {
                    let cmd = match parse(line).unwrap() {
                        Command::Generate(mut request) => {
                            request.output_dir = output_dir.path().to_owned();
                            Command::Generate(request)
                        }
                        other => other,
                    };

                    match execute(cmd).unwrap() {
                        Output::Window(w) => window = Some(w),
                        Output::Saved(midi_path) => {
                            let GenerationWindow { end_time, .. } =
                                window.expect("each input sets a window before generating");
                            let seq = midi::read_midi(&midi_path).unwrap();

                            assert!(!seq.is_empty(), "{:?} wrote no notes", path);
                            for note in seq.notes() {
                                assert!(note.end_time <= end_time + 1e-2, "{:?}: {:?}", path, note);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        assert_eq!(filetest_count, 3);
    }

    #[test]
    fn bad_lines_are_errors() {
        assert!(matches!(parse("Generate(("), Err(Error::BadCommand(_))));
        assert!(matches!(parse("Jump(3)"), Err(Error::BadCommand(_))));
        assert!(matches!(
            execute(parse("SecondsPerBar(0.0)").unwrap()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn joins_and_splits_files() {
        use bar_sequencer::sequence::{Note, NoteSequence};

        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("part.mid");
        let mut seq = NoteSequence::new();
        seq.add_tempo(0., 120.);
        seq.push_note(Note::new(60, 100, 0., 1.5));
        midi::write_midi(&seq, &part).unwrap();

        let joined = dir.path().join("joined.mid");
        let cmd = parse(&format!(
            "Concatenate([{:?}, {:?}], Some(1), {:?})",
            part, part, joined
        ))
        .unwrap();
        assert_eq!(execute(cmd).unwrap(), Output::Saved(joined.clone()));

        let cmd = Command::Split(joined, 1, dir.path().join("pieces"));
        match execute(cmd).unwrap() {
            Output::SavedAll(paths) => assert_eq!(paths.len(), 2),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn window_without_primer() {
        assert_eq!(
            execute(parse("Window(3, false, Empty)").unwrap()).unwrap(),
            Output::Window(GenerationWindow {
                start_time: 0.,
                end_time: 6.,
            })
        );
    }

    #[test]
    fn lists_every_generator() {
        match execute(Command::ListGenerators).unwrap() {
            Output::Generators(lines) => {
                assert_eq!(lines.len(), 5);
                assert!(lines[0].starts_with("melody_rnn basic_rnn (basic_rnn.mag)"));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }
}
