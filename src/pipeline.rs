//! One generation run from start to finish: pick the generator, load the primer,
//! work out the bar-aligned window, generate, and write the MIDI file.

use crate::{
    error::{Error, Result},
    generator::{self, GeneratorId, ModelName},
    midi,
    options::GeneratorOptions,
    primer::{self, DrumTrack, Melody, MelodyEvent},
    sequence::{NoteSequence, Pitch},
    timing::{self, GenerationWindow},
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Where the material for a primer comes from.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum Primer {
    /// No primer; the generator starts from nothing
    Empty,
    /// A MIDI file
    Midi(PathBuf),
    /// A drum pattern, one list of drum pitches per step
    Drums(Vec<Vec<Pitch>>),
    /// A monophonic melody, one event per step
    Melody(Vec<MelodyEvent>),
}

impl Default for Primer {
    fn default() -> Self {
        Primer::Empty
    }
}

impl Primer {
    /// Build the primer sequence. `qpm` is only used for step patterns, since MIDI
    /// files carry their own tempo.
    pub fn load(&self, qpm: f64) -> Result<NoteSequence> {
        let steps_per_quarter = timing::DEFAULT_STEPS_PER_QUARTER;

        match self {
            Primer::Empty => primer::load_primer(None),
            Primer::Midi(path) => primer::load_primer(Some(path)),
            Primer::Drums(steps) => {
                DrumTrack::from_steps(steps)?.to_sequence(qpm, steps_per_quarter)
            }
            Primer::Melody(events) => Melody(events.clone()).to_sequence(qpm, steps_per_quarter),
        }
    }
}

/// Default for `GenerationRequest::bars`
fn default_bars() -> u32 {
    1
}

/// Default for `GenerationRequest::temperature`
fn default_temperature() -> f64 {
    1.0
}

/// Default for the beam search parameters
fn one() -> usize {
    1
}

/// Default for `GenerationRequest::qpm`
fn default_qpm() -> f64 {
    timing::DEFAULT_QUARTERS_PER_MINUTE
}

/// Default for `GenerationRequest::output_dir`
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Everything needed for one generation run. Only `model` and `generator` are
/// required when this is parsed from RON.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The model family
    pub model: ModelName,
    /// The generator within the family
    pub generator: GeneratorId,
    /// Bars of new material
    #[serde(default = "default_bars")]
    pub bars: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Candidates kept by beam search
    #[serde(default = "one")]
    pub beam_size: usize,
    /// Continuations per candidate per iteration
    #[serde(default = "one")]
    pub branch_factor: usize,
    /// Steps per beam search iteration
    #[serde(default = "one")]
    pub steps_per_iteration: usize,
    /// What to prime the generator with
    #[serde(default)]
    pub primer: Primer,
    /// Tempo for primers built from step patterns
    #[serde(default = "default_qpm")]
    pub qpm: f64,
    /// Play the primer first and generate after it, instead of from the start
    #[serde(default)]
    pub start_with_primer: bool,
    /// Seed for reproducible output
    #[serde(default)]
    pub seed: Option<u64>,
    /// Directory the MIDI file is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl GenerationRequest {
    /// A request with every optional field at its default.
    pub fn new(model: ModelName, generator: GeneratorId) -> Self {
        GenerationRequest {
            model,
            generator,
            bars: default_bars(),
            temperature: default_temperature(),
            beam_size: one(),
            branch_factor: one(),
            steps_per_iteration: one(),
            primer: Primer::default(),
            qpm: default_qpm(),
            start_with_primer: false,
            seed: None,
            output_dir: default_output_dir(),
        }
    }

    /// The options to hand the generator for `window`.
    pub fn options(&self, window: GenerationWindow) -> GeneratorOptions {
        GeneratorOptions::for_window(window)
            .with_temperature(self.temperature)
            .with_beam(self.beam_size, self.branch_factor, self.steps_per_iteration)
            .with_seed(self.seed)
    }
}

/// Run the generator described by `request` and return what it produced.
pub fn generate_sequence(request: &GenerationRequest) -> Result<NoteSequence> {
    let mut generator = generator::build(request.model, request.generator)?;

    let primer = request.primer.load(request.qpm)?;
    let window = timing::generation_window(request.bars, &primer, request.start_with_primer)?;

    log::info!(
        "generating {} bar(s) with {}/{} from {:.3}s to {:.3}s",
        request.bars,
        request.model,
        request.generator,
        window.start_time,
        window.end_time
    );

    let sequence = generator.generate(&primer, &request.options(window))?;

    log::info!(
        "generated {} note(s), {:.3}s",
        sequence.notes().len(),
        sequence.total_time()
    );

    Ok(sequence)
}

/// The file name an output is saved under: model, generator and a timestamp.
pub fn output_file_name(model: ModelName, generator: GeneratorId, at: NaiveDateTime) -> String {
    format!("{}_{}_{}.mid", model, generator, at.format("%Y-%m-%d_%H%M%S"))
}

/// Write `sequence` into `output_dir`, creating the directory if needed, and return
/// the path of the new file.
pub fn save_sequence(
    sequence: &NoteSequence,
    model: ModelName,
    generator: GeneratorId,
    output_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let path = output_dir.join(output_file_name(
        model,
        generator,
        chrono::Local::now().naive_local(),
    ));

    midi::write_midi(sequence, &path)?;
    log::info!("wrote {:?}", path);

    Ok(path)
}

/// Generate and save in one go, returning the path of the MIDI file.
pub fn run(request: &GenerationRequest) -> Result<PathBuf> {
    let sequence = generate_sequence(request)?;
    save_sequence(&sequence, request.model, request.generator, &request.output_dir)
}

/// Join the MIDI files in `inputs` end to end and write the result to `output`.
///
/// With `bars_each`, every input takes up that many bars at its own tempo, so an
/// input that ends in a rest keeps its full length.
pub fn concatenate_files(
    inputs: &[PathBuf],
    bars_each: Option<u32>,
    output: &Path,
) -> Result<PathBuf> {
    let sequences = inputs
        .iter()
        .map(|path| midi::read_midi(path))
        .collect::<Result<Vec<_>>>()?;

    let durations = match bars_each {
        Some(0) => return Err(Error::invalid("each input must take at least one bar")),
        Some(bars) => Some(
            sequences
                .iter()
                .map(|seq| Ok(bars as f64 * timing::seconds_per_bar(seq.qpm())?))
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };

    let joined = NoteSequence::concatenate(&sequences, durations.as_deref())?;

    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    midi::write_midi(&joined, output)?;

    log::info!(
        "joined {} file(s) into {:?}, {:.3}s",
        inputs.len(),
        output,
        joined.total_time()
    );

    Ok(output.to_owned())
}

/// Cut the MIDI file at `input` into pieces of `bars` bars and write each one to
/// `output_dir` as `<stem>_<index>.mid`, returning the paths in order.
pub fn split_file(input: &Path, bars: u32, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let pieces = midi::read_midi(input)?.split_into_bars(bars)?;
    let stem = input
        .file_stem()
        .map_or_else(|| "piece".to_owned(), |stem| stem.to_string_lossy().into_owned());

    fs::create_dir_all(output_dir)?;

    let paths = pieces
        .iter()
        .enumerate()
        .map(|(index, piece)| {
            let path = output_dir.join(format!("{}_{}.mid", stem, index));
            midi::write_midi(piece, &path)?;
            Ok(path)
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!("split {:?} into {} piece(s)", input, paths.len());

    Ok(paths)
}
