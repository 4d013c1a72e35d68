//! `mmlplay` renders Music Macro Language scores to WAV files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use fmsynth_core::dsp::algorithm::Algorithm;
use fmsynth_core::error::{MmlError, SynthError};
use fmsynth_core::parser::MmlConfig;
use fmsynth_core::player::{PlayerConfig, parse_parts, render_score};
use fmsynth_core::preset::PresetDescriptor;
use fmsynth_core::scale::note_name;
use fmsynth_core::token::MmlEvent;
use log::info;

/// Two-hand waltz played when no score is given.
const DEMO_SCORE: &str = "
T180 L8 O5 V90
R4 D+C+ R4 <A+ > D+C+ <A+4 > D+C+ <F+ > D+C+ <F+4 > D+C+ <F+4 >
C+<B+> C+D+ C+<B+ A+4 > D+C+ <A+ > D+C+ <A+4 > D+C+ <F+ > D+C+ <F+4
;
T180 L4 O3 V70
R2 [F+A+]2 [F+A+] [F+A+]2 [F+A+] [F+A+]2 [F+A+] [F+A+]2 [F+A+]
[G+B+]2 [G+B+] [G+B+]2 [G+B+] [F+A+]2 [F+A+] [F+A+]2
";

#[derive(Parser, Debug)]
#[command(name = "mmlplay", version, about = "Render MML scores with the FM synthesizer")]
struct Args {
    /// MML file to render. Plays a demo tune when omitted.
    input: Option<PathBuf>,

    /// Score given on the command line instead of a file
    #[arg(short, long, conflicts_with = "input")]
    score: Option<String>,

    /// Output WAV file
    #[arg(short, long, default_value = "out.wav")]
    output: PathBuf,

    /// Print the parsed events (durations in ms) instead of rendering
    #[arg(short, long)]
    events: bool,

    /// Operator algorithm: 0 (plain), 1 (feedback) or 2 (stacked)
    #[arg(short, long, default_value = "0")]
    mode: Algorithm,

    /// JSON carrier preset; overrides --mode
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Master volume, 0-100
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: u8,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Initial tempo in BPM
    #[arg(long, default_value_t = 120)]
    tempo: u32,

    /// Initial octave
    #[arg(long, default_value_t = 4)]
    octave: i32,

    /// Initial default note length
    #[arg(long, default_value_t = 4)]
    length: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (name, source) = match (&args.input, &args.score) {
        (Some(path), _) => (
            path.display().to_string(),
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        (None, Some(score)) => ("<score>".to_string(), score.clone()),
        (None, None) => ("<demo>".to_string(), DEMO_SCORE.to_string()),
    };

    let preset = args.preset.as_deref().map(load_preset).transpose()?;
    let config = PlayerConfig {
        sample_rate: args.sample_rate,
        channels: args.channels,
        algorithm: args.mode,
        preset,
        tempo: args.tempo,
        octave: args.octave,
        length: args.length,
        volume: args.volume as f32 / 100.0,
        ..PlayerConfig::default()
    };
    config.validate()?;

    if args.events {
        return print_events(&name, &source, &config);
    }

    let pcm = match render_score(&source, &config) {
        Ok(pcm) => pcm,
        Err(SynthError::Mml(e)) => return Err(syntax_error(&name, &source, &e)),
        Err(e) => return Err(e.into()),
    };
    write_wav(&args.output, &pcm, &config)?;

    let seconds = pcm.len() as f32 / (config.channels as f32 * config.sample_rate as f32);
    info!("algorithm {}, {} samples", config.algorithm, pcm.len());
    println!("Wrote {} ({seconds:.2} s)", args.output.display());
    Ok(())
}

fn load_preset(path: &Path) -> anyhow::Result<PresetDescriptor> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let preset = PresetDescriptor::from_json(&json).with_context(|| format!("loading {}", path.display()))?;
    info!("using preset '{}' ({} operators)", preset.name, preset.carrier.operator_count());
    Ok(preset)
}

fn syntax_error(name: &str, source: &str, e: &MmlError) -> anyhow::Error {
    eprint!("{}", e.report(name, source));
    anyhow::anyhow!("cannot parse {name}: {e}")
}

fn print_events(name: &str, source: &str, config: &PlayerConfig) -> anyhow::Result<()> {
    let mml_config = MmlConfig {
        tick_rate: 1000,
        ..config.mml_config()
    };
    let parts = match parse_parts(source, &mml_config) {
        Ok(parts) => parts,
        Err(e) => return Err(syntax_error(name, source, &e)),
    };
    if parts.is_empty() {
        bail!("{name} contains no notes");
    }

    for part in parts {
        println!("Part {}:", part.part);
        for spanned in part.events {
            let at = spanned.span.start;
            match spanned.event {
                MmlEvent::Note { note, ticks } => println!("{at:>6}  {:<8} {ticks} ms", note_name(note)),
                MmlEvent::Chord { notes, ticks } => {
                    let names: Vec<String> = notes.into_iter().map(note_name).collect();
                    println!("{at:>6}  [{}] {ticks} ms", names.join(" "));
                }
                MmlEvent::Rest { ticks } => println!("{at:>6}  {:<8} {ticks} ms", "rest"),
                other => println!("{at:>6}  {other:?}"),
            }
        }
    }
    Ok(())
}

fn write_wav(path: &Path, pcm: &[i16], config: &PlayerConfig) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &sample in pcm {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
