//! Audio assembly.
//!
//! Collects the per-turn artifacts of a working directory, orders them by
//! the numeric index in their names and concatenates them into one WAV
//! file.

use std::cmp::Ordering;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::error::PodcastError;

/// One run of a file name: either digits (compared by value) or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSegment {
    Digits(u128),
    Text(String),
}

impl Ord for NameSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NameSegment::Digits(a), NameSegment::Digits(b)) => a.cmp(b),
            (NameSegment::Text(a), NameSegment::Text(b)) => a.cmp(b),
            (NameSegment::Digits(_), NameSegment::Text(_)) => Ordering::Less,
            (NameSegment::Text(_), NameSegment::Digits(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for NameSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a file name into alternating digit and text runs.
///
/// `"10_Brian.mp3"` becomes `[Digits(10), Text("_Brian.mp3")]`, so `9_x`
/// sorts before `10_x`.
pub fn natural_sort_key(name: &str) -> Vec<NameSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let flush = |run: &mut String, digits: bool, out: &mut Vec<NameSegment>| {
        if run.is_empty() {
            return;
        }
        let segment = if digits {
            // Runs too long for u128 still order sensibly as text.
            match run.parse::<u128>() {
                Ok(n) => NameSegment::Digits(n),
                Err(_) => NameSegment::Text(run.clone()),
            }
        } else {
            NameSegment::Text(run.clone())
        };
        out.push(segment);
        run.clear();
    };

    for c in name.chars() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits {
            flush(&mut current, in_digits, &mut segments);
            in_digits = is_digit;
        }
        current.push(c);
    }
    flush(&mut current, in_digits, &mut segments);

    segments
}

/// Natural ordering of two file names, falling back to plain comparison on
/// ties (e.g. `"01"` vs `"1"`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_sort_key(a)
        .cmp(&natural_sort_key(b))
        .then_with(|| a.cmp(b))
}

/// List the artifact files of a directory in natural order.
///
/// Subdirectories and dotfiles are ignored.
pub fn discover_artifacts(dir: &Path) -> Result<Vec<PathBuf>, PodcastError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PodcastError::Assembly(format!("Cannot read {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    let unreadable =
        |e: std::io::Error| PodcastError::Assembly(format!("Cannot read {}: {}", dir.display(), e));

    for entry in entries {
        let entry = entry.map_err(unreadable)?;
        if !entry.file_type().map_err(unreadable)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        files.push((name, entry.path()));
    }

    files.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// PCM audio held in memory as interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    fn format_label(&self) -> String {
        format!("{} Hz / {} ch", self.sample_rate, self.channels)
    }

    /// Append another clip. Sample rate and channel count must match.
    pub fn append(&mut self, other: DecodedAudio, source: &Path) -> Result<(), PodcastError> {
        if other.sample_rate != self.sample_rate || other.channels != self.channels {
            return Err(PodcastError::IncompatibleFormat {
                path: source.to_path_buf(),
                expected: self.format_label(),
                found: other.format_label(),
            });
        }
        self.samples.extend(other.samples);
        Ok(())
    }
}

/// Decode an audio file of any supported container into PCM.
pub fn decode_artifact(path: &Path) -> Result<DecodedAudio, PodcastError> {
    let fail = |reason: String| PodcastError::Assembly(format!("{}: {}", path.display(), reason));

    let src = File::open(path).map_err(|e| fail(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| fail(format!("unrecognized audio: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no decodable audio track".to_string()))?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|e| fail(format!("unsupported codec: {}", e)))?;

    let track_id = track.id;
    let expected_frames = track.codec_params.n_frames;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();
    let mut frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(fail(e.to_string())),
        };

        while !format.metadata().is_latest() {
            format.metadata().pop();
        }

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                frames += (buf.samples().len() / spec.channels.count().max(1)) as u64;
                samples.extend_from_slice(buf.samples());
            }
            // A dropped packet would silently shorten the turn.
            Err(SymphoniaError::DecodeError(e)) => {
                return Err(fail(format!("corrupt packet after {} frames: {}", frames, e)));
            }
            Err(e) => return Err(fail(e.to_string())),
        }
    }

    if frames == 0 {
        return Err(fail("no audio frames decoded".to_string()));
    }
    if let Some(expected) = expected_frames.filter(|&n| frames < n) {
        return Err(fail(format!(
            "truncated: decoded {} of {} frames",
            frames, expected
        )));
    }

    match (sample_rate, channels) {
        (Some(sample_rate), Some(channels)) if sample_rate > 0 && channels > 0 => {
            Ok(DecodedAudio {
                samples,
                sample_rate,
                channels,
            })
        }
        _ => Err(fail("unknown sample rate or channel layout".to_string())),
    }
}

fn wav_spec(audio: &DecodedAudio) -> hound::WavSpec {
    hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode PCM as a 16-bit WAV file in memory.
pub fn encode_wav(audio: &DecodedAudio) -> Result<Vec<u8>, PodcastError> {
    let fail = |e: hound::Error| PodcastError::Assembly(format!("WAV encoding failed: {}", e));

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(audio)).map_err(fail)?;
        for &sample in &audio.samples {
            writer.write_sample(to_i16(sample)).map_err(fail)?;
        }
        writer.finalize().map_err(fail)?;
    }
    Ok(cursor.into_inner())
}

/// Write PCM as a 16-bit WAV file, replacing any existing file and creating
/// missing parent directories.
pub fn write_wav(path: &Path, audio: &DecodedAudio) -> Result<(), PodcastError> {
    let fail =
        |e: std::io::Error| PodcastError::Assembly(format!("Cannot write {}: {}", path.display(), e));

    let bytes = encode_wav(audio)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }
    std::fs::write(path, bytes).map_err(fail)
}

/// Result of one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySummary {
    pub output: PathBuf,
    /// Merged files in playback order.
    pub files: Vec<PathBuf>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

/// Merge already-ordered artifact files.
///
/// With no files the result is an empty clip in the fallback format.
pub fn merge_files(
    files: &[PathBuf],
    fallback_sample_rate: u32,
    fallback_channels: u16,
) -> Result<DecodedAudio, PodcastError> {
    let mut iter = files.iter();
    let mut merged = match iter.next() {
        Some(first) => decode_artifact(first)?,
        None => return Ok(DecodedAudio::empty(fallback_sample_rate, fallback_channels)),
    };

    for path in iter {
        let clip = decode_artifact(path)?;
        merged.append(clip, path)?;
    }

    Ok(merged)
}

/// Concatenate every artifact in `dir` into `output`.
///
/// An empty directory is not an error: it produces a valid zero-length WAV.
/// Callers that consider an empty conversation a failure must check earlier.
pub fn assemble_directory(
    dir: &Path,
    output: &Path,
    fallback_sample_rate: u32,
    fallback_channels: u16,
) -> Result<AssemblySummary, PodcastError> {
    let files = discover_artifacts(dir)?;
    debug!(count = files.len(), dir = %dir.display(), "discovered artifacts");

    let merged = merge_files(&files, fallback_sample_rate, fallback_channels)?;

    write_wav(output, &merged)?;

    let duration = merged.duration();
    info!(
        files = files.len(),
        ?duration,
        output = %output.display(),
        "assembled podcast"
    );

    Ok(AssemblySummary {
        output: output.to_path_buf(),
        files,
        sample_rate: merged.sample_rate,
        channels: merged.channels,
        duration,
    })
}
