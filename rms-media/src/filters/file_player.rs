//! WAV file player
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use super::filter_error;
use crate::block::MediaBlock;
use crate::error::{MediaError, MediaResult};
use crate::events::EofNotification;
use crate::filter::{Filter, FilterIo, FilterKind, FilterMethod};
use crate::memory::MemoryHooks;
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerState {
    Closed,
    Opened,
    Playing,
    Finished,
}

/// Decoded file contents, downmixed to mono
struct LoadedFile {
    path: PathBuf,
    samples: Vec<i16>,
    sample_rate: u32,
}

/// Plays a WAV file as 16-bit PCM, one tick worth of samples per tick
///
/// Emits a single end-of-file notification when the last sample has been
/// produced.
pub struct FilePlayerFilter {
    memory: Arc<dyn MemoryHooks>,
    state: PlayerState,
    file: Option<LoadedFile>,
    output_channels: u8,
    output_rate: Option<u32>,
    rendered: Vec<i16>,
    position: usize,
    eof: Option<EofNotification>,
    eof_sent: bool,
}

impl FilePlayerFilter {
    pub fn new(memory: Arc<dyn MemoryHooks>) -> Self {
        FilePlayerFilter {
            memory,
            state: PlayerState::Closed,
            file: None,
            output_channels: 1,
            output_rate: None,
            rendered: Vec::new(),
            position: 0,
            eof: None,
            eof_sent: false,
        }
    }

    /// Whether playback reached the end of the file
    pub fn is_finished(&self) -> bool {
        self.state == PlayerState::Finished
    }

    fn error(&self, reason: impl Into<String>) -> MediaError {
        filter_error(FilterKind::FilePlayer, reason)
    }

    fn open(&mut self, path: PathBuf) -> MediaResult<()> {
        let (samples, sample_rate) = read_wav_mono(&path)?;
        debug!(
            path = %path.display(),
            samples = samples.len(),
            sample_rate,
            "Audio file opened"
        );
        self.file = Some(LoadedFile {
            path,
            samples,
            sample_rate,
        });
        self.rendered.clear();
        self.position = 0;
        self.eof_sent = false;
        self.state = PlayerState::Opened;
        Ok(())
    }

    fn start(&mut self) -> MediaResult<()> {
        let Some(file) = &self.file else {
            return Err(self.error("start without an open file"));
        };
        let rate = self.output_rate.unwrap_or(file.sample_rate);
        self.rendered = resample(&file.samples, file.sample_rate, rate);
        self.position = 0;
        self.eof_sent = false;
        self.state = PlayerState::Playing;
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
        self.rendered = Vec::new();
        self.position = 0;
        self.state = PlayerState::Closed;
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
            .or_else(|| self.file.as_ref().map(|f| f.sample_rate))
            .unwrap_or(8000)
    }

    fn finish(&mut self) {
        self.state = PlayerState::Finished;
        if self.eof_sent {
            return;
        }
        self.eof_sent = true;
        let path = self
            .file
            .as_ref()
            .map(|f| f.path.display().to_string())
            .unwrap_or_default();
        info!(path = %path, "End of file reached");
        if let Some(eof) = &self.eof {
            eof.notify();
        }
    }
}

impl Filter for FilePlayerFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::FilePlayer
    }

    fn process(&mut self, io: &mut FilterIo) -> MediaResult<()> {
        if self.state != PlayerState::Playing {
            return Ok(());
        }

        let per_tick = ((self.output_rate() as u64 * io.tick.interval_ms) / 1000).max(1) as usize;
        let end = (self.position + per_tick).min(self.rendered.len());
        let chunk = &self.rendered[self.position..end];

        if !chunk.is_empty() {
            let block = if self.output_channels == 2 {
                let stereo: Vec<i16> = chunk.iter().flat_map(|s| [*s, *s]).collect();
                MediaBlock::from_samples(&self.memory, &stereo, self.position as u32)
            } else {
                MediaBlock::from_samples(&self.memory, chunk, self.position as u32)
            };
            io.push_output(0, block);
        }
        self.position = end;

        if self.position >= self.rendered.len() {
            self.finish();
        }
        Ok(())
    }

    fn call_method(&mut self, method: FilterMethod) -> MediaResult<()> {
        match method {
            FilterMethod::Open(path) => self.open(path),
            FilterMethod::SetOutputChannels(channels) => match channels {
                1 | 2 => {
                    self.output_channels = channels;
                    Ok(())
                }
                other => Err(self.error(format!("unsupported channel count {}", other))),
            },
            FilterMethod::SetSampleRate(0) => Err(self.error("sample rate must be non-zero")),
            FilterMethod::SetSampleRate(rate) => {
                self.output_rate = Some(rate);
                Ok(())
            }
            FilterMethod::Start => self.start(),
            FilterMethod::Close => {
                self.close();
                Ok(())
            }
            FilterMethod::NotifyOnEof(notification) => {
                self.eof = Some(notification);
                Ok(())
            }
            FilterMethod::SetSession(_) => Err(MediaError::UnsupportedMethod {
                filter: self.kind().name().to_string(),
                method: "set-session".to_string(),
            }),
        }
    }
}

/// Read a WAV file as mono 16-bit samples, averaging channels
fn read_wav_mono(path: &Path) -> MediaResult<(Vec<i16>, u32)> {
    let mut reader = WavReader::open(path)
        .map_err(|e| MediaError::Playback(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(MediaError::Playback(format!(
            "{}: invalid format",
            path.display()
        )));
    }

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| i16::from(v) << 8))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) if bits > 16 && bits <= 32 => {
            let shift = bits - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(MediaError::Playback(format!(
                "{}: unsupported sample format {:?}/{} bits",
                path.display(),
                format,
                bits
            )))
        }
    };

    let channels = spec.channels as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|s| i32::from(*s)).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };
    Ok((mono, spec.sample_rate))
}

/// Linear interpolation resampler
fn resample(input: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || input.is_empty() {
        return input.to_vec();
    }
    let out_len = (input.len() as u64 * u64::from(to) / u64::from(from)) as usize;
    let step = f64::from(from) / f64::from(to);
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = f64::from(input[idx]);
            let b = f64::from(input.get(idx + 1).copied().unwrap_or(input[idx]));
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}
