//! WAV file audio source and debug dumps.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use crate::audio::source::AudioSource;
use crate::defaults;
use crate::error::{Result, SottoError};

/// Audio source that reads from WAV data.
///
/// Accepts arbitrary sample rates and channel counts, mixing down to mono
/// and resampling to the pipeline rate up front. Samples are then served
/// in fixed chunks so file input drives the segmenter exactly like a live
/// device would.
pub struct WavAudioSource {
    samples: Vec<i16>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Create from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to parse WAV data: {}", e),
            })?;

        let spec = wav_reader.spec();
        let raw: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to read WAV samples: {}", e),
            })?;

        let mono = mix_to_mono(&raw, spec.channels);
        let samples = if spec.sample_rate == defaults::SAMPLE_RATE {
            mono
        } else {
            resample(&mono, spec.sample_rate, defaults::SAMPLE_RATE)
        };

        Ok(Self {
            samples,
            position: 0,
            chunk_size: frame_samples(defaults::SAMPLE_RATE, defaults::FRAME_MS),
        })
    }

    /// Create from a file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(Box::new(file))
    }

    /// Create from stdin.
    pub fn from_stdin() -> Result<Self> {
        use std::io::Cursor;

        // StdinLock is not Send, so read everything into memory first.
        let mut buffer = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buffer)?;
        Self::from_reader(Box::new(Cursor::new(buffer)))
    }

    /// Serve samples in chunks of this many samples per read.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Total duration of the loaded audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / defaults::SAMPLE_RATE as u64
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Number of samples in one frame at the given rate.
pub fn frame_samples(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as usize * frame_ms as usize) / 1000
}

/// Writes samples to a 16-bit mono WAV file, for debug dumps of
/// finalized utterances.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let file = BufWriter::new(File::create(path)?);
    let mut writer =
        hound::WavWriter::new(file, spec).map_err(|e| SottoError::Other(format!(
            "failed to create WAV writer: {}",
            e
        )))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| SottoError::Other(format!("failed to write WAV sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| SottoError::Other(format!("failed to finalize WAV file: {}", e)))?;
    Ok(())
}

pub(crate) fn mix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn from_reader_16khz_mono_matches_exactly() {
        let input = vec![100i16, 200, 300, 400, 500];
        let wav_data = make_wav_data(16000, 1, &input);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data))).unwrap();
        assert_eq!(source.samples, input);
    }

    #[test]
    fn from_reader_stereo_downmixes_to_mono() {
        // Stereo pairs: (100, 200), (300, 400), (500, 600)
        let stereo = vec![100i16, 200, 300, 400, 500, 600];
        let wav_data = make_wav_data(16000, 2, &stereo);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data))).unwrap();
        assert_eq!(source.samples, vec![150i16, 350, 550]);
    }

    #[test]
    fn from_reader_48khz_resamples_to_16khz() {
        let input = vec![1000i16; 48000]; // 1 second at 48kHz
        let wav_data = make_wav_data(48000, 1, &input);

        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data))).unwrap();
        assert!(source.samples.len() >= 15900 && source.samples.len() <= 16100);
        assert!(source.samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn read_samples_serves_frame_sized_chunks() {
        let input = vec![1i16; 1000];
        let wav_data = make_wav_data(16000, 1, &input);

        let mut source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data)))
            .unwrap()
            .with_chunk_size(320);

        assert_eq!(source.read_samples().unwrap().len(), 320);
        assert_eq!(source.read_samples().unwrap().len(), 320);
        assert_eq!(source.read_samples().unwrap().len(), 320);
        // Remaining 40 samples.
        assert_eq!(source.read_samples().unwrap().len(), 40);
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn wav_source_is_finite() {
        let wav_data = make_wav_data(16000, 1, &[0i16; 10]);
        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data))).unwrap();
        assert!(source.is_finite());
    }

    #[test]
    fn invalid_wav_data_returns_error() {
        let garbage = vec![0u8, 1, 2, 3, 4, 5];
        let result = WavAudioSource::from_reader(Box::new(Cursor::new(garbage)));

        match result {
            Err(SottoError::StreamInterrupted { message }) => {
                assert!(message.contains("failed to parse WAV"));
            }
            other => panic!("expected StreamInterrupted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_data_returns_error() {
        assert!(WavAudioSource::from_reader(Box::new(Cursor::new(Vec::new()))).is_err());
    }

    #[test]
    fn duration_reflects_loaded_samples() {
        let wav_data = make_wav_data(16000, 1, &vec![0i16; 8000]);
        let source = WavAudioSource::from_reader(Box::new(Cursor::new(wav_data))).unwrap();
        assert_eq!(source.duration_ms(), 500);
    }

    #[test]
    fn frame_samples_at_common_rates() {
        assert_eq!(frame_samples(16000, 20), 320);
        assert_eq!(frame_samples(16000, 100), 1600);
        assert_eq!(frame_samples(48000, 20), 960);
    }

    #[test]
    fn write_wav_round_trips_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.wav");
        let samples = vec![0i16, 1000, -1000, 500];

        write_wav(&path, &samples, 16000).unwrap();

        let source = WavAudioSource::from_path(&path).unwrap();
        assert_eq!(source.samples, samples);
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0i16, 1000, 2000], 8000, 16000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_downsample_halves_length() {
        let resampled = resample(&vec![0i16; 3200], 16000, 8000);
        assert_eq!(resampled.len(), 1600);
    }

    #[test]
    fn resample_handles_empty_and_single() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[100i16], 16000, 8000), vec![100]);
    }

    #[test]
    fn mix_to_mono_handles_negative_values() {
        assert_eq!(mix_to_mono(&[-100, 100, 300, -300], 2), vec![0i16, 0]);
    }
}
