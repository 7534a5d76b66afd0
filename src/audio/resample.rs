//! Channel mixing and sample-rate conversion for outgoing audio chunks.
//!
//! Devices commonly capture stereo at 44.1 or 48 kHz; chunks are encoded as
//! mono at [`AudioConfig::sample_rate`](crate::config::AudioConfig).
//!
//! [`FrameResampler`] is stateful: it lives for a whole capture session, so
//! the filter phase carries over from one capture buffer to the next and the
//! output length tracks the input length exactly over time.

use std::time::Duration;

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

/// Input block size handed to rubato per `process` call.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// ResampleError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("cannot build resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),

    #[error("frame duration too short for {0} Hz")]
    EmptyFrame(u32),
}

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.
///
/// ```rust
/// use webchat_client::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// FrameResampler
// ---------------------------------------------------------------------------

/// Mono resampler that hands out fixed-length frames at the target rate.
///
/// Input of any length goes in through [`push`](Self::push); every time a
/// full frame of `frame` duration is available it is passed to `emit`.
pub struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    in_buf: Vec<f32>,
    frame_samples: usize,
    pending: Vec<f32>,
}

impl FrameResampler {
    pub fn new(source_rate: u32, target_rate: u32, frame: Duration) -> Result<Self, ResampleError> {
        let frame_samples = (target_rate as f64 * frame.as_secs_f64()).round() as usize;
        if frame_samples == 0 {
            return Err(ResampleError::EmptyFrame(target_rate));
        }

        let resampler = if source_rate == target_rate {
            None
        } else {
            Some(FftFixedIn::<f32>::new(
                source_rate as usize,
                target_rate as usize,
                RESAMPLER_CHUNK_SIZE,
                1,
                1,
            )?)
        };

        Ok(Self {
            resampler,
            source_rate,
            target_rate,
            in_buf: Vec::with_capacity(RESAMPLER_CHUNK_SIZE),
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Samples per emitted frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn push(&mut self, mut src: &[f32], mut emit: impl FnMut(&[f32])) -> Result<(), ResampleError> {
        let Some(resampler) = self.resampler.as_mut() else {
            Self::emit_frames(&mut self.pending, self.frame_samples, src, &mut emit);
            return Ok(());
        };

        while !src.is_empty() {
            let take = (RESAMPLER_CHUNK_SIZE - self.in_buf.len()).min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == RESAMPLER_CHUNK_SIZE {
                let out = resampler.process(&[&self.in_buf[..]], None)?;
                self.in_buf.clear();
                Self::emit_frames(&mut self.pending, self.frame_samples, &out[0], &mut emit);
            }
        }
        Ok(())
    }

    /// Flush buffered input.  The last frame is padded with silence.
    pub fn finish(&mut self, mut emit: impl FnMut(&[f32])) -> Result<(), ResampleError> {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.in_buf.is_empty() {
                let remaining = self.in_buf.len();
                self.in_buf.resize(RESAMPLER_CHUNK_SIZE, 0.0);
                let out = resampler.process(&[&self.in_buf[..]], None)?;
                self.in_buf.clear();

                // Keep only the part that corresponds to real input.
                let real = (remaining as u64 * self.target_rate as u64 / self.source_rate as u64)
                    as usize;
                let out = &out[0][..real.min(out[0].len())];
                Self::emit_frames(&mut self.pending, self.frame_samples, out, &mut emit);
            }
        }

        if !self.pending.is_empty() {
            self.pending.resize(self.frame_samples, 0.0);
            emit(&self.pending);
            self.pending.clear();
        }
        Ok(())
    }

    fn emit_frames(
        pending: &mut Vec<f32>,
        frame_samples: usize,
        mut data: &[f32],
        emit: &mut impl FnMut(&[f32]),
    ) {
        while !data.is_empty() {
            let take = (frame_samples - pending.len()).min(data.len());
            pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if pending.len() == frame_samples {
                emit(pending);
                pending.clear();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(20);

    /// Push `total` samples in `block`-sized buffers and count the output.
    fn run(source_rate: u32, total: usize, block: usize) -> (usize, usize) {
        let mut rs = FrameResampler::new(source_rate, 16_000, FRAME).unwrap();
        let input = vec![0.25_f32; total];
        let mut frames = 0;
        let mut samples = 0;
        for buf in input.chunks(block) {
            rs.push(buf, |f| {
                frames += 1;
                samples += f.len();
            })
            .unwrap();
        }
        (frames, samples)
    }

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_drops_partial_frame() {
        let out = downmix_to_mono(&[0.2_f32, 0.2, 0.9], 2);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn frame_length_follows_target_rate() {
        let rs = FrameResampler::new(48_000, 16_000, FRAME).unwrap();
        assert_eq!(rs.frame_samples(), 320);
        assert_eq!(rs.source_rate(), 48_000);
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        assert!(matches!(
            FrameResampler::new(48_000, 16_000, Duration::ZERO),
            Err(ResampleError::EmptyFrame(16_000))
        ));
    }

    #[test]
    fn same_rate_passes_samples_through_in_frames() {
        let (frames, samples) = run(16_000, 1_000, 333);
        assert_eq!(frames, 3);
        assert_eq!(samples, 960);
    }

    #[test]
    fn odd_ratio_does_not_drift_over_many_small_buffers() {
        // 10 s at 44.1 kHz in 512-frame buffers.  Only the resampler's
        // internal block and filter delay may be outstanding.
        let (_, samples) = run(44_100, 441_000, 512);
        assert!(samples <= 160_000, "produced {samples}");
        assert!(160_000 - samples < 2_000, "produced {samples}");
    }

    #[test]
    fn finish_pads_the_last_frame() {
        let mut rs = FrameResampler::new(16_000, 16_000, FRAME).unwrap();
        rs.push(&[0.5; 100], |_| panic!("no full frame yet")).unwrap();

        let mut tail = Vec::new();
        rs.finish(|f| tail.push(f.to_vec())).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].len(), 320);
        assert_eq!(tail[0][99], 0.5);
        assert_eq!(tail[0][100], 0.0);
    }

    #[test]
    fn finish_with_nothing_buffered_emits_nothing() {
        let mut rs = FrameResampler::new(48_000, 16_000, FRAME).unwrap();
        let mut emitted = 0;
        rs.finish(|_| emitted += 1).unwrap();
        assert_eq!(emitted, 0);
    }
}
