//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin delivering [`CaptureBuffer`]s over an
//! mpsc channel.  The returned [`StreamHandle`] is a RAII guard: dropping it
//! stops the underlying cpal stream and releases the input device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use std::sync::mpsc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CaptureBuffer
// ---------------------------------------------------------------------------

/// One hardware buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]` regardless of the device's
/// native sample format.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate of this buffer in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value drops the `cpal::Stream`, which stops the hardware
/// stream and hands the device back to the OS.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(SampleFormat),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Default input device opened with its preferred stream configuration.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the system default input device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available
    /// (or access to it is denied), or [`CaptureError::DefaultConfig`] when
    /// the device cannot report a default stream configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::debug!(
            "input device {:?}: {sample_rate} Hz, {channels} ch, {sample_format}",
            device.name().unwrap_or_default()
        );

        Ok(Self {
            device,
            config,
            sample_format,
            sample_rate,
            channels,
        })
    }

    /// Start recording and send [`CaptureBuffer`]s to `tx`.
    ///
    /// The cpal callback runs on the platform audio thread.  Send errors
    /// (receiver dropped) are ignored so that thread never panics.
    pub fn start(&self, tx: mpsc::Sender<CaptureBuffer>) -> Result<StreamHandle, CaptureError> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(tx, |s| s)?,
            SampleFormat::I16 => self.build::<i16>(tx, |s| s as f32 / i16::MAX as f32)?,
            SampleFormat::U16 => {
                self.build::<u16>(tx, |s| (s as f32 - 32_768.0) / 32_768.0)?
            }
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    fn build<T>(
        &self,
        tx: mpsc::Sender<CaptureBuffer>,
        to_f32: fn(T) -> f32,
    ) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample + Send + 'static,
    {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let buffer = CaptureBuffer {
                    samples: data.iter().map(|&s| to_f32(s)).collect(),
                    sample_rate,
                    channels,
                };
                let _ = tx.send(buffer);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`CaptureBuffer`].
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
