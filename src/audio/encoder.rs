//! Interval chunk encoder.
//!
//! [`ChunkEncoder`] turns the raw capture stream of one recording session
//! into a single Ogg/Opus logical stream, cut into one [`EncodedChunk`] per
//! `interval` of audio.  Chunks always end on an Ogg page boundary, so
//! concatenating them in order yields a playable `.ogg` file:
//!
//! ```text
//! chunk 0:  OpusHead page │ OpusTags page │ audio pages
//! chunk 1:  audio pages
//! ...
//! finish:   audio pages ending with the EOS page
//! ```
//!
//! Audio is downmixed, resampled to the configured rate and encoded in
//! 20 ms Opus frames.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use audiopus::{coder::Encoder as OpusEncoder, Application, Channels, SampleRate};
use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use thiserror::Error;

use super::capture::CaptureBuffer;
use super::resample::{downmix_to_mono, FrameResampler, ResampleError};

/// MIME type of every [`EncodedChunk`] payload.
pub const CHUNK_MIME: &str = "audio/ogg";

/// File name attached to chunk payloads in multipart uploads.
pub const CHUNK_FILE_NAME: &str = "chunk.ogg";

/// Duration of one Opus packet.
pub const OPUS_FRAME: Duration = Duration::from_millis(20);

/// Opus granule positions always count 48 kHz samples.
const GRANULE_RATE: u64 = 48_000;
const GRANULE_PER_FRAME: u64 = GRANULE_RATE / 50;

/// libopus encoder lookahead at 48 kHz; decoders drop this many samples.
const PRE_SKIP: u16 = 312;

/// Upper bound for one encoded Opus packet.
const MAX_PACKET: usize = 4000;

const VENDOR: &str = concat!("webchat-client ", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// EncodeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Opus does not support a {0} Hz input rate")]
    UnsupportedRate(u32),

    #[error("Opus encoding failed: {0}")]
    Opus(#[from] audiopus::Error),

    #[error("Ogg framing failed: {0}")]
    Ogg(#[from] std::io::Error),

    #[error(transparent)]
    Resample(#[from] ResampleError),
}

// ---------------------------------------------------------------------------
// EncodedChunk
// ---------------------------------------------------------------------------

/// One interval's worth of encoded audio.
///
/// A chunk with an empty payload is produced when the encoder is flushed
/// with nothing to write; callers discard those instead of uploading them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
}

impl EncodedChunk {
    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ChunkEncoder
// ---------------------------------------------------------------------------

pub struct ChunkEncoder {
    sample_rate: u32,
    frames_per_chunk: usize,
    opus: OpusEncoder,
    /// Created from the first capture buffer, once the device rate is known.
    resampler: Option<FrameResampler>,
    writer: PacketWriter<'static, Vec<u8>>,
    serial: u32,
    /// Packets written since the last chunk was cut.
    frames_in_chunk: usize,
    granule: u64,
    started: bool,
    finished: bool,
}

impl ChunkEncoder {
    /// Create an encoder producing mono Opus at `sample_rate` Hz, cut into
    /// chunks covering `interval` of audio (rounded to whole 20 ms frames).
    pub fn new(sample_rate: u32, interval: Duration) -> Result<Self, EncodeError> {
        let rate = opus_rate(sample_rate).ok_or(EncodeError::UnsupportedRate(sample_rate))?;
        let opus = OpusEncoder::new(rate, Channels::Mono, Application::Voip)?;
        let frames_per_chunk = ((interval.as_millis() / OPUS_FRAME.as_millis()) as usize).max(1);

        Ok(Self {
            sample_rate,
            frames_per_chunk,
            opus,
            resampler: None,
            writer: PacketWriter::new(Vec::new()),
            serial: stream_serial(),
            frames_in_chunk: 0,
            granule: 0,
            started: false,
            finished: false,
        })
    }

    /// Number of Opus frames that make up one full chunk.
    pub fn frames_per_chunk(&self) -> usize {
        self.frames_per_chunk
    }

    /// Feed one capture buffer; returns every chunk completed by it (usually
    /// zero or one).
    pub fn push(&mut self, buffer: &CaptureBuffer) -> Result<Vec<EncodedChunk>, EncodeError> {
        if self.finished {
            return Ok(Vec::new());
        }
        let mono = downmix_to_mono(&buffer.samples, buffer.channels);
        let mut frames = Vec::new();

        let same_rate = self
            .resampler
            .as_ref()
            .is_some_and(|rs| rs.source_rate() == buffer.sample_rate);
        if !same_rate {
            if let Some(mut old) = self.resampler.take() {
                old.finish(|f| frames.push(f.to_vec()))?;
            }
            self.resampler = Some(FrameResampler::new(
                buffer.sample_rate,
                self.sample_rate,
                OPUS_FRAME,
            )?);
        }
        if let Some(rs) = self.resampler.as_mut() {
            rs.push(&mono, |f| frames.push(f.to_vec()))?;
        }

        let mut chunks = Vec::new();
        for frame in frames {
            self.write_frame(&frame, PacketWriteEndInfo::NormalPacket)?;
            if self.frames_in_chunk >= self.frames_per_chunk {
                chunks.push(self.cut()?);
            }
        }
        Ok(chunks)
    }

    /// Flush the partial remainder and close the Ogg stream.
    ///
    /// Returns an empty chunk when the session never produced audio, and on
    /// every call after the first.
    pub fn finish(&mut self) -> Result<EncodedChunk, EncodeError> {
        if self.finished {
            return Ok(EncodedChunk::empty());
        }
        self.finished = true;

        let mut frames = Vec::new();
        if let Some(rs) = self.resampler.as_mut() {
            rs.finish(|f| frames.push(f.to_vec()))?;
        }
        if !self.started && frames.is_empty() {
            return Ok(EncodedChunk::empty());
        }
        if frames.is_empty() {
            // The EOS flag has to ride on a packet.
            frames.push(vec![0.0; self.frame_samples()]);
        }

        let last = frames.len() - 1;
        for (i, frame) in frames.iter().enumerate() {
            let end = if i == last {
                PacketWriteEndInfo::EndStream
            } else {
                PacketWriteEndInfo::NormalPacket
            };
            self.write_frame(frame, end)?;
        }
        self.cut()
    }

    fn frame_samples(&self) -> usize {
        (self.sample_rate as u128 * OPUS_FRAME.as_millis() / 1000) as usize
    }

    /// Encode one frame and hand it to the Ogg writer.  The packet that
    /// completes a chunk closes its page.
    fn write_frame(&mut self, pcm: &[f32], end: PacketWriteEndInfo) -> Result<(), EncodeError> {
        if !self.started {
            self.write_headers()?;
            self.started = true;
        }

        let mut packet = vec![0u8; MAX_PACKET];
        let len = self.opus.encode_float(pcm, &mut packet)?;
        packet.truncate(len);

        self.granule += GRANULE_PER_FRAME;
        self.frames_in_chunk += 1;
        let end = match end {
            PacketWriteEndInfo::NormalPacket if self.frames_in_chunk >= self.frames_per_chunk => {
                PacketWriteEndInfo::EndPage
            }
            other => other,
        };
        self.writer
            .write_packet(packet, self.serial, end, PRE_SKIP as u64 + self.granule)?;
        Ok(())
    }

    fn write_headers(&mut self) -> Result<(), EncodeError> {
        self.writer.write_packet(
            opus_head(self.sample_rate),
            self.serial,
            PacketWriteEndInfo::EndPage,
            0,
        )?;
        self.writer
            .write_packet(opus_tags(), self.serial, PacketWriteEndInfo::EndPage, 0)?;
        Ok(())
    }

    /// Take every complete page written so far as one chunk.
    fn cut(&mut self) -> Result<EncodedChunk, EncodeError> {
        self.frames_in_chunk = 0;
        Ok(EncodedChunk {
            data: std::mem::take(self.writer.inner_mut()),
        })
    }
}

fn opus_rate(hz: u32) -> Option<SampleRate> {
    match hz {
        8_000 => Some(SampleRate::Hz8000),
        12_000 => Some(SampleRate::Hz12000),
        16_000 => Some(SampleRate::Hz16000),
        24_000 => Some(SampleRate::Hz24000),
        48_000 => Some(SampleRate::Hz48000),
        _ => None,
    }
}

/// Ogg serial numbers only need to differ between concurrent streams.
fn stream_serial() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    nanos ^ std::process::id().rotate_left(16)
}

/// `OpusHead` identification header (RFC 7845 §5.1), mono, mapping family 0.
fn opus_head(input_rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(1);
    head.extend_from_slice(&PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&input_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}

/// `OpusTags` comment header (RFC 7845 §5.2) with no user comments.
fn opus_tags() -> Vec<u8> {
    let mut tags = Vec::with_capacity(16 + VENDOR.len());
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
    tags.extend_from_slice(VENDOR.as_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ogg::reading::PacketReader;

    use super::*;

    const HALF_SECOND: Duration = Duration::from_millis(500);

    fn tone(len: usize, sample_rate: u32, channels: u16) -> CaptureBuffer {
        let samples = (0..len)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();
        CaptureBuffer {
            samples,
            sample_rate,
            channels,
        }
    }

    fn push_all(enc: &mut ChunkEncoder, buffers: impl IntoIterator<Item = CaptureBuffer>) -> Vec<EncodedChunk> {
        let mut out = Vec::new();
        for b in buffers {
            out.extend(enc.push(&b).unwrap());
        }
        out
    }

    #[test]
    fn half_second_is_25_opus_frames() {
        let enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        assert_eq!(enc.frames_per_chunk(), 25);
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        assert!(matches!(
            ChunkEncoder::new(44_100, HALF_SECOND),
            Err(EncodeError::UnsupportedRate(44_100))
        ));
    }

    #[test]
    fn no_chunk_until_interval_is_filled() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        assert!(enc.push(&tone(7_999, 16_000, 1)).unwrap().is_empty());
        assert_eq!(enc.push(&tone(1, 16_000, 1)).unwrap().len(), 1);
    }

    #[test]
    fn chunks_concatenate_into_one_ogg_opus_stream() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        let mut chunks = push_all(&mut enc, (0..4).map(|_| tone(4_000, 16_000, 1)));
        assert_eq!(chunks.len(), 2);
        chunks.push(enc.finish().unwrap());

        // Only the first chunk carries the headers; every chunk starts on a
        // page boundary.
        for chunk in &chunks {
            assert_eq!(&chunk.data[..4], b"OggS");
        }

        let stream: Vec<u8> = chunks.iter().flat_map(|c| c.data.clone()).collect();
        let mut reader = PacketReader::new(Cursor::new(stream));
        let head = reader.read_packet_expected().unwrap();
        assert_eq!(&head.data[..8], b"OpusHead");
        assert_eq!(head.data[9], 1, "mono");
        let tags = reader.read_packet_expected().unwrap();
        assert_eq!(&tags.data[..8], b"OpusTags");

        let mut audio = 0;
        let mut last = None;
        while let Some(packet) = reader.read_packet().unwrap() {
            audio += 1;
            last = Some(packet);
        }
        // One second of audio plus the frame carrying end-of-stream.
        assert_eq!(audio, 51);
        let last = last.unwrap();
        assert!(last.last_in_stream());
        assert_eq!(last.absgp_page(), PRE_SKIP as u64 + 51 * GRANULE_PER_FRAME);
    }

    #[test]
    fn later_chunks_carry_no_headers() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        let chunks = push_all(&mut enc, [tone(16_000, 16_000, 1)]);
        assert_eq!(chunks.len(), 2);

        let mut reader = PacketReader::new(Cursor::new(chunks[1].data.clone()));
        let first = reader.read_packet_expected().unwrap();
        assert_ne!(&first.data[..first.data.len().min(8)], b"OpusHead");
        assert_ne!(&first.data[..first.data.len().min(8)], b"OpusTags");
    }

    #[test]
    fn finish_with_nothing_pushed_is_empty() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        let chunk = enc.finish().unwrap();
        assert!(chunk.is_empty());
        assert_eq!(chunk.size(), 0);
    }

    #[test]
    fn finish_closes_stream_once() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        enc.push(&tone(100, 16_000, 1)).unwrap();
        assert!(!enc.finish().unwrap().is_empty());
        assert!(enc.finish().unwrap().is_empty());
        assert!(enc.push(&tone(16_000, 16_000, 1)).unwrap().is_empty());
    }

    #[test]
    fn finish_after_full_chunk_still_writes_end_of_stream() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        assert_eq!(enc.push(&tone(8_000, 16_000, 1)).unwrap().len(), 1);

        let tail = enc.finish().unwrap();
        let mut reader = PacketReader::new(Cursor::new(tail.data));
        let packet = reader.read_packet_expected().unwrap();
        assert!(packet.last_in_stream());
    }

    #[test]
    fn stereo_48k_is_downmixed_and_resampled() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        // 2 s of stereo at 48 kHz in 10 ms buffers → at least three chunks
        // even with the resampler's internal delay.
        let chunks = push_all(&mut enc, (0..200).map(|_| tone(960, 48_000, 2)));
        assert!(chunks.len() >= 3, "got {}", chunks.len());
        assert!(!enc.finish().unwrap().is_empty());
    }

    #[test]
    fn half_second_chunk_fits_server_message_limit() {
        let mut enc = ChunkEncoder::new(16_000, HALF_SECOND).unwrap();
        let chunks = push_all(&mut enc, [tone(8_000, 16_000, 1)]);
        assert!(chunks[0].size() < 32 * 1024, "{} bytes", chunks[0].size());
    }

    #[test]
    fn headers_follow_rfc7845_layout() {
        let head = opus_head(16_000);
        assert_eq!(head.len(), 19);
        assert_eq!(u16::from_le_bytes([head[10], head[11]]), PRE_SKIP);
        assert_eq!(u32::from_le_bytes([head[12], head[13], head[14], head[15]]), 16_000);

        let tags = opus_tags();
        assert_eq!(&tags[..8], b"OpusTags");
        assert_eq!(tags.len(), 8 + 4 + VENDOR.len() + 4);
    }
}
