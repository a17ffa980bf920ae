//! Length-prefixed framing for the game TCP stream.
//!
//! Every message on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (2 bytes)  |   payload          |
//! | u16 big-endian    |   (length - 2)     |
//! +-------------------+--------------------+
//! ```
//!
//! The length **includes** the 2 prefix bytes, so the smallest valid frame is
//! `length = 2` (an empty payload). Anything below 2 or above the configured
//! maximum means the stream is desynchronized and the connection must be dropped.

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 2;

/// Smallest legal value of the length field.
pub const MIN_FRAME_LEN: u16 = HEADER_LEN as u16;

/// Configuration for the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum value of the length field, prefix included. Default: 65535.
    ///
    /// This single ceiling bounds the encoder, the decoder and the size of the
    /// receive buffer (twice this value).
    pub max_frame_len: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: u16::MAX,
        }
    }
}

impl FrameConfig {
    /// Largest payload that fits in one frame.
    pub fn max_payload_len(&self) -> usize {
        (self.max_frame_len as usize).saturating_sub(HEADER_LEN)
    }

    /// Capacity of the receiver's rolling buffer.
    pub fn receive_buffer_len(&self) -> usize {
        2 * self.max_frame_len as usize
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit in a single frame.
    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// The actual payload size.
        size: usize,
        /// The largest payload allowed.
        max: usize,
    },

    /// A length field outside `[2, max_frame_len]` was read from the stream.
    #[error("malformed frame length {length} (valid range 2..={max})")]
    Malformed {
        /// The length field as read.
        length: u16,
        /// The configured maximum.
        max: u16,
    },
}

/// Prepend the big-endian length prefix to `payload`.
pub fn encode_frame(payload: &[u8], config: &FrameConfig) -> Result<Vec<u8>, FrameError> {
    let max = config.max_payload_len();
    if payload.len() > max {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max,
        });
    }

    let length = (payload.len() + HEADER_LEN) as u16;
    let mut frame = Vec::with_capacity(payload.len() + HEADER_LEN);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Try to extract one frame from the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, or the payload slice together
/// with the number of bytes the frame occupies. Call repeatedly (advancing past
/// the consumed bytes) until it returns `Ok(None)` to drain a burst.
pub fn try_decode_one<'a>(
    buf: &'a [u8],
    config: &FrameConfig,
) -> Result<Option<(&'a [u8], usize)>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let length = u16::from_be_bytes([buf[0], buf[1]]);
    if length < MIN_FRAME_LEN || length > config.max_frame_len {
        return Err(FrameError::Malformed {
            length,
            max: config.max_frame_len,
        });
    }

    let length = length as usize;
    if buf.len() < length {
        return Ok(None);
    }

    Ok(Some((&buf[HEADER_LEN..length], length)))
}

/// Rolling receive buffer that turns arbitrary read chunks into frames.
///
/// Reads land in [`spare_mut`](Self::spare_mut), are committed with
/// [`advance`](Self::advance), and [`drain_frames`](Self::drain_frames) pulls out
/// every complete frame before sliding the leftover bytes back to offset 0.
pub struct FrameDecoder {
    buf: Vec<u8>,
    filled: usize,
    config: FrameConfig,
}

impl FrameDecoder {
    /// Create a decoder with a buffer of twice the maximum frame length.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            buf: vec![0u8; config.receive_buffer_len()],
            filled: 0,
            config,
        }
    }

    /// Writable tail of the buffer.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Mark `n` bytes of the spare region as filled.
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.buf.len());
    }

    /// Copy as much of `bytes` as fits. Returns the number of bytes taken.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_mut();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.advance(n);
        n
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.filled
    }

    /// Hand every complete frame to `on_frame`, then compact the buffer.
    ///
    /// Returns how many frames were delivered. On a framing violation the frames
    /// decoded before it have already been delivered and the decoder should be
    /// discarded along with the connection.
    pub fn drain_frames(&mut self, mut on_frame: impl FnMut(Vec<u8>)) -> Result<usize, FrameError> {
        let mut offset = 0;
        let mut count = 0;

        let result = loop {
            match try_decode_one(&self.buf[offset..self.filled], &self.config) {
                Ok(Some((payload, consumed))) => {
                    on_frame(payload.to_vec());
                    offset += consumed;
                    count += 1;
                }
                Ok(None) => break Ok(count),
                Err(e) => break Err(e),
            }
        };

        if offset > 0 {
            self.buf.copy_within(offset..self.filled, 0);
            self.filled -= offset;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> FrameConfig {
        FrameConfig::default()
    }

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        decoder.drain_frames(|p| frames.push(p)).unwrap();
        frames
    }

    #[test]
    fn test_single_message_roundtrip() {
        let config = default_config();
        let frame = encode_frame(b"hello world", &config).unwrap();

        let (payload, consumed) = try_decode_one(&frame, &config).unwrap().unwrap();
        assert_eq!(payload, b"hello world");
        assert_eq!(consumed, 11 + HEADER_LEN);
    }

    #[test]
    fn test_length_prefix_is_big_endian_and_counts_itself() {
        let frame = encode_frame(&[0xAB; 0x0102], &default_config()).unwrap();
        assert_eq!(&frame[..2], &[0x01, 0x04]);
    }

    #[test]
    fn test_zero_length_message_handled() {
        let config = default_config();
        let frame = encode_frame(&[], &config).unwrap();
        assert_eq!(frame, vec![0x00, 0x02]);

        let (payload, consumed) = try_decode_one(&frame, &config).unwrap().unwrap();
        assert!(payload.is_empty(), "Zero-length payload should be valid");
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_largest_payload_fits_protocol_ceiling() {
        let config = default_config();
        let payload = vec![7u8; 65533];
        let frame = encode_frame(&payload, &config).unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xFF]);

        let (decoded, consumed) = try_decode_one(&frame, &config).unwrap().unwrap();
        assert_eq!(decoded.len(), 65533);
        assert_eq!(consumed, 65535);
    }

    #[test]
    fn test_oversized_message_rejected_on_encode() {
        let config = FrameConfig { max_frame_len: 18 };
        let result = encode_frame(&[0u8; 17], &config);
        assert_eq!(
            result,
            Err(FrameError::FrameTooLarge { size: 17, max: 16 })
        );
        assert!(encode_frame(&[0u8; 16], &config).is_ok());
    }

    #[test]
    fn test_partial_frame_yields_none_until_complete() {
        let config = default_config();
        let payload = b"this message arrives one byte at a time";
        let frame = encode_frame(payload, &config).unwrap();
        let mut decoder = FrameDecoder::new(config);

        for (i, byte) in frame.iter().enumerate() {
            assert_eq!(decoder.fill(&[*byte]), 1);
            let frames = decode_all(&mut decoder);
            if i + 1 < frame.len() {
                assert!(frames.is_empty(), "frame surfaced early at byte {i}");
            } else {
                assert_eq!(frames, vec![payload.to_vec()]);
            }
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_back_to_back_messages_dont_merge() {
        let config = default_config();
        let mut wire = encode_frame(b"aaa", &config).unwrap();
        wire.extend(encode_frame(b"bbb", &config).unwrap());

        let (first, used) = try_decode_one(&wire, &config).unwrap().unwrap();
        assert_eq!(first, b"aaa");
        let (second, used2) = try_decode_one(&wire[used..], &config).unwrap().unwrap();
        assert_eq!(second, b"bbb");
        assert!(try_decode_one(&wire[used + used2..], &config).unwrap().is_none());
    }

    #[test]
    fn test_two_frames_split_at_every_boundary() {
        let config = default_config();
        let mut wire = encode_frame(b"first", &config).unwrap();
        wire.extend(encode_frame(b"second!", &config).unwrap());

        for split in 0..=wire.len() {
            let mut decoder = FrameDecoder::new(config);
            let mut frames = Vec::new();

            decoder.fill(&wire[..split]);
            decoder.drain_frames(|p| frames.push(p)).unwrap();
            decoder.fill(&wire[split..]);
            decoder.drain_frames(|p| frames.push(p)).unwrap();

            assert_eq!(
                frames,
                vec![b"first".to_vec(), b"second!".to_vec()],
                "split at {split}"
            );
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_burst_after_stall_drains_everything() {
        let config = default_config();
        let mut decoder = FrameDecoder::new(config);
        let messages: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i; i as usize]).collect();

        for msg in &messages {
            decoder.fill(&encode_frame(msg, &config).unwrap());
        }

        assert_eq!(decode_all(&mut decoder), messages);
    }

    #[test]
    fn test_leftover_bytes_are_compacted_to_front() {
        let config = default_config();
        let mut decoder = FrameDecoder::new(config);
        let mut wire = encode_frame(b"done", &config).unwrap();
        let tail = encode_frame(b"pending", &config).unwrap();
        wire.extend_from_slice(&tail[..3]);

        decoder.fill(&wire);
        assert_eq!(decode_all(&mut decoder), vec![b"done".to_vec()]);
        assert_eq!(decoder.buffered(), 3);
        assert_eq!(decoder.spare_mut().len(), config.receive_buffer_len() - 3);

        decoder.fill(&tail[3..]);
        assert_eq!(decode_all(&mut decoder), vec![b"pending".to_vec()]);
    }

    #[test]
    fn test_length_below_minimum_is_malformed() {
        let config = default_config();
        for bad in [[0x00, 0x00], [0x00, 0x01]] {
            let result = try_decode_one(&bad, &config);
            assert!(
                matches!(result, Err(FrameError::Malformed { .. })),
                "length {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_length_above_maximum_is_malformed() {
        let config = FrameConfig { max_frame_len: 64 };
        let result = try_decode_one(&[0x00, 0x41, 0x00], &config);
        assert_eq!(
            result,
            Err(FrameError::Malformed {
                length: 65,
                max: 64
            })
        );
    }

    #[test]
    fn test_decoder_delivers_frames_before_corruption() {
        let config = default_config();
        let mut decoder = FrameDecoder::new(config);
        decoder.fill(&encode_frame(b"ok", &config).unwrap());
        decoder.fill(&[0x00, 0x01, 0xFF]);

        let mut frames = Vec::new();
        let result = decoder.drain_frames(|p| frames.push(p));
        assert_eq!(frames, vec![b"ok".to_vec()]);
        assert!(matches!(result, Err(FrameError::Malformed { length: 1, .. })));
    }

    #[test]
    fn test_single_byte_needs_more_data() {
        assert!(try_decode_one(&[0x00], &default_config()).unwrap().is_none());
        assert!(try_decode_one(&[], &default_config()).unwrap().is_none());
    }
}
