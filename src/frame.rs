use crate::{BUS_FRAME_MAX_SIZE, FRAME_MAX_PAYLOAD_SIZE};

/// Size of the fixed data frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 64;

/// Size of a tick message in bytes. A bus message of exactly this length
/// is always a tick, never a data frame.
pub const TICK_MESSAGE_SIZE: usize = 16;

/// Number of opaque f32 metadata values between the mode field and the
/// payload length field. The modem fills these with signal quality values
/// (power, frequency offset, error rates); this layer does not interpret
/// them.
pub const METADATA_FLOAT_COUNT: usize = 10;

const TIMESTAMP_OFFSET: usize = 8;
const MODE_OFFSET: usize = 16;
const METADATA_OFFSET: usize = 20;
const PAYLOAD_LEN_OFFSET: usize = 60;

/// Frame-level decode errors. Both are local to a single bus message; the
/// message is dropped and processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message shorter than the 64-byte data frame header.
    Truncated,
    /// Declared payload length exceeds the bytes actually present, or a
    /// payload handed in for encoding exceeds the frame capacity.
    PayloadOverrun,
}

/// The two kinds of messages carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Tick,
    Data,
}

/// Classify a raw bus message by its total length. A message of exactly 16
/// bytes is a tick; everything else is treated as a data frame. Callers
/// must still run [`FrameHeader::decode`] before trusting a data frame.
pub fn classify(bytes: &[u8]) -> MessageKind {
    if bytes.len() == TICK_MESSAGE_SIZE {
        MessageKind::Tick
    } else {
        MessageKind::Data
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(b)
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(b)
}

/// A raw bus message in wire form, either direction. Fixed storage so the
/// type can travel through channels without allocation.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub(crate) data: [u8; BUS_FRAME_MAX_SIZE],
    pub(crate) length: usize,
}

impl BusMessage {
    /// Copy raw wire bytes into a bus message. Returns None if the message
    /// exceeds the frame capacity of this build.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > BUS_FRAME_MAX_SIZE {
            return None;
        }
        let mut data = [0u8; BUS_FRAME_MAX_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(BusMessage { data, length: bytes.len() })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// Decoded data frame header.
///
/// Only the offsets of `id`/`flags` (0..8), `timestamp` (8..16) and
/// `payload_len` (60..64) are load-bearing for this layer. The `mode` field
/// and the float region are carried through verbatim for the application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Arbitrary identifier, usable as a pub/sub topic.
    pub id: u32,
    /// Modem flag bits, opaque to this layer.
    pub flags: u32,
    /// Frame timestamp in nanoseconds on the modem timebase.
    pub timestamp: u64,
    /// Modem-specific modulation and coding flags.
    pub mode: u32,
    /// Opaque signal quality metadata.
    pub metadata: [f32; METADATA_FLOAT_COUNT],
    /// Authoritative payload byte count. The bus message itself may be
    /// padded beyond `64 + payload_len`.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Header with the given timestamp and everything else zeroed.
    pub fn new(timestamp: u64) -> Self {
        FrameHeader {
            id: 0,
            flags: 0,
            timestamp,
            mode: 0,
            metadata: [0.0; METADATA_FLOAT_COUNT],
            payload_len: 0,
        }
    }

    /// Parse the fixed 64-byte header from the start of a bus message.
    /// The float region is copied, not validated; those values are opaque
    /// metadata here.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Truncated);
        }

        let mut metadata = [0.0f32; METADATA_FLOAT_COUNT];
        for (i, value) in metadata.iter_mut().enumerate() {
            *value = read_f32(bytes, METADATA_OFFSET + i * 4);
        }

        Ok(FrameHeader {
            id: read_u32(bytes, 0),
            flags: read_u32(bytes, 4),
            timestamp: read_u64(bytes, TIMESTAMP_OFFSET),
            mode: read_u32(bytes, MODE_OFFSET),
            metadata,
            payload_len: read_u32(bytes, PAYLOAD_LEN_OFFSET),
        })
    }

    fn encode_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.to_le_bytes());
        out[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[MODE_OFFSET..MODE_OFFSET + 4].copy_from_slice(&self.mode.to_le_bytes());
        for (i, value) in self.metadata.iter().enumerate() {
            let offset = METADATA_OFFSET + i * 4;
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        out[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4].copy_from_slice(&self.payload_len.to_le_bytes());
    }
}

/// Payload view of a data frame. The count comes from the header's length
/// field, not from the bus message size, which may include padding.
pub fn decode_payload<'a>(bytes: &'a [u8], header: &FrameHeader) -> Result<&'a [u8], ProtocolError> {
    // Length math in u64: payload_len is attacker-controlled and
    // FRAME_HEADER_SIZE + payload_len can wrap usize on 32-bit targets.
    if (bytes.len() as u64) < FRAME_HEADER_SIZE as u64 + header.payload_len as u64 {
        return Err(ProtocolError::PayloadOverrun);
    }
    Ok(&bytes[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + header.payload_len as usize])
}

/// Encode a data frame: 64-byte header followed by the payload verbatim.
/// The header's length field is always set from the payload slice.
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Result<BusMessage, ProtocolError> {
    if payload.len() > FRAME_MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadOverrun);
    }

    let mut stamped = *header;
    stamped.payload_len = payload.len() as u32;

    let mut data = [0u8; BUS_FRAME_MAX_SIZE];
    stamped.encode_into(&mut data[..FRAME_HEADER_SIZE]);
    data[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload.len()].copy_from_slice(payload);

    Ok(BusMessage {
        data,
        length: FRAME_HEADER_SIZE + payload.len(),
    })
}

/// Decoded 16-byte tick message carrying the modem hardware timebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMessage {
    pub id: u32,
    pub flags: u32,
    /// Hardware timestamp in nanoseconds.
    pub tick: u64,
}

impl TickMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < TICK_MESSAGE_SIZE {
            return Err(ProtocolError::Truncated);
        }
        Ok(TickMessage {
            id: read_u32(bytes, 0),
            flags: read_u32(bytes, 4),
            tick: read_u64(bytes, 8),
        })
    }

    pub fn encode(&self) -> BusMessage {
        let mut data = [0u8; BUS_FRAME_MAX_SIZE];
        data[0..4].copy_from_slice(&self.id.to_le_bytes());
        data[4..8].copy_from_slice(&self.flags.to_le_bytes());
        data[8..16].copy_from_slice(&self.tick.to_le_bytes());
        BusMessage {
            data,
            length: TICK_MESSAGE_SIZE,
        }
    }
}

/// An outgoing frame queued for transmission. The scheduler supplies the
/// timestamp when the transmit slot opens; everything else is fixed when
/// the frame is queued.
#[derive(Debug, Clone)]
pub struct TxFrame {
    pub(crate) id: u32,
    pub(crate) flags: u32,
    pub(crate) mode: u32,
    pub(crate) payload: [u8; FRAME_MAX_PAYLOAD_SIZE],
    pub(crate) length: usize,
}

impl TxFrame {
    /// Frame with the given payload and zeroed metadata fields.
    pub fn new(payload: &[u8]) -> Result<Self, ProtocolError> {
        Self::with_metadata(0, 0, 0, payload)
    }

    /// Frame with explicit id, flag and mode values, e.g. to request
    /// no-late handling from the modem.
    pub fn with_metadata(id: u32, flags: u32, mode: u32, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > FRAME_MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadOverrun);
        }
        let mut data = [0u8; FRAME_MAX_PAYLOAD_SIZE];
        data[..payload.len()].copy_from_slice(payload);
        Ok(TxFrame {
            id,
            flags,
            mode,
            payload: data,
            length: payload.len(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    /// Wire form of this frame stamped with the scheduled transmission
    /// instant. Infallible: the payload length was validated at
    /// construction.
    pub(crate) fn encode_at(&self, timestamp: u64) -> BusMessage {
        let mut header = FrameHeader::new(timestamp);
        header.id = self.id;
        header.flags = self.flags;
        header.mode = self.mode;

        let mut data = [0u8; BUS_FRAME_MAX_SIZE];
        header.payload_len = self.length as u32;
        header.encode_into(&mut data[..FRAME_HEADER_SIZE]);
        data[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + self.length].copy_from_slice(&self.payload[..self.length]);

        BusMessage {
            data,
            length: FRAME_HEADER_SIZE + self.length,
        }
    }
}

/// A fully decoded inbound data frame, as handed to the application.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub(crate) header: FrameHeader,
    pub(crate) payload: [u8; FRAME_MAX_PAYLOAD_SIZE],
    pub(crate) length: usize,
}

impl ReceivedFrame {
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = FrameHeader::decode(bytes)?;
        let payload = decode_payload(bytes, &header)?;
        if payload.len() > FRAME_MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadOverrun);
        }

        let mut data = [0u8; FRAME_MAX_PAYLOAD_SIZE];
        data[..payload.len()].copy_from_slice(payload);
        Ok(ReceivedFrame {
            header,
            payload: data,
            length: payload.len(),
        })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    /// Hard-decision view of the payload, one bit per sample byte. Useful
    /// when the modem delivered raw soft-decision samples.
    pub fn hard_bits(&self) -> crate::demod::HardDecisionIterator<'_> {
        crate::demod::hard_decision(self.payload())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn classify_by_length_only() {
        assert_eq!(classify(&[0u8; 16]), MessageKind::Tick);
        assert_eq!(classify(&[0xFFu8; 16]), MessageKind::Tick);
        assert_eq!(classify(&[0u8; 15]), MessageKind::Data);
        assert_eq!(classify(&[0u8; 17]), MessageKind::Data);
        assert_eq!(classify(&[0u8; 64]), MessageKind::Data);
        assert_eq!(classify(&[]), MessageKind::Data);
    }

    #[test]
    fn header_decode_rejects_short_buffers() {
        assert_eq!(FrameHeader::decode(&[0u8; 63]), Err(ProtocolError::Truncated));
        assert!(FrameHeader::decode(&[0u8; 64]).is_ok());
    }

    #[test]
    fn encode_fixed_offsets_little_endian() {
        let mut header = FrameHeader::new(0x1122_3344_5566_7788);
        header.id = 1;
        header.flags = 4;
        header.mode = 0xA5;
        let msg = encode_frame(&header, &[0xAB; 10]).unwrap();
        let bytes = msg.bytes();

        assert_eq!(bytes.len(), 74);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &0xA5u32.to_le_bytes());
        assert_eq!(&bytes[60..64], &10u32.to_le_bytes());
        assert_eq!(&bytes[64..74], &[0xAB; 10]);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let payload: Vec<u8> = (0..200).map(|i| (i % 251) as u8).collect();
        let mut header = FrameHeader::new(987_654_321);
        header.id = 7;
        header.metadata[0] = -12.5;
        header.metadata[9] = 0.25;

        let msg = encode_frame(&header, &payload).unwrap();
        let decoded = FrameHeader::decode(msg.bytes()).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.timestamp, 987_654_321);
        assert_eq!(decoded.payload_len, 200);
        assert_eq!(decoded.metadata[0], -12.5);
        assert_eq!(decoded.metadata[9], 0.25);
        assert_eq!(decode_payload(msg.bytes(), &decoded).unwrap(), &payload[..]);
    }

    #[test]
    fn payload_length_field_is_authoritative_over_padding() {
        let msg = encode_frame(&FrameHeader::new(0), b"hello").unwrap();
        // Pad the wire message past the declared payload.
        let mut padded = msg.bytes().to_vec();
        padded.extend_from_slice(&[0u8; 32]);

        let header = FrameHeader::decode(&padded).unwrap();
        assert_eq!(decode_payload(&padded, &header).unwrap(), b"hello");
    }

    #[test]
    fn payload_overrun_detected() {
        let mut header = FrameHeader::new(0);
        header.payload_len = 100;
        let short = [0u8; 64 + 50];
        assert_eq!(decode_payload(&short, &header), Err(ProtocolError::PayloadOverrun));
    }

    #[test]
    fn huge_payload_length_rejected_without_wrapping() {
        // payload_len near u32::MAX must not wrap the bounds check on
        // 32-bit targets; the frame is rejected, never sliced.
        let mut header = FrameHeader::new(0);
        for len in [u32::MAX, u32::MAX - 63, 0xFFFF_FFC0] {
            header.payload_len = len;
            let wire = [0u8; 64];
            assert_eq!(decode_payload(&wire, &header), Err(ProtocolError::PayloadOverrun));
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let too_big = vec![0u8; FRAME_MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(encode_frame(&FrameHeader::new(0), &too_big), Err(ProtocolError::PayloadOverrun)));
        assert!(matches!(TxFrame::new(&too_big), Err(ProtocolError::PayloadOverrun)));
    }

    #[test]
    fn tick_message_roundtrip() {
        let tick = TickMessage {
            id: 3,
            flags: 0,
            tick: 1_000_000_007,
        };
        let msg = tick.encode();
        assert_eq!(msg.length(), TICK_MESSAGE_SIZE);
        assert_eq!(classify(msg.bytes()), MessageKind::Tick);
        assert_eq!(TickMessage::decode(msg.bytes()).unwrap(), tick);
    }

    #[test]
    fn tx_frame_encode_at_stamps_timestamp() {
        let frame = TxFrame::with_metadata(1, 4, 2, &[1, 0, 1, 1]).unwrap();
        let msg = frame.encode_at(42_000_000);
        let header = FrameHeader::decode(msg.bytes()).unwrap();
        assert_eq!(header.id, 1);
        assert_eq!(header.flags, 4);
        assert_eq!(header.mode, 2);
        assert_eq!(header.timestamp, 42_000_000);
        assert_eq!(decode_payload(msg.bytes(), &header).unwrap(), &[1, 0, 1, 1]);
    }

    #[test]
    fn received_frame_decode_and_views() {
        let mut header = FrameHeader::new(5_000);
        header.id = 9;
        let msg = encode_frame(&header, &[0x7F, 0x80, 0xFF]).unwrap();
        let frame = ReceivedFrame::decode(msg.bytes()).unwrap();
        assert_eq!(frame.timestamp(), 5_000);
        assert_eq!(frame.header().id, 9);
        assert_eq!(frame.payload(), &[0x7F, 0x80, 0xFF]);
        let bits: Vec<u8> = frame.hard_bits().collect();
        assert_eq!(bits, vec![0, 1, 1]);
    }

    #[test]
    fn bus_message_from_bytes_bounds() {
        assert!(BusMessage::from_bytes(&[0u8; BUS_FRAME_MAX_SIZE]).is_some());
        assert!(BusMessage::from_bytes(&vec![0u8; BUS_FRAME_MAX_SIZE + 1]).is_none());
    }
}
