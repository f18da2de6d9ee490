//! Stream Codec Module
//!
//! Decoders for the two wire families Intrinio serves:
//!
//! - **Binary multi-record** (realtime equities providers): compact
//!   little-endian records, many per frame.
//! - **Phoenix JSON** (IEX family): one JSON envelope per event.
//!
//! # Binary Frame Layout
//!
//! ```text
//! byte 0        record count N
//! bytes 1..     N records, back to back
//! ```
//!
//! Wire V1 record (legacy):
//!
//! ```text
//! type u8 | symbol_len u8 | symbol | price f32 | size u32 | timestamp u64 | [total_volume u32]
//! ```
//!
//! Wire V2 record:
//!
//! ```text
//! type u8 | record_len u8 | symbol_len u8 | symbol | subprovider u8 | market_center u16
//!   | price f32 | size u32 | timestamp u64 | [total_volume u32] | condition_len u8 | condition
//! ```
//!
//! `total_volume` is present for trades only. In V2 the cursor always advances
//! by `record_len`, so fields appended by newer servers are skipped.

use bytes::{BufMut, Bytes, BytesMut};

use crate::application::ports::{DecodeError, FrameCodec};
use crate::domain::streaming::{DomainEvent, Quote, QuoteType, SubProvider, Trade};

use super::messages::{PhoenixMessage, QuotePayload, ReplyPayload, TradePayload};

const TRADE: u8 = 0;
const ASK: u8 = 1;
const BID: u8 = 2;

/// Bytes after the symbol in a V1 trade record.
const V1_TRADE_BODY: usize = 20;
/// Bytes after the symbol in a V1 quote record.
const V1_QUOTE_BODY: usize = 16;

// =============================================================================
// Wire Version
// =============================================================================

/// Binary record layout negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireVersion {
    /// Fixed-offset records without sub-provider, market center or condition.
    #[default]
    V1,
    /// Length-prefixed records with sub-provider, market center and condition.
    V2,
}

impl WireVersion {
    /// Parse a version name (`v1`, `1`, `v2`, `2`).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Some(Self::V1),
            "v2" | "2" => Some(Self::V2),
            _ => None,
        }
    }

    /// Version name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

// =============================================================================
// Frame Reader
// =============================================================================

/// Bounds-checked little-endian cursor over a frame.
///
/// Every read either returns the requested bytes or a
/// [`DecodeError::Truncated`] carrying the absolute offset of the read.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> FrameReader<'a> {
    /// Reader positioned at the start of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute position of the cursor within the original frame.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.position(),
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Split off the next `n` bytes as their own reader and skip past them.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if fewer than `n` bytes remain.
    pub fn sub_reader(&mut self, n: usize) -> Result<Self, DecodeError> {
        let base = self.position();
        let buf = self.take(n)?;
        Ok(Self { buf, pos: 0, base })
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    /// Read a little-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer.
    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer.
    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer.
    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    /// Read a little-endian IEEE-754 single, bit for bit.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer.
    pub fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        self.array().map(f32::from_le_bytes)
    }

    /// Read `len` bytes of ASCII text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of buffer, or
    /// [`DecodeError::InvalidText`] for non-ASCII bytes.
    pub fn read_ascii(&mut self, len: usize, field: &'static str) -> Result<String, DecodeError> {
        let offset = self.position();
        let bytes = self.take(len)?;
        if !bytes.is_ascii() {
            return Err(DecodeError::InvalidText { field, offset });
        }
        Ok(bytes.iter().copied().map(char::from).collect())
    }
}

// =============================================================================
// Binary Codec
// =============================================================================

/// Errors raised while building a binary frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// More than 255 records.
    #[error("too many records for one frame: {0}")]
    TooManyRecords(usize),

    /// A field does not fit the one-byte length prefix.
    #[error("{field} too long: {len} bytes")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        len: usize,
    },

    /// Symbol or condition is not ASCII.
    #[error("{0} must be ASCII")]
    NotAscii(&'static str),

    /// Only trades and quotes have a binary encoding.
    #[error("event has no binary encoding")]
    Unsupported,
}

/// Decoder (and fixture encoder) for binary multi-record frames.
#[derive(Debug, Default, Clone)]
pub struct BinaryCodec {
    version: WireVersion,
}

impl BinaryCodec {
    /// Create a codec for the given wire version.
    #[must_use]
    pub const fn new(version: WireVersion) -> Self {
        Self { version }
    }

    /// Wire version this codec reads.
    #[must_use]
    pub const fn version(&self) -> WireVersion {
        self.version
    }

    fn decode_v1_record(reader: &mut FrameReader<'_>) -> Result<DomainEvent, DecodeError> {
        let msg_type = reader.read_u8()?;
        let symbol_len = usize::from(reader.read_u8()?);
        let body = match msg_type {
            TRADE => V1_TRADE_BODY,
            ASK | BID => V1_QUOTE_BODY,
            other => return Err(DecodeError::UnknownMessageType(other)),
        };

        let mut record = reader.sub_reader(symbol_len + body)?;
        let symbol = record.read_ascii(symbol_len, "symbol")?;
        let price = record.read_f32_le()?;
        let size = record.read_u32_le()?;
        let timestamp = record.read_u64_le()?;

        if msg_type == TRADE {
            let total_volume = record.read_u32_le()?;
            return Ok(DomainEvent::Trade(Trade {
                symbol,
                price,
                size,
                timestamp,
                total_volume,
                subprovider: None,
                market_center: None,
                condition: None,
            }));
        }

        Ok(DomainEvent::Quote(Quote {
            quote_type: quote_type(msg_type),
            symbol,
            price,
            size,
            timestamp,
            subprovider: None,
            market_center: None,
            condition: None,
        }))
    }

    fn decode_v2_record(reader: &mut FrameReader<'_>) -> Result<DomainEvent, DecodeError> {
        let offset = reader.position();
        let msg_type = reader.read_u8()?;
        let length = usize::from(reader.read_u8()?);
        if length < 2 {
            return Err(DecodeError::InvalidRecordLength { offset, length });
        }

        // Everything the record declares, including fields we don't know yet.
        let mut record = reader.sub_reader(length - 2)?;

        if !matches!(msg_type, TRADE | ASK | BID) {
            return Ok(DomainEvent::Unknown {
                kind: format!("message type {msg_type}"),
            });
        }

        let symbol_len = usize::from(record.read_u8()?);
        let symbol = record.read_ascii(symbol_len, "symbol")?;
        let subprovider = SubProvider::from_wire(record.read_u8()?);
        let market_center = decode_market_center(record.read_u16_le()?);
        let price = record.read_f32_le()?;
        let size = record.read_u32_le()?;
        let timestamp = record.read_u64_le()?;
        let total_volume = if msg_type == TRADE {
            Some(record.read_u32_le()?)
        } else {
            None
        };
        let condition_len = usize::from(record.read_u8()?);
        let condition = record.read_ascii(condition_len, "condition")?;

        Ok(match total_volume {
            Some(total_volume) => DomainEvent::Trade(Trade {
                symbol,
                price,
                size,
                timestamp,
                total_volume,
                subprovider: Some(subprovider),
                market_center: Some(market_center),
                condition: Some(condition),
            }),
            None => DomainEvent::Quote(Quote {
                quote_type: quote_type(msg_type),
                symbol,
                price,
                size,
                timestamp,
                subprovider: Some(subprovider),
                market_center: Some(market_center),
                condition: Some(condition),
            }),
        })
    }

    /// Encode trades and quotes into one frame of this codec's wire version.
    ///
    /// Optional V2 fields that are `None` are written as `NONE`, `'\0'` and
    /// an empty condition.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the records cannot be represented.
    pub fn encode(&self, events: &[DomainEvent]) -> Result<Bytes, EncodeError> {
        let count =
            u8::try_from(events.len()).map_err(|_| EncodeError::TooManyRecords(events.len()))?;

        let mut buf = BytesMut::new();
        buf.put_u8(count);

        for event in events {
            let fields = RecordFields::from_event(event)?;
            match self.version {
                WireVersion::V1 => fields.put_v1(&mut buf),
                WireVersion::V2 => fields.put_v2(&mut buf)?,
            }
        }

        Ok(buf.freeze())
    }
}

impl FrameCodec for BinaryCodec {
    fn decode(&self, frame: &[u8]) -> Result<Vec<DomainEvent>, DecodeError> {
        let mut reader = FrameReader::new(frame);
        let count = reader.read_u8().map_err(|_| DecodeError::EmptyFrame)?;

        let mut events = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let event = match self.version {
                WireVersion::V1 => Self::decode_v1_record(&mut reader)?,
                WireVersion::V2 => Self::decode_v2_record(&mut reader)?,
            };
            events.push(event);
        }

        if reader.remaining() > 0 {
            tracing::trace!(
                trailing = reader.remaining(),
                "Ignoring trailing bytes after last record"
            );
        }

        Ok(events)
    }
}

const fn quote_type(msg_type: u8) -> QuoteType {
    if msg_type == ASK {
        QuoteType::Ask
    } else {
        QuoteType::Bid
    }
}

fn decode_market_center(unit: u16) -> String {
    char::decode_utf16([unit])
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Flattened view of a trade or quote for encoding.
struct RecordFields<'a> {
    msg_type: u8,
    symbol: &'a str,
    price: f32,
    size: u32,
    timestamp: u64,
    total_volume: Option<u32>,
    subprovider: SubProvider,
    market_center: u16,
    condition: &'a str,
}

impl<'a> RecordFields<'a> {
    fn from_event(event: &'a DomainEvent) -> Result<Self, EncodeError> {
        let fields = match event {
            DomainEvent::Trade(t) => Self {
                msg_type: TRADE,
                symbol: &t.symbol,
                price: t.price,
                size: t.size,
                timestamp: t.timestamp,
                total_volume: Some(t.total_volume),
                subprovider: t.subprovider.unwrap_or(SubProvider::None),
                market_center: encode_market_center(t.market_center.as_deref()),
                condition: t.condition.as_deref().unwrap_or_default(),
            },
            DomainEvent::Quote(q) => Self {
                msg_type: match q.quote_type {
                    QuoteType::Ask => ASK,
                    QuoteType::Bid => BID,
                },
                symbol: &q.symbol,
                price: q.price,
                size: q.size,
                timestamp: q.timestamp,
                total_volume: None,
                subprovider: q.subprovider.unwrap_or(SubProvider::None),
                market_center: encode_market_center(q.market_center.as_deref()),
                condition: q.condition.as_deref().unwrap_or_default(),
            },
            DomainEvent::ControlAck { .. } | DomainEvent::Unknown { .. } => {
                return Err(EncodeError::Unsupported);
            }
        };

        if !fields.symbol.is_ascii() {
            return Err(EncodeError::NotAscii("symbol"));
        }
        if !fields.condition.is_ascii() {
            return Err(EncodeError::NotAscii("condition"));
        }
        Ok(fields)
    }

    fn put_numbers(&self, buf: &mut BytesMut) {
        buf.put_f32_le(self.price);
        buf.put_u32_le(self.size);
        buf.put_u64_le(self.timestamp);
        if let Some(volume) = self.total_volume {
            buf.put_u32_le(volume);
        }
    }

    fn put_v1(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(self.symbol.len() as u8);
        buf.put_slice(self.symbol.as_bytes());
        self.put_numbers(buf);
    }

    fn put_v2(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let symbol_len = short_len("symbol", self.symbol.len())?;
        let condition_len = short_len("condition", self.condition.len())?;
        let numbers = if self.total_volume.is_some() { 20 } else { 16 };
        // type, length, symbol_len, subprovider, market_center(2), condition_len
        let record_len = 7 + self.symbol.len() + numbers + self.condition.len();
        let record_len = short_len("record", record_len)?;

        buf.put_u8(self.msg_type);
        buf.put_u8(record_len);
        buf.put_u8(symbol_len);
        buf.put_slice(self.symbol.as_bytes());
        buf.put_u8(self.subprovider.to_wire());
        buf.put_u16_le(self.market_center);
        self.put_numbers(buf);
        buf.put_u8(condition_len);
        buf.put_slice(self.condition.as_bytes());
        Ok(())
    }
}

fn short_len(field: &'static str, len: usize) -> Result<u8, EncodeError> {
    u8::try_from(len).map_err(|_| EncodeError::FieldTooLong { field, len })
}

fn encode_market_center(market_center: Option<&str>) -> u16 {
    market_center
        .and_then(|mc| mc.encode_utf16().next())
        .unwrap_or(0)
}

// =============================================================================
// JSON Codec
// =============================================================================

/// Decoder for Phoenix JSON event frames.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_message(value: serde_json::Value) -> Result<DomainEvent, DecodeError> {
        let message: PhoenixMessage = serde_json::from_value(value)?;

        let event = match message.event.as_str() {
            "quote" => {
                let payload: QuotePayload = serde_json::from_value(message.payload)?;
                Self::quote_event(payload)
            }
            "trade" => {
                let payload: TradePayload = serde_json::from_value(message.payload)?;
                DomainEvent::Trade(Trade {
                    symbol: payload.symbol,
                    price: to_price(payload.price),
                    size: to_size(payload.size),
                    timestamp: seconds_to_nanos(payload.timestamp),
                    total_volume: payload.total_volume,
                    subprovider: None,
                    market_center: None,
                    condition: None,
                })
            }
            "phx_reply" => {
                let status = serde_json::from_value::<ReplyPayload>(message.payload)
                    .ok()
                    .and_then(|p| p.status)
                    .unwrap_or_else(|| "ok".to_string());
                DomainEvent::ControlAck {
                    topic: message.topic,
                    status,
                }
            }
            "phx_error" => DomainEvent::ControlAck {
                topic: message.topic,
                status: "error".to_string(),
            },
            "phx_close" => DomainEvent::ControlAck {
                topic: message.topic,
                status: "closed".to_string(),
            },
            _ => DomainEvent::Unknown {
                kind: message.event,
            },
        };

        Ok(event)
    }

    fn quote_event(payload: QuotePayload) -> DomainEvent {
        let price = to_price(payload.price);
        let size = to_size(payload.size);
        let timestamp = seconds_to_nanos(payload.timestamp);

        let quote_type = match payload.kind.as_str() {
            "last" => {
                return DomainEvent::Trade(Trade {
                    symbol: payload.ticker,
                    price,
                    size,
                    timestamp,
                    total_volume: 0,
                    subprovider: None,
                    market_center: None,
                    condition: None,
                });
            }
            "ask" => QuoteType::Ask,
            "bid" => QuoteType::Bid,
            other => {
                return DomainEvent::Unknown {
                    kind: format!("quote:{other}"),
                };
            }
        };

        DomainEvent::Quote(Quote {
            quote_type,
            symbol: payload.ticker,
            price,
            size,
            timestamp,
            subprovider: None,
            market_center: None,
            condition: None,
        })
    }
}

impl FrameCodec for JsonCodec {
    fn decode(&self, frame: &[u8]) -> Result<Vec<DomainEvent>, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(frame)?;

        match value {
            serde_json::Value::Array(items) => {
                items.into_iter().map(Self::decode_message).collect()
            }
            serde_json::Value::Object(_) => Ok(vec![Self::decode_message(value)?]),
            other => Err(DecodeError::InvalidFormat(format!(
                "expected JSON array or object, got: {other}"
            ))),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn to_price(price: f64) -> f32 {
    price as f32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn to_size(size: f64) -> u32 {
    size as u32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_to_nanos(seconds: f64) -> u64 {
    (seconds * 1e9).round() as u64
}
