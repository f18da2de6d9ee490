//! Market Data Streaming Types
//!
//! Core domain types for market data: trades, quotes and the events a
//! decoded frame produces. These types are codec-agnostic and represent the
//! canonical internal representation of the feed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Sub-provider
// =============================================================================

/// Secondary data source tag carried by newer wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubProvider {
    /// No sub-provider.
    None,
    /// CTA tape A.
    CtaA,
    /// CTA tape B.
    CtaB,
    /// UTP (Nasdaq tape C).
    Utp,
    /// OTC markets.
    Otc,
    /// Nasdaq Basic.
    NasdaqBasic,
    /// Investors Exchange.
    Iex,
}

impl SubProvider {
    /// Map the wire byte to a sub-provider. Unknown values fall back to IEX.
    #[must_use]
    pub const fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::CtaA,
            2 => Self::CtaB,
            3 => Self::Utp,
            4 => Self::Otc,
            5 => Self::NasdaqBasic,
            _ => Self::Iex,
        }
    }

    /// Wire byte for this sub-provider.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::None => 0,
            Self::CtaA => 1,
            Self::CtaB => 2,
            Self::Utp => 3,
            Self::Otc => 4,
            Self::NasdaqBasic => 5,
            Self::Iex => 6,
        }
    }

    /// Name as used in Intrinio documentation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::CtaA => "CTA_A",
            Self::CtaB => "CTA_B",
            Self::Utp => "UTP",
            Self::Otc => "OTC",
            Self::NasdaqBasic => "NASDAQ_BASIC",
            Self::Iex => "IEX",
        }
    }
}

impl fmt::Display for SubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trade
// =============================================================================

/// A single executed trade.
///
/// `price` is kept exactly as the feed sent it (IEEE-754 single precision);
/// no rounding or decimal conversion happens inside the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Ticker symbol.
    pub symbol: String,
    /// Trade price.
    pub price: f32,
    /// Trade size in shares.
    pub size: u32,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// Cumulative volume for the day.
    pub total_volume: u32,
    /// Sub-provider, when the wire format carries it.
    pub subprovider: Option<SubProvider>,
    /// Market center, when the wire format carries it.
    pub market_center: Option<String>,
    /// Trade condition codes, when the wire format carries them.
    pub condition: Option<String>,
}

impl Trade {
    /// Timestamp as a UTC date-time.
    #[must_use]
    pub fn time(&self) -> DateTime<Utc> {
        timestamp_to_utc(self.timestamp)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.symbol, self.price, self.size, self.timestamp, self.total_volume
        )
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Side of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteType {
    /// Best ask.
    Ask,
    /// Best bid.
    Bid,
}

impl QuoteType {
    /// Display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "Ask",
            Self::Bid => "Bid",
        }
    }
}

/// A top-of-book quote update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ask or bid.
    pub quote_type: QuoteType,
    /// Ticker symbol.
    pub symbol: String,
    /// Quoted price.
    pub price: f32,
    /// Quoted size in shares.
    pub size: u32,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// Sub-provider, when the wire format carries it.
    pub subprovider: Option<SubProvider>,
    /// Market center, when the wire format carries it.
    pub market_center: Option<String>,
    /// Quote condition codes, when the wire format carries them.
    pub condition: Option<String>,
}

impl Quote {
    /// Timestamp as a UTC date-time.
    #[must_use]
    pub fn time(&self) -> DateTime<Utc> {
        timestamp_to_utc(self.timestamp)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.symbol,
            self.quote_type.as_str(),
            self.price,
            self.size,
            self.timestamp
        )
    }
}

// =============================================================================
// Domain Events
// =============================================================================

/// One decoded record from a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A trade record.
    Trade(Trade),
    /// A quote record.
    Quote(Quote),
    /// Server acknowledgement of a control message (join/leave reply).
    ControlAck {
        /// Topic the acknowledgement refers to.
        topic: String,
        /// Status reported by the server.
        status: String,
    },
    /// A record or event the client does not understand. Dropped by the pipeline.
    Unknown {
        /// Message type or event name as received.
        kind: String,
    },
}

#[allow(clippy::cast_possible_wrap)]
fn timestamp_to_utc(nanos: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, SubProvider::None)]
    #[test_case(1, SubProvider::CtaA)]
    #[test_case(2, SubProvider::CtaB)]
    #[test_case(3, SubProvider::Utp)]
    #[test_case(4, SubProvider::Otc)]
    #[test_case(5, SubProvider::NasdaqBasic)]
    #[test_case(6, SubProvider::Iex)]
    #[test_case(7, SubProvider::Iex)]
    #[test_case(255, SubProvider::Iex)]
    fn subprovider_from_wire(byte: u8, expected: SubProvider) {
        assert_eq!(SubProvider::from_wire(byte), expected);
    }

    #[test]
    fn subprovider_wire_byte_is_stable() {
        for byte in 0..=6 {
            assert_eq!(SubProvider::from_wire(byte).to_wire(), byte);
        }
    }

    #[test]
    fn trade_display_matches_csv_layout() {
        let trade = Trade {
            symbol: "AAPL".to_string(),
            price: 150.25,
            size: 100,
            timestamp: 1_700_000_000_000_000_000,
            total_volume: 5000,
            subprovider: None,
            market_center: None,
            condition: None,
        };
        assert_eq!(
            trade.to_string(),
            "AAPL,150.25,100,1700000000000000000,5000"
        );
    }

    #[test]
    fn quote_display_includes_side() {
        let quote = Quote {
            quote_type: QuoteType::Bid,
            symbol: "MSFT".to_string(),
            price: 10.5,
            size: 3,
            timestamp: 42,
            subprovider: None,
            market_center: None,
            condition: None,
        };
        assert_eq!(quote.to_string(), "MSFT,Bid,10.5,3,42");
    }

    #[test]
    fn timestamp_converts_to_utc() {
        let trade = Trade {
            symbol: "GE".to_string(),
            price: 1.0,
            size: 1,
            timestamp: 1_000_000_000,
            total_volume: 1,
            subprovider: None,
            market_center: None,
            condition: None,
        };
        assert_eq!(trade.time().timestamp(), 1);
    }
}
