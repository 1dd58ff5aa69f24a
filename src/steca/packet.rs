use crate::prelude::*;

use crate::error::ProtocolError;
use crate::steca::crc::{self, CRC8_OFFSET};
use crate::steca::telegram::{TelegramFactory, TERMINATOR};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Anything shorter than this is a truncated frame from the bridge.
pub const MIN_RESPONSE_LEN: usize = 11;

pub const RESPONSE_CODE_OFFSET: usize = 8;
pub const IDENTIFIER_OFFSET: usize = 11;
pub const RESPONSE_SERVICE_NOT_SUPPORTED: u8 = 0x01;

/// First byte after the echoed identifier; markers are never searched for
/// before this.
pub const PAYLOAD_OFFSET: usize = 12;

/// Marker position used by older firmware captures.
pub const LEGACY_MARKER_OFFSET: usize = 22;

/// CRC-16 (2 bytes) plus terminator.
pub const TRAILER_LEN: usize = 3;
const HEADER_LEN: usize = 7;

pub const POWER_MIN: f32 = 0.0;
pub const POWER_MAX: f32 = 10_000.0;

// year, month, day, hour, minute, second
const DATE_TIME_OFFSETS: [usize; 6] = [13, 17, 21, 25, 29, 33];
const STATUS_OFFSET: usize = 39;
const STATUS_TAIL_LEN: usize = 4;

// {{{ DecodedValue
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum DecodedValue {
    Measurement(f32),
    DeviceTime(DeviceTime),
    ServiceNotSupported,
    /// Inverter answered but has nothing to report (idle, night, clouds).
    NoData,
    Malformed,
}

impl DecodedValue {
    /// True for the variants that carry an actual reading.
    pub fn is_available(&self) -> bool {
        matches!(self, DecodedValue::Measurement(_) | DecodedValue::DeviceTime(_))
    }

    pub fn measurement(&self) -> Option<f32> {
        match self {
            DecodedValue::Measurement(v) => Some(*v),
            _ => None,
        }
    }

    pub fn device_time(&self) -> Option<&DeviceTime> {
        match self {
            DecodedValue::DeviceTime(t) => Some(t),
            _ => None,
        }
    }
}

impl From<ProtocolError> for DecodedValue {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ServiceNotSupported => DecodedValue::ServiceNotSupported,
            ProtocolError::Malformed(_) => DecodedValue::Malformed,
            ProtocolError::MissingMarker { .. } | ProtocolError::OutOfRange(_) => {
                DecodedValue::NoData
            }
        }
    }
}

impl std::fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodedValue::Measurement(v) => write!(f, "{}", Utils::round(f64::from(*v), 1)),
            DecodedValue::DeviceTime(t) => write!(f, "{}", t),
            DecodedValue::ServiceNotSupported => write!(f, "service not supported"),
            DecodedValue::NoData => write!(f, "no data"),
            DecodedValue::Malformed => write!(f, "malformed response"),
        }
    }
} // }}}

// {{{ DeviceTime
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeviceTime {
    pub year: i16,
    pub month: i16,
    pub day: i16,
    pub hour: i16,
    pub minute: i16,
    pub second: i16,
    pub status: String,
}

impl DeviceTime {
    fn decode(input: &[u8]) -> Result<Self, ProtocolError> {
        let mut fields = [0i16; 6];
        for (field, &offset) in fields.iter_mut().zip(DATE_TIME_OFFSETS.iter()) {
            *field = Utils::be_i16_at(input, offset).ok_or_else(|| {
                ProtocolError::Malformed(format!(
                    "date/time field at offset {} missing from {} byte response",
                    offset,
                    input.len()
                ))
            })?;
        }
        let [year, month, day, hour, minute, second] = fields;

        let status = input
            .get(STATUS_OFFSET..input.len().saturating_sub(STATUS_TAIL_LEN))
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches('\0')
                    .to_string()
            })
            .unwrap_or_default();

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            status,
        })
    }

    /// `YYYY-MM-DD HH:MM:SS`, zero padded.
    pub fn timestamp(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    /// None when the inverter reports fields that are not a valid calendar
    /// date/time.
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        let field = |v: i16| u32::try_from(v).ok();

        NaiveDate::from_ymd_opt(i32::from(self.year), field(self.month)?, field(self.day)?)?
            .and_hms_opt(field(self.hour)?, field(self.minute)?, field(self.second)?)
    }
}

impl std::fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, status: '{}'", self.timestamp(), self.status)
    }
} // }}}

/// Where to look for the formula marker in a measurement response.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MarkerSearch {
    /// First occurrence at or after `PAYLOAD_OFFSET`.
    #[default]
    Scan,
    /// Marker must sit at exactly this offset.
    Fixed(usize),
}

// {{{ Decoder
#[derive(Clone, Debug, Default)]
pub struct Decoder {
    marker_search: MarkerSearch,
    strict_checksum: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker_search(mut self, marker_search: MarkerSearch) -> Self {
        self.marker_search = marker_search;
        self
    }

    pub fn with_strict_checksum(mut self, strict_checksum: bool) -> Self {
        self.strict_checksum = strict_checksum;
        self
    }

    /// Decodes the response to a `kind` request. Never fails: anything that
    /// is not a reading comes back as one of the sentinel variants.
    pub fn decode(&self, kind: RequestKind, input: &[u8]) -> DecodedValue {
        match self.parse(kind, input) {
            Ok(value) => value,
            Err(err) => {
                match &err {
                    ProtocolError::OutOfRange(v) => {
                        warn!("{}: unusual value {}, probably a corrupt response", kind, v)
                    }
                    ProtocolError::ServiceNotSupported => {
                        warn!("{}: service not supported by inverter", kind)
                    }
                    _ => debug!("{}: {}", kind, err),
                }
                err.into()
            }
        }
    }

    pub fn parse(&self, kind: RequestKind, input: &[u8]) -> Result<DecodedValue, ProtocolError> {
        if input.len() < MIN_RESPONSE_LEN {
            return Err(ProtocolError::Malformed(format!(
                "response too short ({} bytes)",
                input.len()
            )));
        }

        if input[RESPONSE_CODE_OFFSET] == RESPONSE_SERVICE_NOT_SUPPORTED {
            return Err(ProtocolError::ServiceNotSupported);
        }

        if let Err(err) = Self::verify_checksums(input) {
            if self.strict_checksum {
                return Err(err);
            }
            debug!("{}: ignoring {}", kind, err);
        }

        match input.get(IDENTIFIER_OFFSET) {
            Some(&echoed) if echoed != kind.identifier() => debug!(
                "{}: response echoes identifier {:#04x}, expected {:#04x}",
                kind,
                echoed,
                kind.identifier()
            ),
            _ => {}
        }

        match kind.formula_marker() {
            Some(marker) => {
                let offset = self
                    .locate_marker(input, marker)
                    .ok_or(ProtocolError::MissingMarker { marker })?;
                let value = Utils::formula_at(input, offset + 1)
                    .ok_or(ProtocolError::MissingMarker { marker })?;

                Self::check_range(kind, value).map(DecodedValue::Measurement)
            }
            None => DeviceTime::decode(input).map(DecodedValue::DeviceTime),
        }
    }

    /// Offset of `marker` such that its three value bytes end before the
    /// trailer.
    pub fn locate_marker(&self, input: &[u8], marker: u8) -> Option<usize> {
        let end = input.len().checked_sub(TRAILER_LEN)?;
        let fits = |offset: usize| offset.checked_add(4).map_or(false, |last| last <= end);

        match self.marker_search {
            MarkerSearch::Fixed(offset) => {
                (fits(offset) && input.get(offset) == Some(&marker)).then_some(offset)
            }
            MarkerSearch::Scan => (PAYLOAD_OFFSET..input.len())
                .take_while(|&offset| fits(offset))
                .find(|&offset| input[offset] == marker),
        }
    }

    fn check_range(kind: RequestKind, value: f32) -> Result<f32, ProtocolError> {
        let plausible = match kind {
            // yield accumulates over the day, no upper bound
            RequestKind::DailyYield => value == 0.0 || (value.is_normal() && value > 0.0),
            // subnormals are what an idle inverter's near-zero bytes decode to
            _ => value.is_normal() && value > POWER_MIN && value <= POWER_MAX,
        };

        if plausible {
            Ok(value)
        } else {
            Err(ProtocolError::OutOfRange(value))
        }
    }

    /// Checks the header CRC-8 at byte 6 and the trailing CRC-16 + terminator.
    pub fn verify_checksums(input: &[u8]) -> Result<(), ProtocolError> {
        let len = input.len();
        if len < HEADER_LEN + TRAILER_LEN {
            return Err(ProtocolError::Malformed(format!(
                "{} bytes is too short to carry checksums",
                len
            )));
        }

        let header_crc = crc::crc8(CRC8_OFFSET, &input[..HEADER_LEN - 1]);
        if input[HEADER_LEN - 1] != header_crc {
            return Err(ProtocolError::Malformed(format!(
                "header checksum mismatch - got {:#04x}, expected {:#04x}",
                input[HEADER_LEN - 1],
                header_crc
            )));
        }

        if input[len - 1] != TERMINATOR {
            return Err(ProtocolError::Malformed(format!(
                "missing terminator, last byte is {:#04x}",
                input[len - 1]
            )));
        }

        let expected = TelegramFactory::trailer_crc(&input[..len - TRAILER_LEN]);
        let got = u16::from_be_bytes([input[len - 3], input[len - 2]]);
        if got != expected {
            return Err(ProtocolError::Malformed(format!(
                "trailer checksum mismatch - got {:#06x}, expected {:#06x}",
                got, expected
            )));
        }

        Ok(())
    }
} // }}}
