use crate::steca::crc::{self, CRC16_OFFSET, CRC8_OFFSET};
use crate::steca::RequestKind;

pub const START: [u8; 2] = [0x02, 0x01];
pub const HEADER_LENGTH: [u8; 2] = [0x00, 0x10];
pub const RECEIVER_ADDRESS: u8 = 0x01;
pub const SENDER_ADDRESS: u8 = 0xC9;
pub const SERVICE_CODE: u8 = 0x40;
pub const AUTH_LEVEL: u8 = 0x01;
pub const TERMINATOR: u8 = 0x03;

/// Every request telegram for a single-byte identifier is this long.
pub const TELEGRAM_LEN: usize = 16;

/// A complete framed and checksummed request, ready to write to the socket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Telegram(Vec<u8>);

impl Telegram {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Telegram {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Telegram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::utils::Utils::hex(&self.0))
    }
}

pub struct TelegramFactory;
impl TelegramFactory {
    pub fn build(kind: RequestKind) -> Telegram {
        Self::build_raw(kind.identifier())
    }

    /// Builds a telegram for an arbitrary identifier byte, including ones not
    /// in the `RequestKind` catalogue.
    pub fn build_raw(identifier: u8) -> Telegram {
        // the length field counts the identifier only, not its checksum
        let data_frame = [identifier, crc::frame_crc(CRC8_OFFSET, &[identifier])];
        let data_length = 1u16;

        let mut r = Vec::with_capacity(TELEGRAM_LEN);

        r.extend_from_slice(&START);
        r.extend_from_slice(&HEADER_LENGTH);
        r.push(RECEIVER_ADDRESS);
        r.push(SENDER_ADDRESS);
        r.push(crc::crc8(CRC8_OFFSET, &r));

        r.push(SERVICE_CODE);
        r.push(AUTH_LEVEL);
        r.extend_from_slice(&data_length.to_be_bytes());
        r.extend_from_slice(&data_frame);

        let checksum = Self::trailer_crc(&r);
        r.extend_from_slice(&checksum.to_be_bytes());
        r.push(TERMINATOR);

        Telegram(r)
    }

    /// CRC-16 over `body` followed by the terminator byte.
    pub fn trailer_crc(body: &[u8]) -> u16 {
        crc::crc16(crc::crc16(CRC16_OFFSET, body), &[TERMINATOR])
    }
}
