pub mod crc;
pub mod inverter;
pub mod packet;
pub mod telegram;

use crate::error::TransportError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// TCP port the serial bridge in front of StecaGrid inverters listens on.
pub const DEFAULT_PORT: u16 = 23;

// {{{ RequestKind
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RequestKind {
    DeviceTime = 0x04,
    PanelVoltage = 0x22,
    PanelCurrent = 0x23,
    PanelPower = 0x24,
    NominalAcPower = 0x29,
    AcPower = 0x2A,
    DailyYield = 0x3C,
}

impl RequestKind {
    pub const ALL: [RequestKind; 7] = [
        RequestKind::AcPower,
        RequestKind::NominalAcPower,
        RequestKind::PanelPower,
        RequestKind::PanelVoltage,
        RequestKind::PanelCurrent,
        RequestKind::DailyYield,
        RequestKind::DeviceTime,
    ];

    pub fn identifier(self) -> u8 {
        self.into()
    }

    /// Formula marker that precedes the value bytes in the response, for the
    /// kinds that carry a float measurement.
    pub fn formula_marker(self) -> Option<u8> {
        use RequestKind::*;

        match self {
            AcPower | NominalAcPower | PanelPower => Some(0x0B),
            PanelVoltage => Some(0x05),
            PanelCurrent => Some(0x07),
            DailyYield => Some(0x09),
            DeviceTime => None,
        }
    }

    pub fn name(self) -> &'static str {
        use RequestKind::*;

        match self {
            AcPower => "ac_power",
            NominalAcPower => "nominal_ac_power",
            PanelPower => "panel_power",
            PanelVoltage => "panel_voltage",
            PanelCurrent => "panel_current",
            DailyYield => "daily_yield",
            DeviceTime => "device_time",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
} // }}}

/// One-shot query without any per-device state: build the telegram, do a
/// single round trip and decode the response.
pub async fn query(
    host: &str,
    port: u16,
    kind: RequestKind,
) -> Result<packet::DecodedValue, TransportError> {
    inverter::Inverter::new(host, port).query(kind).await
}
