pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::config::{self, Config};
pub use crate::steca::{
    self,
    inverter::Inverter,
    packet::{DecodedValue, DeviceTime, MarkerSearch},
    RequestKind,
};
pub use crate::utils::Utils;
