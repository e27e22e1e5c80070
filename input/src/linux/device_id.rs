use crate::codes;
use crate::linux::glue;
use serde::{Deserialize, Serialize};

pub const VENDOR: u16 = 0x0001;
pub const PRODUCT: u16 = 0x0001;
pub const VERSION: u16 = 0x0001;
pub const BUSTYPE: u16 = codes::BUS_USB;

/// Identity of a device as reported by `EVIOCGID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            bustype: BUSTYPE,
            vendor: VENDOR,
            product: PRODUCT,
            version: VERSION,
        }
    }
}

impl From<glue::input_id> for DeviceInfo {
    fn from(id: glue::input_id) -> Self {
        Self {
            bustype: id.bustype,
            vendor: id.vendor,
            product: id.product,
            version: id.version,
        }
    }
}

impl From<DeviceInfo> for glue::input_id {
    fn from(info: DeviceInfo) -> Self {
        glue::input_id {
            bustype: info.bustype,
            vendor: info.vendor,
            product: info.product,
            version: info.version,
        }
    }
}
