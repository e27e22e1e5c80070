pub mod capabilities;
pub mod codes;
pub mod effect;
mod error;
mod event;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{
    candidate_nodes, is_device, is_event_node_name, list_devices, wait_any, CreateOptions,
    DeviceInfo, Discovery, DiscoveryConfig, Erase, EventIo, GrabGuard, InputDevice, KeyRepeat,
    Named, RawEffect, Sleeper, ThreadSleeper, Upload, UserDevice,
};

pub use capabilities::{AbsInfo, CapabilitySet, DeviceProfile};
pub use codes::{Category, Registry};
pub use effect::{Effect, EffectKind};
pub use error::{Error, ErrorKind, Result};
pub use event::{CategorizedEvent, CodedEvent, InputEvent, KeyEvent, KeyKind, KeyState};
