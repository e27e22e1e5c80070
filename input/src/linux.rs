mod device;
mod device_id;
mod discovery;
mod effect;
mod event;
mod event_io;
mod glue;
mod user_device;

pub use device::{is_device, list_devices, GrabGuard, InputDevice, KeyRepeat};
pub use device_id::DeviceInfo;
pub use discovery::{
    candidate_nodes, is_event_node_name, Discovery, DiscoveryConfig, Named, Sleeper, ThreadSleeper,
};
pub use effect::RawEffect;
pub use event_io::{wait_any, EventIo};
pub use user_device::{CreateOptions, Erase, Upload, UserDevice};
