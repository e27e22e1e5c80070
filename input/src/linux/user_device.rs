//! Virtual input devices backed by uinput.

use crate::capabilities::{CapabilitySet, DeviceProfile};
use crate::codes;
use crate::effect::Effect;
use crate::error::{Error, Result};
use crate::linux::device::{is_device, open_node, InputDevice};
use crate::linux::device_id::DeviceInfo;
use crate::linux::discovery::{Discovery, DiscoveryConfig, ThreadSleeper};
use crate::linux::event_io::EventIo;
use crate::linux::glue;
use log::{debug, error, info, warn};
use nix::sys::ioctl::ioctl_num_type;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

const SYSNAME_BUFFER: usize = 64;

/// Everything needed to provision a virtual device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CreateOptions {
    pub capabilities: CapabilitySet,
    pub name: String,
    pub info: DeviceInfo,
    pub devnode: PathBuf,
    pub phys: String,
    pub properties: BTreeSet<u16>,
    pub max_effects: u32,
    pub discovery: DiscoveryConfig,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            capabilities: CapabilitySet::all_keys(),
            name: String::from("evinput-uinput"),
            info: DeviceInfo::default(),
            devnode: PathBuf::from("/dev/uinput"),
            phys: String::from("evinput-uinput"),
            properties: BTreeSet::new(),
            max_effects: codes::FF_MAX_EFFECTS,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl CreateOptions {
    fn validate(&self) -> Result<(CString, CString)> {
        if !is_device(&self.devnode) {
            return Err(Error::InvalidArgument(format!(
                "User input device '{}' is not a writable character device file.",
                self.devnode.display()
            )));
        }
        if self.name.len() >= glue::UINPUT_MAX_NAME_SIZE {
            return Err(Error::InvalidArgument(format!(
                "User input device name '{}' must be shorter than {} bytes.",
                self.name,
                glue::UINPUT_MAX_NAME_SIZE
            )));
        }

        let nul = |what: &str| {
            Error::InvalidArgument(format!("User input device {} contains a NUL byte.", what))
        };
        let name = CString::new(self.name.as_str()).map_err(|_| nul("name"))?;
        let phys = CString::new(self.phys.as_str()).map_err(|_| nul("physical path"))?;
        Ok((name, phys))
    }
}

/// A pending force-feedback upload on a virtual device.
///
/// `effect` is the effect being uploaded and `old` the one it replaces, if
/// any. Set `retval` to zero to accept the upload or to a negative errno to
/// refuse it, then hand it back with [`UserDevice::end_upload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upload {
    pub request_id: u32,
    pub retval: i32,
    pub effect: Effect,
    pub old: Effect,
}

/// A pending force-feedback erase on a virtual device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Erase {
    pub request_id: u32,
    pub retval: i32,
    pub effect_id: u32,
}

/// A virtual input device. Destroyed when closed or dropped.
#[derive(Debug)]
pub struct UserDevice {
    io: EventIo,
    name: String,
    phys: String,
    info: DeviceInfo,
    devnode: PathBuf,
    properties: BTreeSet<u16>,
    capabilities: CapabilitySet,
    max_effects: u32,
    device: Option<InputDevice>,
    destroyed: bool,
}

impl UserDevice {
    /// Creates the device and looks up its event node.
    ///
    /// A failure after the uinput node was opened is a
    /// [`Error::PartialSetup`]; the half-configured device is torn down when
    /// the error is returned. Not finding the event node is not an error,
    /// [`UserDevice::device`] is `None` then.
    pub fn create(options: &CreateOptions) -> Result<Self> {
        let (name, phys) = options.validate()?;

        let file = open_node(&options.devnode, true).map_err(|source| Error::Os {
            context: String::from("Open user input device failed"),
            source,
        })?;
        let mut device = UserDevice {
            io: EventIo::new(file),
            name: options.name.clone(),
            phys: options.phys.clone(),
            info: options.info,
            devnode: options.devnode.clone(),
            properties: options.properties.clone(),
            capabilities: options.capabilities.clone(),
            max_effects: options.max_effects,
            device: None,
            // Nothing to destroy until UI_DEV_CREATE succeeds.
            destroyed: true,
        };
        let fd = device.io.as_raw_fd();

        unsafe {
            glue::ioctl_ptr(
                fd,
                glue::UI_SET_PHYS,
                phys.as_ptr() as *mut libc::c_char,
                "Setting user input device physical path failed",
            )
        }
        .map_err(partial)?;

        for &property in &options.properties {
            glue::ioctl_int(
                fd,
                glue::UI_SET_PROPBIT,
                property.into(),
                "Setting user input device property failed",
            )
            .map_err(partial)?;
        }

        enable(fd, &options.capabilities)?;
        setup(fd, &name, options)?;

        glue::ioctl_none(fd, glue::UI_DEV_CREATE, "Failed to create user input device")
            .map_err(partial)?;
        device.destroyed = false;
        info!("Created virtual device {}", options.name);

        let sysname = read_sysname(fd);
        let mut discovery = Discovery::new(&options.discovery, ThreadSleeper, |path: &Path| {
            InputDevice::open(path)
        });
        match discovery.find(sysname.as_deref(), &options.name) {
            Ok(found) => {
                debug!("Virtual device {} is {}", options.name, found.path().display());
                device.device = Some(found);
            }
            Err(err) => warn!("Virtual device {} has no readable node: {}", options.name, err),
        }

        Ok(device)
    }

    /// Creates a device combining the capabilities of `devices`.
    ///
    /// Event types in `excluded` are left out. The device holds as many
    /// effects as the weakest source, and at most `options.max_effects`.
    pub fn create_from_devices(
        devices: &[InputDevice],
        excluded: &BTreeSet<u16>,
        options: &CreateOptions,
    ) -> Result<Self> {
        let profiles: Vec<DeviceProfile> = devices.iter().map(InputDevice::profile).collect();
        let merged = DeviceProfile::merge(&profiles, excluded, options.max_effects);

        Self::create(&CreateOptions {
            capabilities: merged.capabilities,
            max_effects: merged.max_effects,
            ..options.clone()
        })
    }

    /// Like [`UserDevice::create_from_devices`], opening the sources first.
    /// Paths that fail to open are skipped.
    pub fn create_from_paths<P: AsRef<Path>>(
        paths: &[P],
        excluded: &BTreeSet<u16>,
        options: &CreateOptions,
    ) -> Result<Self> {
        let devices: Vec<InputDevice> = paths
            .iter()
            .filter_map(|path| match InputDevice::open(path) {
                Ok(device) => Some(device),
                Err(err) => {
                    warn!("Skipping {}: {}", path.as_ref().display(), err);
                    None
                }
            })
            .collect();

        Self::create_from_devices(&devices, excluded, options)
    }

    pub fn io(&self) -> &EventIo {
        &self.io
    }

    pub fn write(&self, type_: u16, code: u16, value: i32) -> Result<()> {
        self.io.write(type_, code, value)
    }

    /// Ends the current batch of events with `SYN_REPORT`.
    pub fn synchronize(&self) -> Result<()> {
        self.io.write(codes::EV_SYN, codes::SYN_REPORT, 0)
    }

    /// The event node of this device, if discovery found it.
    pub fn device(&self) -> Option<&InputDevice> {
        self.device.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phys(&self) -> &str {
        &self.phys
    }

    pub fn info(&self) -> DeviceInfo {
        self.info
    }

    pub fn devnode(&self) -> &Path {
        &self.devnode
    }

    pub fn properties(&self) -> &BTreeSet<u16> {
        &self.properties
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn max_effects(&self) -> u32 {
        self.max_effects
    }

    /// Fetches the upload announced by an `EV_UINPUT`/`UI_FF_UPLOAD` event
    /// whose value is `request_id`.
    pub fn begin_upload(&self, request_id: u32) -> Result<Upload> {
        let mut upload = glue::uinput_ff_upload {
            request_id,
            ..glue::uinput_ff_upload::default()
        };
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::UI_BEGIN_FF_UPLOAD,
                &mut upload,
                "Failed to begin uinput upload",
            )?
        };

        Ok(Upload {
            request_id: upload.request_id,
            retval: upload.retval,
            effect: Effect::from_raw(&upload.effect),
            old: Effect::from_raw(&upload.old),
        })
    }

    pub fn end_upload(&self, upload: &Upload) -> Result<()> {
        let mut raw = glue::uinput_ff_upload {
            request_id: upload.request_id,
            retval: upload.retval,
            effect: upload.effect.to_raw(),
            old: upload.old.to_raw(),
        };
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::UI_END_FF_UPLOAD,
                &mut raw,
                "Failed to end uinput upload",
            )?
        };
        Ok(())
    }

    /// Fetches the erase announced by an `EV_UINPUT`/`UI_FF_ERASE` event
    /// whose value is `request_id`.
    pub fn begin_erase(&self, request_id: u32) -> Result<Erase> {
        let mut erase = glue::uinput_ff_erase {
            request_id,
            retval: 0,
            effect_id: 0,
        };
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::UI_BEGIN_FF_ERASE,
                &mut erase,
                "Failed to begin uinput erase",
            )?
        };

        Ok(Erase {
            request_id: erase.request_id,
            retval: erase.retval,
            effect_id: erase.effect_id,
        })
    }

    pub fn end_erase(&self, erase: &Erase) -> Result<()> {
        let mut raw = glue::uinput_ff_erase {
            request_id: erase.request_id,
            retval: erase.retval,
            effect_id: erase.effect_id,
        };
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::UI_END_FF_ERASE,
                &mut raw,
                "Failed to end uinput erase",
            )?
        };
        Ok(())
    }

    /// Destroys the device now instead of on drop, reporting failure.
    pub fn close(mut self) -> Result<()> {
        self.destroy()
    }

    fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.device = None;
        glue::ioctl_none(self.fd(), glue::UI_DEV_DESTROY, "Failed to close user input device")?;
        debug!("Destroyed virtual device {}", self.name);
        Ok(())
    }

    fn fd(&self) -> RawFd {
        self.io.as_raw_fd()
    }
}

impl Drop for UserDevice {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            warn!("{}", err);
        }
    }
}

impl AsRawFd for UserDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

fn partial(err: Error) -> Error {
    match err {
        Error::Os { context, source } => Error::PartialSetup { context, source },
        other => other,
    }
}

fn set_bit_request(type_: u16) -> Option<ioctl_num_type> {
    let request = match type_ {
        codes::EV_KEY => glue::UI_SET_KEYBIT,
        codes::EV_ABS => glue::UI_SET_ABSBIT,
        codes::EV_REL => glue::UI_SET_RELBIT,
        codes::EV_MSC => glue::UI_SET_MSCBIT,
        codes::EV_SW => glue::UI_SET_SWBIT,
        codes::EV_LED => glue::UI_SET_LEDBIT,
        codes::EV_FF => glue::UI_SET_FFBIT,
        codes::EV_SND => glue::UI_SET_SNDBIT,
        _ => return None,
    };
    Some(request)
}

fn enable(fd: RawFd, capabilities: &CapabilitySet) -> Result<()> {
    for (type_, members) in capabilities.enable_plan() {
        let request = set_bit_request(type_).ok_or_else(|| {
            Error::InvalidArgument(format!("Unsupported event type 0x{:X}", type_))
        })?;

        debug!("Enabling {} codes of event type 0x{:02x}", members.len(), type_);
        glue::ioctl_int(fd, glue::UI_SET_EVBIT, type_.into(), "Failed to enable event type")
            .and_then(|_| {
                members.iter().try_for_each(|&code| {
                    glue::ioctl_int(fd, request, code.into(), "Failed to enable event code")
                        .map(drop)
                })
            })
            .map_err(|err| {
                error!("Enabling event type 0x{:02x} failed: {}", type_, err);
                partial(err)
            })?;
    }
    Ok(())
}

fn setup(fd: RawFd, name: &CString, options: &CreateOptions) -> Result<()> {
    for (&code, &info) in &options.capabilities.absolute_axes {
        let mut abs_setup = glue::uinput_abs_setup {
            code,
            absinfo: info.into(),
        };
        unsafe {
            glue::ioctl_ptr(
                fd,
                glue::UI_ABS_SETUP,
                &mut abs_setup,
                "Failed to setup absolute axis",
            )
        }
        .map_err(partial)?;
    }

    let mut usetup = glue::uinput_setup {
        id: options.info.into(),
        name: [0; glue::UINPUT_MAX_NAME_SIZE],
        ff_effects_max: options.max_effects,
    };
    for (dst, &src) in usetup.name.iter_mut().zip(name.as_bytes()) {
        *dst = src as libc::c_char;
    }
    unsafe {
        glue::ioctl_ptr(
            fd,
            glue::UI_DEV_SETUP,
            &mut usetup,
            "Failed to setup user device info",
        )
    }
    .map_err(partial)?;
    Ok(())
}

// The kernel's name for the device, as in /sys/devices/virtual/input/<name>.
fn read_sysname(fd: RawFd) -> Option<String> {
    let mut buffer = [0u8; SYSNAME_BUFFER];
    let result = unsafe {
        glue::ioctl_ptr(
            fd,
            glue::ui_get_sysname(buffer.len()),
            buffer.as_mut_ptr(),
            "UI_GET_SYSNAME failed",
        )
    };
    match result {
        Ok(_) => {
            let end = buffer.iter().position(|&byte| byte == 0).unwrap_or(buffer.len());
            Some(String::from_utf8_lossy(&buffer[..end]).into_owned())
        }
        Err(err) => {
            debug!("{}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_every_key() {
        let options = CreateOptions::default();
        assert_eq!(options.name, "evinput-uinput");
        assert_eq!(options.info.bustype, codes::BUS_USB);
        assert_eq!(options.max_effects, 96);
        assert!(options.capabilities.keys.contains(&codes::KEY_A));
        assert!(options.capabilities.keys.contains(&codes::BTN_LEFT));
    }

    #[test]
    fn devnode_must_be_a_character_device() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let options = CreateOptions {
            devnode: file.path().to_owned(),
            ..CreateOptions::default()
        };
        let err = UserDevice::create(&options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn long_names_are_rejected() {
        let options = CreateOptions {
            devnode: PathBuf::from("/dev/null"),
            name: "x".repeat(glue::UINPUT_MAX_NAME_SIZE),
            ..CreateOptions::default()
        };
        let err = UserDevice::create(&options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("shorter than 80"));
    }

    #[test]
    fn setup_failures_are_partial() {
        // /dev/null accepts the open but rejects every uinput ioctl.
        let options = CreateOptions {
            devnode: PathBuf::from("/dev/null"),
            ..CreateOptions::default()
        };
        let err = UserDevice::create(&options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PartialSetup);
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }

    #[test]
    fn enable_failures_abort_as_partial() {
        let null = std::fs::OpenOptions::new().write(true).open("/dev/null").unwrap();
        let capabilities = CapabilitySet {
            keys: [codes::KEY_A].into_iter().collect(),
            ..CapabilitySet::default()
        };

        let err = enable(null.as_raw_fd(), &capabilities).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PartialSetup);
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }

    #[test]
    fn enabling_nothing_issues_no_request() {
        let null = std::fs::OpenOptions::new().write(true).open("/dev/null").unwrap();
        assert!(enable(null.as_raw_fd(), &CapabilitySet::default()).is_ok());
    }

    #[test]
    fn every_enabled_type_has_a_request() {
        for type_ in crate::capabilities::ENABLE_ORDER {
            assert!(set_bit_request(type_).is_some());
        }
        assert!(set_bit_request(codes::EV_SYN).is_none());
    }
}
