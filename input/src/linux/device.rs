use crate::capabilities::{set_bits, AbsInfo, CapabilitySet, DeviceProfile};
use crate::codes::{self, Registry};
use crate::effect::Effect;
use crate::error::{Error, Result};
use crate::linux::device_id::DeviceInfo;
use crate::linux::event_io::EventIo;
use crate::linux::glue;
use log::{debug, warn};
use nix::sys::ioctl::ioctl_num_type;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

const STRING_BUFFER: usize = 256;

/// Key auto-repeat settings: `rate` repeats per second after `delay`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyRepeat {
    pub rate: u32,
    pub delay: Duration,
}

/// An opened evdev node, `/dev/input/event*`.
#[derive(Debug)]
pub struct InputDevice {
    io: EventIo,
    path: PathBuf,
    info: DeviceInfo,
    name: String,
    phys: String,
    uniq: String,
    driver_version: i32,
    capabilities: CapabilitySet,
    ff_effects_count: u32,
}

impl InputDevice {
    /// Opens `path` read-write, or read-only if writing is not permitted,
    /// and queries everything the device reports about itself.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = open_node(path, true)
            .or_else(|_| open_node(path, false))
            .map_err(|source| Error::Os {
                context: format!("Open input device {} failed", path.display()),
                source,
            })?;
        let fd = file.as_raw_fd();

        let mut id = glue::input_id {
            bustype: 0,
            vendor: 0,
            product: 0,
            version: 0,
        };
        unsafe { glue::ioctl_ptr(fd, glue::EVIOCGID, &mut id, "Input device info query failed")? };

        let name = read_string(fd, glue::eviocgname, "Input device name query failed")?;
        // Many devices have no physical topology or unique id; both stay blank.
        let phys = read_string(fd, glue::eviocgphys, "").unwrap_or_default();
        let uniq = read_string(fd, glue::eviocguniq, "").unwrap_or_default();

        let mut driver_version: libc::c_int = 0;
        unsafe {
            glue::ioctl_ptr(
                fd,
                glue::EVIOCGVERSION,
                &mut driver_version,
                "Input device protocol version query failed",
            )?
        };

        let capabilities = query_capabilities(fd, codes::registry())?;

        let mut ff_effects_count: libc::c_int = 0;
        unsafe {
            glue::ioctl_ptr(
                fd,
                glue::EVIOCGEFFECTS,
                &mut ff_effects_count,
                "Input device ff-effects count query failed",
            )?
        };

        debug!("Opened input device {} ({})", path.display(), name);
        Ok(Self {
            io: EventIo::new(file),
            path: path.to_owned(),
            info: id.into(),
            name,
            phys,
            uniq,
            driver_version,
            capabilities,
            ff_effects_count: ff_effects_count.max(0) as u32,
        })
    }

    pub fn io(&self) -> &EventIo {
        &self.io
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> DeviceInfo {
        self.info
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phys(&self) -> &str {
        &self.phys
    }

    pub fn uniq(&self) -> &str {
        &self.uniq
    }

    /// The evdev protocol version of the driver.
    pub fn driver_version(&self) -> i32 {
        self.driver_version
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Number of effects the device can hold at once.
    pub fn ff_effects_count(&self) -> u32 {
        self.ff_effects_count
    }

    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile {
            capabilities: self.capabilities.clone(),
            max_effects: self.ff_effects_count,
        }
    }

    /// Claims the device's events for this handle alone. Grabbing a device
    /// that is already grabbed fails with `EBUSY`.
    pub fn grab(&self) -> Result<()> {
        glue::ioctl_int(self.fd(), glue::EVIOCGRAB, 1, "Input device grabbing failed")?;
        Ok(())
    }

    pub fn ungrab(&self) -> Result<()> {
        glue::ioctl_int(self.fd(), glue::EVIOCGRAB, 0, "Input device ungrabbing failed")?;
        Ok(())
    }

    /// Grabs the device until the returned guard is dropped.
    pub fn grab_scoped(&self) -> Result<GrabGuard<'_>> {
        self.grab()?;
        Ok(GrabGuard { device: self })
    }

    pub fn properties(&self) -> Result<BTreeSet<u16>> {
        self.read_bits(
            glue::eviocgprop,
            codes::INPUT_PROP_MAX,
            "Input device properties query failed",
        )
    }

    /// Keys and buttons currently held down.
    pub fn active_keys(&self) -> Result<BTreeSet<u16>> {
        self.read_bits(
            glue::eviocgkey,
            codes::KEY_MAX,
            "Input device getting active keys failed",
        )
    }

    /// LEDs currently lit.
    pub fn leds(&self) -> Result<BTreeSet<u16>> {
        self.read_bits(
            glue::eviocgled,
            codes::LED_MAX,
            "Input device getting active LEDs failed",
        )
    }

    pub fn set_led(&self, led: u16, value: i32) -> Result<()> {
        self.io.write(codes::EV_LED, led, value)
    }

    pub fn repeat(&self) -> Result<KeyRepeat> {
        let mut rep = [0u32; 2];
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::EVIOCGREP,
                &mut rep,
                "Input device getting key-repeat failed",
            )?
        };
        Ok(KeyRepeat {
            rate: rep[0],
            delay: Duration::from_millis(rep[1].into()),
        })
    }

    pub fn set_repeat(&self, repeat: KeyRepeat) -> Result<()> {
        let mut rep = [repeat.rate, repeat.delay.as_millis() as u32];
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::EVIOCSREP,
                &mut rep,
                "Input device setting key-repeat failed",
            )?
        };
        Ok(())
    }

    /// Changes the range of an absolute axis and records it in the cached
    /// capability set.
    pub fn set_abs_info(&mut self, code: u16, info: AbsInfo) -> Result<()> {
        let mut absinfo = glue::input_absinfo::from(info);
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::eviocsabs(code),
                &mut absinfo,
                "Input device setting absolute axis info failed",
            )?
        };
        self.capabilities.absolute_axes.insert(code, info);
        Ok(())
    }

    /// Uploads `effect` into a new slot and returns the slot's id. The id of
    /// `effect` itself is ignored.
    pub fn upload_effect(&self, effect: &Effect) -> Result<i16> {
        let mut raw = effect.to_raw();
        raw.id = -1;
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::EVIOCSFF,
                &mut raw,
                "Input device uploading effect failed",
            )?
        };
        Ok(raw.id)
    }

    /// Replaces the effect in slot `effect.id`.
    pub fn update_effect(&self, effect: &Effect) -> Result<()> {
        let mut raw = effect.to_raw();
        unsafe {
            glue::ioctl_ptr(
                self.fd(),
                glue::EVIOCSFF,
                &mut raw,
                "Input device uploading effect failed",
            )?
        };
        Ok(())
    }

    pub fn erase_effect(&self, id: i16) -> Result<()> {
        glue::ioctl_int(
            self.fd(),
            glue::EVIOCRMFF,
            id.into(),
            "Input device erasing effect failed",
        )?;
        Ok(())
    }

    /// Starts playing an uploaded effect `count` times. Zero stops it.
    pub fn play_effect(&self, id: i16, count: i32) -> Result<()> {
        self.io.write(codes::EV_FF, id as u16, count)
    }

    /// Erases every effect slot. Slots that are already empty fail to erase;
    /// those failures are ignored.
    pub fn clear_effects(&self) {
        for id in 0..self.ff_effects_count.min(i16::MAX as u32) {
            if let Err(err) = self.erase_effect(id as i16) {
                debug!("Erasing effect {} of {}: {}", id, self.path.display(), err);
            }
        }
    }

    fn read_bits(
        &self,
        request: fn(usize) -> ioctl_num_type,
        max: u16,
        context: &str,
    ) -> Result<BTreeSet<u16>> {
        let mut bytes = vec![0u8; max as usize / 8 + 1];
        unsafe { glue::ioctl_ptr(self.fd(), request(bytes.len()), bytes.as_mut_ptr(), context)? };
        Ok(set_bits(&bytes, max).collect())
    }

    fn fd(&self) -> RawFd {
        self.io.as_raw_fd()
    }
}

impl AsRawFd for InputDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

/// Releases the grab on drop.
pub struct GrabGuard<'a> {
    device: &'a InputDevice,
}

impl Drop for GrabGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.device.ungrab() {
            warn!("{}: {}", self.device.path.display(), err);
        }
    }
}

impl From<AbsInfo> for glue::input_absinfo {
    fn from(info: AbsInfo) -> Self {
        glue::input_absinfo {
            value: info.value,
            minimum: info.minimum,
            maximum: info.maximum,
            fuzz: info.fuzz,
            flat: info.flat,
            resolution: info.resolution,
        }
    }
}

impl From<glue::input_absinfo> for AbsInfo {
    fn from(info: glue::input_absinfo) -> Self {
        AbsInfo {
            value: info.value,
            minimum: info.minimum,
            maximum: info.maximum,
            fuzz: info.fuzz,
            flat: info.flat,
            resolution: info.resolution,
        }
    }
}

pub(crate) fn open_node(path: &Path, write: bool) -> io::Result<fs::File> {
    OpenOptions::new()
        .read(true)
        .write(write)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
}

fn read_string(
    fd: RawFd,
    request: fn(usize) -> ioctl_num_type,
    context: &str,
) -> Result<String> {
    let mut buffer = [0u8; STRING_BUFFER];
    unsafe { glue::ioctl_ptr(fd, request(buffer.len()), buffer.as_mut_ptr(), context)? };
    let end = buffer.iter().position(|&byte| byte == 0).unwrap_or(buffer.len());
    Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
}

/// Reads the capability bitmaps of an open device.
///
/// Only the event type query is fatal. A failing code or axis query leaves
/// that type or axis out of the result.
pub(crate) fn query_capabilities(fd: RawFd, registry: &Registry) -> Result<CapabilitySet> {
    let mut type_bits = [0u8; codes::EV_MAX as usize / 8 + 1];
    unsafe {
        glue::ioctl_ptr(
            fd,
            glue::eviocgbit(0, type_bits.len()),
            type_bits.as_mut_ptr(),
            "Getting capabilities of input device failed",
        )?
    };

    let code_bits = |type_: u16| {
        let mut bits = vec![0u8; codes::KEY_MAX as usize / 8 + 1];
        let request = glue::eviocgbit(type_, bits.len());
        match unsafe { glue::ioctl_ptr(fd, request, bits.as_mut_ptr(), "Code bitmap query failed") } {
            Ok(_) => Some(bits),
            Err(err) => {
                warn!("Skipping event type 0x{:02x}: {}", type_, err);
                None
            }
        }
    };

    let abs_info = |code: u16| {
        let mut info = glue::input_absinfo::from(AbsInfo::default());
        match unsafe { glue::ioctl_ptr(fd, glue::eviocgabs(code), &mut info, "Axis query failed") } {
            Ok(_) => Some(AbsInfo::from(info)),
            Err(err) => {
                warn!("Skipping absolute axis 0x{:02x}: {}", code, err);
                None
            }
        }
    };

    Ok(CapabilitySet::from_bitmaps(&type_bits, code_bits, abs_info, registry))
}

/// Event nodes in `dir` this process can read and write. A missing directory
/// has no devices.
pub fn list_devices<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::Os {
                context: format!("Listing {} failed", dir.display()),
                source,
            })
        }
    };

    let mut devices = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_event = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("event"))
            .unwrap_or(false);
        if is_event && is_device(&path) {
            devices.push(path);
        }
    }

    Ok(devices)
}

/// True if `path` is a character device with group read and write
/// permission.
pub fn is_device<P: AsRef<Path>>(path: P) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => {
            metadata.file_type().is_char_device()
                && metadata.permissions().mode() & 0o060 == 0o060
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn dev_null_counts_as_a_device() {
        assert!(is_device("/dev/null"));
        assert!(!is_device("/"));
        assert!(!is_device("/nonexistent/event0"));
    }

    #[test]
    fn list_devices_filters_names_and_types() {
        let dir = tempfile::tempdir().unwrap();
        symlink("/dev/null", dir.path().join("event3")).unwrap();
        symlink("/dev/null", dir.path().join("mouse0")).unwrap();
        fs::write(dir.path().join("event4"), b"").unwrap();

        let devices = list_devices(dir.path()).unwrap();
        assert_eq!(devices, vec![dir.path().join("event3")]);
    }

    #[test]
    fn missing_directory_has_no_devices() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_devices(dir.path().join("input")).unwrap().is_empty());
    }

    #[test]
    fn absinfo_converts_both_ways() {
        let info = AbsInfo {
            value: 3,
            minimum: -10,
            maximum: 10,
            fuzz: 1,
            flat: 2,
            resolution: 4,
        };
        assert_eq!(AbsInfo::from(glue::input_absinfo::from(info)), info);
    }

    #[test]
    fn non_evdev_nodes_fail_to_open() {
        let err = InputDevice::open("/dev/null").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Os);
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }
}
