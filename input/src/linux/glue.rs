//! Kernel structures and ioctl request codes from `linux/input.h` and
//! `linux/uinput.h`.

#![allow(non_camel_case_types)]

use crate::error::{Error, Result};
use libc::{c_char, c_int};
use nix::sys::ioctl::ioctl_num_type;
use nix::{request_code_none, request_code_read, request_code_readwrite, request_code_write};
use std::mem::{self, size_of};
use std::os::unix::io::RawFd;

pub use libc::{
    input_absinfo, input_event, input_id, uinput_abs_setup, uinput_ff_erase, uinput_setup,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_replay {
    pub length: u16,
    pub delay: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_trigger {
    pub button: u16,
    pub interval: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_envelope {
    pub attack_length: u16,
    pub attack_level: u16,
    pub fade_length: u16,
    pub fade_level: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_constant_effect {
    pub level: i16,
    pub envelope: ff_envelope,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_ramp_effect {
    pub start_level: i16,
    pub end_level: i16,
    pub envelope: ff_envelope,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_condition_effect {
    pub right_saturation: u16,
    pub left_saturation: u16,
    pub right_coeff: i16,
    pub left_coeff: i16,
    pub deadband: u16,
    pub center: i16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ff_periodic_effect {
    pub waveform: u16,
    pub period: u16,
    pub magnitude: i16,
    pub offset: i16,
    pub phase: u16,
    pub envelope: ff_envelope,
    pub custom_len: u32,
    pub custom_data: *mut i16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ff_rumble_effect {
    pub strong_magnitude: u16,
    pub weak_magnitude: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union ff_effect_union {
    pub constant: ff_constant_effect,
    pub ramp: ff_ramp_effect,
    pub periodic: ff_periodic_effect,
    pub condition: [ff_condition_effect; 2],
    pub rumble: ff_rumble_effect,
}

/// The kernel's force-feedback effect record. Which member of `u` is live
/// depends on `type_`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ff_effect {
    pub type_: u16,
    pub id: i16,
    pub direction: u16,
    pub trigger: ff_trigger,
    pub replay: ff_replay,
    pub u: ff_effect_union,
}

impl Default for ff_effect {
    fn default() -> Self {
        // All-zero is a valid value of every member, the null custom buffer
        // included.
        unsafe { mem::zeroed() }
    }
}

pub const UINPUT_MAX_NAME_SIZE: usize = 80;

/// `libc` declares `ff_effect` with an opaque payload, so the upload record
/// that embeds it is declared here against the typed union.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct uinput_ff_upload {
    pub request_id: u32,
    pub retval: i32,
    pub effect: ff_effect,
    pub old: ff_effect,
}

const EVDEV: u8 = b'E';
const UINPUT: u8 = b'U';

pub const EVIOCGVERSION: ioctl_num_type = request_code_read!(EVDEV, 0x01, size_of::<c_int>());
pub const EVIOCGID: ioctl_num_type = request_code_read!(EVDEV, 0x02, size_of::<input_id>());
pub const EVIOCGREP: ioctl_num_type = request_code_read!(EVDEV, 0x03, size_of::<[u32; 2]>());
pub const EVIOCSREP: ioctl_num_type = request_code_write!(EVDEV, 0x03, size_of::<[u32; 2]>());
pub const EVIOCSFF: ioctl_num_type = request_code_write!(EVDEV, 0x80, size_of::<ff_effect>());
pub const EVIOCRMFF: ioctl_num_type = request_code_write!(EVDEV, 0x81, size_of::<c_int>());
pub const EVIOCGEFFECTS: ioctl_num_type = request_code_read!(EVDEV, 0x84, size_of::<c_int>());
pub const EVIOCGRAB: ioctl_num_type = request_code_write!(EVDEV, 0x90, size_of::<c_int>());

pub fn eviocgname(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x06, len)
}

pub fn eviocgphys(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x07, len)
}

pub fn eviocguniq(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x08, len)
}

pub fn eviocgprop(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x09, len)
}

pub fn eviocgkey(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x18, len)
}

pub fn eviocgled(len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x19, len)
}

pub fn eviocgbit(type_: u16, len: usize) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x20 + type_ as u8, len)
}

pub fn eviocgabs(code: u16) -> ioctl_num_type {
    request_code_read!(EVDEV, 0x40 + code as u8, size_of::<input_absinfo>())
}

pub fn eviocsabs(code: u16) -> ioctl_num_type {
    request_code_write!(EVDEV, 0xc0 + code as u8, size_of::<input_absinfo>())
}

pub const UI_DEV_CREATE: ioctl_num_type = request_code_none!(UINPUT, 1);
pub const UI_DEV_DESTROY: ioctl_num_type = request_code_none!(UINPUT, 2);
pub const UI_DEV_SETUP: ioctl_num_type = request_code_write!(UINPUT, 3, size_of::<uinput_setup>());
pub const UI_ABS_SETUP: ioctl_num_type =
    request_code_write!(UINPUT, 4, size_of::<uinput_abs_setup>());

pub const UI_SET_EVBIT: ioctl_num_type = request_code_write!(UINPUT, 100, size_of::<c_int>());
pub const UI_SET_KEYBIT: ioctl_num_type = request_code_write!(UINPUT, 101, size_of::<c_int>());
pub const UI_SET_RELBIT: ioctl_num_type = request_code_write!(UINPUT, 102, size_of::<c_int>());
pub const UI_SET_ABSBIT: ioctl_num_type = request_code_write!(UINPUT, 103, size_of::<c_int>());
pub const UI_SET_MSCBIT: ioctl_num_type = request_code_write!(UINPUT, 104, size_of::<c_int>());
pub const UI_SET_LEDBIT: ioctl_num_type = request_code_write!(UINPUT, 105, size_of::<c_int>());
pub const UI_SET_SNDBIT: ioctl_num_type = request_code_write!(UINPUT, 106, size_of::<c_int>());
pub const UI_SET_FFBIT: ioctl_num_type = request_code_write!(UINPUT, 107, size_of::<c_int>());
pub const UI_SET_PHYS: ioctl_num_type =
    request_code_write!(UINPUT, 108, size_of::<*const c_char>());
pub const UI_SET_SWBIT: ioctl_num_type = request_code_write!(UINPUT, 109, size_of::<c_int>());
pub const UI_SET_PROPBIT: ioctl_num_type = request_code_write!(UINPUT, 110, size_of::<c_int>());

pub const UI_BEGIN_FF_UPLOAD: ioctl_num_type =
    request_code_readwrite!(UINPUT, 200, size_of::<uinput_ff_upload>());
pub const UI_END_FF_UPLOAD: ioctl_num_type =
    request_code_write!(UINPUT, 201, size_of::<uinput_ff_upload>());
pub const UI_BEGIN_FF_ERASE: ioctl_num_type =
    request_code_readwrite!(UINPUT, 202, size_of::<uinput_ff_erase>());
pub const UI_END_FF_ERASE: ioctl_num_type =
    request_code_write!(UINPUT, 203, size_of::<uinput_ff_erase>());

pub fn ui_get_sysname(len: usize) -> ioctl_num_type {
    request_code_read!(UINPUT, 44, len)
}

/// Issues an ioctl whose argument is a pointer. `arg` must be valid for
/// whatever the request reads or writes.
pub unsafe fn ioctl_ptr<T>(
    fd: RawFd,
    request: ioctl_num_type,
    arg: *mut T,
    context: &str,
) -> Result<c_int> {
    check(libc::ioctl(fd, request, arg), context)
}

/// Issues an ioctl whose argument is passed by value.
pub fn ioctl_int(fd: RawFd, request: ioctl_num_type, arg: c_int, context: &str) -> Result<c_int> {
    check(unsafe { libc::ioctl(fd, request, arg) }, context)
}

pub fn ioctl_none(fd: RawFd, request: ioctl_num_type, context: &str) -> Result<c_int> {
    check(unsafe { libc::ioctl(fd, request) }, context)
}

fn check(ret: c_int, context: &str) -> Result<c_int> {
    if ret < 0 {
        Err(Error::last_os_error(context))
    } else {
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes_match_kernel_headers() {
        assert_eq!(UI_DEV_CREATE as u32, 0x5501);
        assert_eq!(UI_DEV_DESTROY as u32, 0x5502);
        assert_eq!(UI_SET_EVBIT as u32, 0x4004_5564);
        assert_eq!(UI_SET_KEYBIT as u32, 0x4004_5565);
        assert_eq!(UI_ABS_SETUP as u32, 0x401c_5504);
        assert_eq!(UI_DEV_SETUP as u32, 0x405c_5503);
        assert_eq!(EVIOCGRAB as u32, 0x4004_4590);
        assert_eq!(eviocgbit(0, 4) as u32, 0x8004_4520);
    }

    #[test]
    fn struct_sizes_match_kernel_headers() {
        assert_eq!(size_of::<input_id>(), 8);
        assert_eq!(size_of::<input_absinfo>(), 24);
        assert_eq!(size_of::<uinput_abs_setup>(), 28);
        assert_eq!(size_of::<uinput_setup>(), 92);
        assert_eq!(size_of::<uinput_ff_erase>(), 12);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size_of::<ff_effect>(), 48);
    }
}
