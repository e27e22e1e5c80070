//! Force-feedback effects.
//!
//! An [`Effect`] is the common header every effect carries plus an
//! [`EffectKind`] holding the payload of one concrete effect type. Effect
//! types that share a kernel payload layout share a payload struct here too:
//! inertia reuses [`Constant`], spring/damper/friction reuse a pair of
//! [`Condition`]s and custom reuses [`Periodic`].

use crate::codes;
use std::ptr;
use std::time::Duration;

/// When an effect starts playing on its own.
///
/// `button` is the key code whose press triggers the effect, `interval` the
/// minimum time between two triggered playbacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub button: u16,
    pub interval: Duration,
}

/// How long an effect plays and how long after being started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Replay {
    pub length: Duration,
    pub delay: Duration,
}

/// Attack and fade of an effect. Levels range over `0..=0x7fff` and are
/// absolute; the kernel applies the sign of the effect's own level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Envelope {
    pub attack_length: Duration,
    pub attack_level: u16,
    pub fade_length: Duration,
    pub fade_level: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Constant {
    /// May be negative.
    pub level: i16,
    pub envelope: Envelope,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ramp {
    pub start_level: i16,
    pub end_level: i16,
    pub envelope: Envelope,
}

/// Condition parameters of one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Condition {
    pub right_saturation: u16,
    pub left_saturation: u16,
    pub right_coeff: i16,
    pub left_coeff: i16,
    pub deadband: u16,
    pub center: i16,
}

/// Sample buffer of a custom waveform.
///
/// The buffer belongs to the caller, who keeps it alive for as long as any
/// effect referring to it is handed to the kernel. Encoding and decoding
/// only copy the pointer and the length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CustomSamples {
    pub len: u32,
    pub data: *mut i16,
}

impl CustomSamples {
    pub const fn none() -> Self {
        Self {
            len: 0,
            data: ptr::null_mut(),
        }
    }

    /// Refers to `samples`. The slice must outlive every use of the result.
    pub fn from_slice(samples: &mut [i16]) -> Self {
        Self {
            len: samples.len() as u32,
            data: samples.as_mut_ptr(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.data.is_null()
    }
}

impl Default for CustomSamples {
    fn default() -> Self {
        Self::none()
    }
}

// The pointer is only carried around, never dereferenced here.
unsafe impl Send for CustomSamples {}
unsafe impl Sync for CustomSamples {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Periodic {
    /// One of `FF_SQUARE`, `FF_TRIANGLE`, `FF_SINE`, `FF_SAW_UP`,
    /// `FF_SAW_DOWN` or `FF_CUSTOM`.
    pub waveform: u16,
    pub period: Duration,
    pub magnitude: i16,
    pub offset: i16,
    pub phase: u16,
    pub envelope: Envelope,
    pub custom: CustomSamples,
}

impl Default for Periodic {
    fn default() -> Self {
        Self {
            waveform: codes::FF_SINE,
            period: Duration::ZERO,
            magnitude: 0,
            offset: 0,
            phase: 0,
            envelope: Envelope::default(),
            custom: CustomSamples::none(),
        }
    }
}

/// Magnitudes of the two motors of a rumble pad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rumble {
    pub strong_magnitude: u16,
    pub weak_magnitude: u16,
}

/// Payload of an effect, one variant per effect type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// No payload. Effects of a type this crate does not know decode to it.
    Base,
    Constant(Constant),
    Inertia(Constant),
    Ramp(Ramp),
    Spring([Condition; 2]),
    Damper([Condition; 2]),
    Friction([Condition; 2]),
    Periodic(Periodic),
    Custom(Periodic),
    Rumble(Rumble),
}

impl EffectKind {
    /// The `FF_*` type tag. [`EffectKind::Base`] reports `FF_MAX`.
    pub fn effect_type(&self) -> u16 {
        match self {
            EffectKind::Base => codes::FF_MAX,
            EffectKind::Constant(_) => codes::FF_CONSTANT,
            EffectKind::Inertia(_) => codes::FF_INERTIA,
            EffectKind::Ramp(_) => codes::FF_RAMP,
            EffectKind::Spring(_) => codes::FF_SPRING,
            EffectKind::Damper(_) => codes::FF_DAMPER,
            EffectKind::Friction(_) => codes::FF_FRICTION,
            EffectKind::Periodic(_) => codes::FF_PERIODIC,
            EffectKind::Custom(_) => codes::FF_CUSTOM,
            EffectKind::Rumble(_) => codes::FF_RUMBLE,
        }
    }
}

impl Default for EffectKind {
    fn default() -> Self {
        EffectKind::Base
    }
}

/// A force-feedback effect as uploaded to a device.
///
/// Set `id` to `-1` to have the driver assign a slot on upload. `direction`
/// encodes the angle clockwise from "down": `0x0000` is down, `0x4000` left,
/// `0x8000` up and `0xc000` right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Effect {
    pub id: i16,
    pub direction: u16,
    pub trigger: Trigger,
    pub replay: Replay,
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: -1,
            direction: 0,
            trigger: Trigger::default(),
            replay: Replay::default(),
            kind,
        }
    }

    pub fn effect_type(&self) -> u16 {
        self.kind.effect_type()
    }
}

impl Default for Effect {
    fn default() -> Self {
        Self {
            id: 0,
            ..Self::new(EffectKind::Base)
        }
    }
}

/// Narrows a duration to the 16-bit millisecond count the kernel stores.
/// Sub-millisecond parts are dropped and the count wraps like an integer
/// cast.
pub(crate) fn to_millis(duration: Duration) -> u16 {
    duration.as_millis() as u16
}

pub(crate) fn from_millis(millis: u16) -> Duration {
    Duration::from_millis(millis.into())
}
