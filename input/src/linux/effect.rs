//! Conversion between [`Effect`] and the kernel's `struct ff_effect`.

use crate::codes;
use crate::effect::{
    from_millis, to_millis, Condition, Constant, CustomSamples, Effect, EffectKind, Envelope,
    Periodic, Ramp, Replay, Rumble, Trigger,
};
use crate::linux::glue;

/// The fixed-layout record the kernel exchanges for an effect.
pub type RawEffect = glue::ff_effect;

fn envelope_to_raw(envelope: &Envelope) -> glue::ff_envelope {
    glue::ff_envelope {
        attack_length: to_millis(envelope.attack_length),
        attack_level: envelope.attack_level,
        fade_length: to_millis(envelope.fade_length),
        fade_level: envelope.fade_level,
    }
}

fn envelope_from_raw(raw: &glue::ff_envelope) -> Envelope {
    Envelope {
        attack_length: from_millis(raw.attack_length),
        attack_level: raw.attack_level,
        fade_length: from_millis(raw.fade_length),
        fade_level: raw.fade_level,
    }
}

fn condition_to_raw(condition: &Condition) -> glue::ff_condition_effect {
    glue::ff_condition_effect {
        right_saturation: condition.right_saturation,
        left_saturation: condition.left_saturation,
        right_coeff: condition.right_coeff,
        left_coeff: condition.left_coeff,
        deadband: condition.deadband,
        center: condition.center,
    }
}

fn condition_from_raw(raw: &glue::ff_condition_effect) -> Condition {
    Condition {
        right_saturation: raw.right_saturation,
        left_saturation: raw.left_saturation,
        right_coeff: raw.right_coeff,
        left_coeff: raw.left_coeff,
        deadband: raw.deadband,
        center: raw.center,
    }
}

fn periodic_to_raw(periodic: &Periodic) -> glue::ff_periodic_effect {
    glue::ff_periodic_effect {
        waveform: periodic.waveform,
        period: to_millis(periodic.period),
        magnitude: periodic.magnitude,
        offset: periodic.offset,
        phase: periodic.phase,
        envelope: envelope_to_raw(&periodic.envelope),
        custom_len: periodic.custom.len,
        custom_data: periodic.custom.data,
    }
}

fn periodic_from_raw(raw: &glue::ff_periodic_effect) -> Periodic {
    Periodic {
        waveform: raw.waveform,
        period: from_millis(raw.period),
        magnitude: raw.magnitude,
        offset: raw.offset,
        phase: raw.phase,
        envelope: envelope_from_raw(&raw.envelope),
        custom: CustomSamples {
            len: raw.custom_len,
            data: raw.custom_data,
        },
    }
}

impl Effect {
    /// Encodes the effect. Durations are stored as whole milliseconds.
    pub fn to_raw(&self) -> RawEffect {
        let mut raw = RawEffect {
            type_: self.effect_type(),
            id: self.id,
            direction: self.direction,
            trigger: glue::ff_trigger {
                button: self.trigger.button,
                interval: to_millis(self.trigger.interval),
            },
            replay: glue::ff_replay {
                length: to_millis(self.replay.length),
                delay: to_millis(self.replay.delay),
            },
            ..RawEffect::default()
        };

        match &self.kind {
            EffectKind::Base => {}
            EffectKind::Constant(constant) | EffectKind::Inertia(constant) => {
                raw.u.constant = glue::ff_constant_effect {
                    level: constant.level,
                    envelope: envelope_to_raw(&constant.envelope),
                };
            }
            EffectKind::Ramp(ramp) => {
                raw.u.ramp = glue::ff_ramp_effect {
                    start_level: ramp.start_level,
                    end_level: ramp.end_level,
                    envelope: envelope_to_raw(&ramp.envelope),
                };
            }
            EffectKind::Spring(conditions)
            | EffectKind::Damper(conditions)
            | EffectKind::Friction(conditions) => {
                raw.u.condition = [
                    condition_to_raw(&conditions[0]),
                    condition_to_raw(&conditions[1]),
                ];
            }
            EffectKind::Periodic(periodic) | EffectKind::Custom(periodic) => {
                raw.u.periodic = periodic_to_raw(periodic);
            }
            EffectKind::Rumble(rumble) => {
                raw.u.rumble = glue::ff_rumble_effect {
                    strong_magnitude: rumble.strong_magnitude,
                    weak_magnitude: rumble.weak_magnitude,
                };
            }
        }

        raw
    }

    /// Decodes a kernel record. Types this crate does not know decode to
    /// [`EffectKind::Base`] with only the header filled in.
    pub fn from_raw(raw: &RawEffect) -> Self {
        // Every payload is plain old data, so reading the member the type
        // tag selects is sound even if the sender wrote another one.
        let kind = unsafe {
            match raw.type_ {
                codes::FF_CONSTANT => EffectKind::Constant(constant_from_raw(&raw.u.constant)),
                codes::FF_INERTIA => EffectKind::Inertia(constant_from_raw(&raw.u.constant)),
                codes::FF_RAMP => EffectKind::Ramp(Ramp {
                    start_level: raw.u.ramp.start_level,
                    end_level: raw.u.ramp.end_level,
                    envelope: envelope_from_raw(&raw.u.ramp.envelope),
                }),
                codes::FF_SPRING => EffectKind::Spring(conditions_from_raw(&raw.u.condition)),
                codes::FF_DAMPER => EffectKind::Damper(conditions_from_raw(&raw.u.condition)),
                codes::FF_FRICTION => EffectKind::Friction(conditions_from_raw(&raw.u.condition)),
                codes::FF_PERIODIC => EffectKind::Periodic(periodic_from_raw(&raw.u.periodic)),
                codes::FF_CUSTOM => EffectKind::Custom(periodic_from_raw(&raw.u.periodic)),
                codes::FF_RUMBLE => EffectKind::Rumble(Rumble {
                    strong_magnitude: raw.u.rumble.strong_magnitude,
                    weak_magnitude: raw.u.rumble.weak_magnitude,
                }),
                _ => EffectKind::Base,
            }
        };

        Effect {
            id: raw.id,
            direction: raw.direction,
            trigger: Trigger {
                button: raw.trigger.button,
                interval: from_millis(raw.trigger.interval),
            },
            replay: Replay {
                length: from_millis(raw.replay.length),
                delay: from_millis(raw.replay.delay),
            },
            kind,
        }
    }
}

fn constant_from_raw(raw: &glue::ff_constant_effect) -> Constant {
    Constant {
        level: raw.level,
        envelope: envelope_from_raw(&raw.envelope),
    }
}

fn conditions_from_raw(raw: &[glue::ff_condition_effect; 2]) -> [Condition; 2] {
    [condition_from_raw(&raw[0]), condition_from_raw(&raw[1])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn whole_millis(duration: Duration) -> Duration {
        Duration::from_millis(duration.as_millis() as u64)
    }

    fn duration() -> impl Strategy<Value = Duration> {
        (0u64..65_536_000).prop_map(Duration::from_micros)
    }

    fn envelope() -> impl Strategy<Value = Envelope> {
        (duration(), 0u16..0x8000, duration(), 0u16..0x8000).prop_map(
            |(attack_length, attack_level, fade_length, fade_level)| Envelope {
                attack_length,
                attack_level,
                fade_length,
                fade_level,
            },
        )
    }

    fn condition() -> impl Strategy<Value = Condition> {
        (any::<[u16; 3]>(), any::<[i16; 3]>()).prop_map(|(unsigned, signed)| Condition {
            right_saturation: unsigned[0],
            left_saturation: unsigned[1],
            deadband: unsigned[2],
            right_coeff: signed[0],
            left_coeff: signed[1],
            center: signed[2],
        })
    }

    fn periodic() -> impl Strategy<Value = Periodic> {
        (
            codes::FF_SQUARE..=codes::FF_CUSTOM,
            duration(),
            any::<(i16, i16, u16)>(),
            envelope(),
        )
            .prop_map(|(waveform, period, (magnitude, offset, phase), envelope)| Periodic {
                waveform,
                period,
                magnitude,
                offset,
                phase,
                envelope,
                custom: CustomSamples::none(),
            })
    }

    fn kind() -> impl Strategy<Value = EffectKind> {
        prop_oneof![
            Just(EffectKind::Base),
            (any::<i16>(), envelope())
                .prop_map(|(level, envelope)| EffectKind::Constant(Constant { level, envelope })),
            (any::<i16>(), envelope())
                .prop_map(|(level, envelope)| EffectKind::Inertia(Constant { level, envelope })),
            (any::<(i16, i16)>(), envelope()).prop_map(|((start_level, end_level), envelope)| {
                EffectKind::Ramp(Ramp {
                    start_level,
                    end_level,
                    envelope,
                })
            }),
            [condition(), condition()].prop_map(EffectKind::Spring),
            [condition(), condition()].prop_map(EffectKind::Damper),
            [condition(), condition()].prop_map(EffectKind::Friction),
            periodic().prop_map(EffectKind::Periodic),
            periodic().prop_map(EffectKind::Custom),
            any::<(u16, u16)>().prop_map(|(strong_magnitude, weak_magnitude)| {
                EffectKind::Rumble(Rumble {
                    strong_magnitude,
                    weak_magnitude,
                })
            }),
        ]
    }

    fn effect() -> impl Strategy<Value = Effect> {
        (
            any::<(i16, u16, u16)>(),
            duration(),
            duration(),
            duration(),
            kind(),
        )
            .prop_map(|((id, direction, button), interval, length, delay, kind)| Effect {
                id,
                direction,
                trigger: Trigger { button, interval },
                replay: Replay { length, delay },
                kind,
            })
    }

    // Truncates every duration of `effect` the way the kernel record does.
    fn truncated(mut effect: Effect) -> Effect {
        fn envelope(envelope: &mut Envelope) {
            envelope.attack_length = whole_millis(envelope.attack_length);
            envelope.fade_length = whole_millis(envelope.fade_length);
        }

        effect.trigger.interval = whole_millis(effect.trigger.interval);
        effect.replay.length = whole_millis(effect.replay.length);
        effect.replay.delay = whole_millis(effect.replay.delay);
        match &mut effect.kind {
            EffectKind::Constant(constant) | EffectKind::Inertia(constant) => {
                envelope(&mut constant.envelope)
            }
            EffectKind::Ramp(ramp) => envelope(&mut ramp.envelope),
            EffectKind::Periodic(periodic) | EffectKind::Custom(periodic) => {
                periodic.period = whole_millis(periodic.period);
                envelope(&mut periodic.envelope);
            }
            _ => {}
        }
        effect
    }

    proptest! {
        #[test]
        fn round_trip_keeps_all_but_sub_millisecond_parts(effect in effect()) {
            let raw = effect.to_raw();
            prop_assert_eq!(raw.type_, effect.effect_type());
            prop_assert_eq!(Effect::from_raw(&raw), truncated(effect));
        }
    }

    #[test]
    fn durations_truncate_toward_zero() {
        let mut effect = Effect::new(EffectKind::Rumble(Rumble::default()));
        effect.replay.length = Duration::from_micros(600_999);
        let raw = effect.to_raw();
        assert_eq!(raw.replay.length, 600);
    }

    #[test]
    fn unknown_types_decode_to_base() {
        let mut raw = Effect::new(EffectKind::Rumble(Rumble {
            strong_magnitude: 1,
            weak_magnitude: 2,
        }))
        .to_raw();
        raw.type_ = codes::FF_GAIN;
        raw.id = 7;

        let effect = Effect::from_raw(&raw);
        assert_eq!(effect.kind, EffectKind::Base);
        assert_eq!(effect.id, 7);
    }

    #[test]
    fn custom_samples_pass_through_untouched() {
        let mut samples = [0i16, 0x7fff, -0x7fff];
        let periodic = Periodic {
            waveform: codes::FF_CUSTOM,
            custom: CustomSamples::from_slice(&mut samples),
            ..Periodic::default()
        };
        let raw = Effect::new(EffectKind::Custom(periodic)).to_raw();
        unsafe {
            assert_eq!(raw.u.periodic.custom_len, 3);
            assert_eq!(raw.u.periodic.custom_data, samples.as_mut_ptr());
        }
        match Effect::from_raw(&raw).kind {
            EffectKind::Custom(decoded) => assert_eq!(decoded.custom.len, 3),
            kind => panic!("decoded to {:?}", kind),
        }
    }
}
