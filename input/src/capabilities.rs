//! Capability sets: which event types and codes a device handles.

use crate::codes::{self, Category, Registry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Absolute axis information, as in `struct input_absinfo`.
///
/// The input core does not clamp reported values to `[minimum, maximum]`;
/// that is left to userspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// Event types left out of a merged capability set unless asked otherwise.
/// Synch codes and force-feedback types are specific to each device.
pub const DEFAULT_EXCLUDED: [u16; 2] = [codes::EV_SYN, codes::EV_FF];

/// Order in which a virtual device gets its event types enabled.
pub const ENABLE_ORDER: [u16; 7] = [
    codes::EV_KEY,
    codes::EV_ABS,
    codes::EV_REL,
    codes::EV_MSC,
    codes::EV_SW,
    codes::EV_FF,
    codes::EV_SND,
];

/// Supported codes of a device, one collection per event category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CapabilitySet {
    pub keys: BTreeSet<u16>,
    pub synchs: BTreeSet<u16>,
    pub relative_axes: BTreeSet<u16>,
    pub absolute_axes: BTreeMap<u16, AbsInfo>,
    pub miscs: BTreeSet<u16>,
    pub switches: BTreeSet<u16>,
    pub leds: BTreeSet<u16>,
    pub sounds: BTreeSet<u16>,
    pub autorepeats: BTreeSet<u16>,
    pub force_feedbacks: BTreeSet<u16>,
    pub uinputs: BTreeSet<u16>,
}

fn contains_all(set: &BTreeSet<u16>, subset: &BTreeSet<u16>) -> bool {
    subset.is_subset(set)
}

/// True if bit `bit` of a kernel bitmap is set. Bits past the end are unset.
pub fn is_bit_set(bitmap: &[u8], bit: usize) -> bool {
    bitmap
        .get(bit / 8)
        .map(|byte| byte & (1 << (bit % 8)) != 0)
        .unwrap_or(false)
}

/// Every set bit of `bitmap` up to and including `max`.
pub fn set_bits(bitmap: &[u8], max: u16) -> impl Iterator<Item = u16> + '_ {
    (0..=max).filter(move |&bit| is_bit_set(bitmap, bit as usize))
}

impl CapabilitySet {
    /// A set handling every known key and button code: the profile of a
    /// virtual keyboard that accepts anything.
    pub fn all_keys() -> Self {
        Self::all_keys_from(codes::registry())
    }

    pub fn all_keys_from(registry: &Registry) -> Self {
        let mut keys = registry.codes(Category::Key);
        keys.extend(registry.codes(Category::Button));
        Self {
            keys,
            ..Self::default()
        }
    }

    /// Builds a set from the bitmaps the kernel reports.
    ///
    /// `type_bits` is the event type bitmap. `code_bits` is asked for the
    /// code bitmap of each supported type and `abs_info` for the range of
    /// each supported absolute axis; either may return `None` to skip that
    /// type or axis. Codes the registry does not know are dropped.
    pub fn from_bitmaps<C, A>(
        type_bits: &[u8],
        mut code_bits: C,
        mut abs_info: A,
        registry: &Registry,
    ) -> Self
    where
        C: FnMut(u16) -> Option<Vec<u8>>,
        A: FnMut(u16) -> Option<AbsInfo>,
    {
        let mut capabilities = Self::default();
        for type_ in set_bits(type_bits, codes::EV_MAX) {
            let bits = match code_bits(type_) {
                Some(bits) => bits,
                None => continue,
            };

            for code in set_bits(&bits, codes::KEY_MAX) {
                let known = |category| registry.contains(category, code);
                match type_ {
                    codes::EV_ABS if known(Category::AbsoluteAxis) => {
                        if let Some(info) = abs_info(code) {
                            capabilities.absolute_axes.insert(code, info);
                        }
                    }
                    codes::EV_KEY if known(Category::Key) || known(Category::Button) => {
                        capabilities.keys.insert(code);
                    }
                    codes::EV_FF | codes::EV_FF_STATUS if known(Category::ForceFeedback) => {
                        capabilities.force_feedbacks.insert(code);
                    }
                    _ => {
                        let (category, set) = match capabilities.simple_set_mut(type_) {
                            Some(entry) => entry,
                            None => continue,
                        };
                        if known(category) {
                            set.insert(code);
                        }
                    }
                }
            }
        }
        capabilities
    }

    // Categories whose collection is a plain code set keyed by one table.
    fn simple_set_mut(&mut self, type_: u16) -> Option<(Category, &mut BTreeSet<u16>)> {
        let entry = match type_ {
            codes::EV_SYN => (Category::Synch, &mut self.synchs),
            codes::EV_REL => (Category::RelativeAxis, &mut self.relative_axes),
            codes::EV_MSC => (Category::Misc, &mut self.miscs),
            codes::EV_SW => (Category::Switch, &mut self.switches),
            codes::EV_LED => (Category::Led, &mut self.leds),
            codes::EV_SND => (Category::Sound, &mut self.sounds),
            codes::EV_REP => (Category::Autorepeat, &mut self.autorepeats),
            _ => return None,
        };
        Some(entry)
    }

    /// True if every code of every category in `min` is also in `self`.
    pub fn has_capabilities(&self, min: &CapabilitySet) -> bool {
        contains_all(&self.keys, &min.keys)
            && contains_all(&self.synchs, &min.synchs)
            && contains_all(&self.relative_axes, &min.relative_axes)
            && min
                .absolute_axes
                .keys()
                .all(|code| self.absolute_axes.contains_key(code))
            && contains_all(&self.miscs, &min.miscs)
            && contains_all(&self.switches, &min.switches)
            && contains_all(&self.leds, &min.leds)
            && contains_all(&self.sounds, &min.sounds)
            && contains_all(&self.autorepeats, &min.autorepeats)
            && contains_all(&self.force_feedbacks, &min.force_feedbacks)
            && contains_all(&self.uinputs, &min.uinputs)
    }

    /// Adds the codes of `other` to `self`, skipping the categories whose
    /// event type is in `excluded`. Existing axis ranges are kept.
    pub fn merge(&mut self, other: &CapabilitySet, excluded: &BTreeSet<u16>) {
        let mut merge_set = |type_, into: &mut BTreeSet<u16>, from: &BTreeSet<u16>| {
            if !excluded.contains(&type_) {
                into.extend(from.iter().copied());
            }
        };
        merge_set(codes::EV_KEY, &mut self.keys, &other.keys);
        merge_set(codes::EV_SYN, &mut self.synchs, &other.synchs);
        merge_set(codes::EV_REL, &mut self.relative_axes, &other.relative_axes);
        merge_set(codes::EV_MSC, &mut self.miscs, &other.miscs);
        merge_set(codes::EV_SW, &mut self.switches, &other.switches);
        merge_set(codes::EV_LED, &mut self.leds, &other.leds);
        merge_set(codes::EV_SND, &mut self.sounds, &other.sounds);
        merge_set(codes::EV_REP, &mut self.autorepeats, &other.autorepeats);
        merge_set(codes::EV_FF, &mut self.force_feedbacks, &other.force_feedbacks);
        merge_set(codes::EV_UINPUT, &mut self.uinputs, &other.uinputs);

        if !excluded.contains(&codes::EV_ABS) {
            for (&code, &info) in &other.absolute_axes {
                self.absolute_axes.entry(code).or_insert(info);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The kernel enable requests for this set: for each non-empty category
    /// in [`ENABLE_ORDER`], its event type and codes.
    pub fn enable_plan(&self) -> Vec<(u16, Vec<u16>)> {
        ENABLE_ORDER
            .iter()
            .filter_map(|&type_| {
                let members: Vec<u16> = match type_ {
                    codes::EV_KEY => self.keys.iter().copied().collect(),
                    codes::EV_ABS => self.absolute_axes.keys().copied().collect(),
                    codes::EV_REL => self.relative_axes.iter().copied().collect(),
                    codes::EV_MSC => self.miscs.iter().copied().collect(),
                    codes::EV_SW => self.switches.iter().copied().collect(),
                    codes::EV_FF => self.force_feedbacks.iter().copied().collect(),
                    codes::EV_SND => self.sounds.iter().copied().collect(),
                    _ => Vec::new(),
                };
                Some((type_, members)).filter(|(_, members)| !members.is_empty())
            })
            .collect()
    }
}

/// Capabilities of one device together with its force-feedback slot count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub capabilities: CapabilitySet,
    pub max_effects: u32,
}

impl DeviceProfile {
    /// Merges the profiles of several source devices into the profile of a
    /// virtual device standing in for all of them.
    ///
    /// Capabilities are united per category, minus `excluded` event types.
    /// The effect count is the smallest of `limit` and every source's count,
    /// since the virtual device cannot hold more effects than its weakest
    /// source.
    pub fn merge<'a, I>(sources: I, excluded: &BTreeSet<u16>, limit: u32) -> Self
    where
        I: IntoIterator<Item = &'a DeviceProfile>,
    {
        sources.into_iter().fold(
            DeviceProfile {
                capabilities: CapabilitySet::default(),
                max_effects: limit,
            },
            |mut merged, source| {
                merged.capabilities.merge(&source.capabilities, excluded);
                merged.max_effects = merged.max_effects.min(source.max_effects);
                merged
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;
    use proptest::collection::{btree_map, btree_set};
    use proptest::prelude::*;

    fn set_bit(bitmap: &mut [u8], bit: u16) {
        bitmap[bit as usize / 8] |= 1 << (bit % 8);
    }

    fn bitmap(bits: &[u16]) -> Vec<u8> {
        let mut bitmap = vec![0u8; KEY_MAX as usize / 8 + 1];
        for &bit in bits {
            set_bit(&mut bitmap, bit);
        }
        bitmap
    }

    fn keyboard() -> CapabilitySet {
        CapabilitySet {
            keys: [KEY_A, KEY_B].into_iter().collect(),
            leds: [LED_CAPSL].into_iter().collect(),
            ..CapabilitySet::default()
        }
    }

    #[test]
    fn bits_are_read_little_endian_per_byte() {
        let bitmap = [0b0000_0010u8, 0b1000_0000];
        assert!(is_bit_set(&bitmap, 1));
        assert!(is_bit_set(&bitmap, 15));
        assert!(!is_bit_set(&bitmap, 0));
        assert!(!is_bit_set(&bitmap, 64));
        assert_eq!(set_bits(&bitmap, 15).collect::<Vec<_>>(), vec![1, 15]);
    }

    #[test]
    fn bitmaps_become_categories() {
        let types = bitmap(&[EV_SYN, EV_KEY, EV_ABS, EV_LED, EV_FF]);
        let capabilities = CapabilitySet::from_bitmaps(
            &types,
            |type_| match type_ {
                EV_SYN => Some(bitmap(&[SYN_REPORT])),
                EV_KEY => Some(bitmap(&[KEY_A, BTN_LEFT, 0x2fe])),
                EV_ABS => Some(bitmap(&[ABS_X, ABS_Y])),
                EV_FF => Some(bitmap(&[FF_RUMBLE, FF_PERIODIC])),
                _ => None,
            },
            |code| {
                Some(AbsInfo {
                    maximum: 255,
                    value: code as i32,
                    ..AbsInfo::default()
                })
                .filter(|_| code == ABS_X)
            },
            &Registry::builtin(),
        );

        assert_eq!(capabilities.synchs, [SYN_REPORT].into_iter().collect());
        // 0x2fe is not a known key and is dropped.
        assert_eq!(capabilities.keys, [KEY_A, BTN_LEFT].into_iter().collect());
        // The ABS_Y range query failed and the axis is left out.
        assert_eq!(capabilities.absolute_axes.len(), 1);
        assert_eq!(capabilities.absolute_axes[&ABS_X].maximum, 255);
        assert_eq!(
            capabilities.force_feedbacks,
            [FF_RUMBLE, FF_PERIODIC].into_iter().collect()
        );
        // The LED bitmap query failed.
        assert!(capabilities.leds.is_empty());
    }

    #[test]
    fn all_keys_covers_keys_and_buttons() {
        let all = CapabilitySet::all_keys_from(&Registry::builtin());
        assert!(all.keys.contains(&KEY_A));
        assert!(all.keys.contains(&BTN_TRIGGER_HAPPY40));
        assert!(all.relative_axes.is_empty());
        assert!(all.has_capabilities(&keyboard().clone_without_leds()));
    }

    impl CapabilitySet {
        fn clone_without_leds(&self) -> Self {
            Self {
                leds: BTreeSet::new(),
                ..self.clone()
            }
        }
    }

    #[test]
    fn has_capabilities_checks_every_category() {
        let keyboard = keyboard();
        let mut rumble = CapabilitySet::default();
        rumble.force_feedbacks.insert(FF_RUMBLE);
        assert!(!keyboard.has_capabilities(&rumble));
        assert!(keyboard.has_capabilities(&CapabilitySet::default()));

        let mut axis = CapabilitySet::default();
        axis.absolute_axes.insert(ABS_X, AbsInfo::default());
        assert!(!keyboard.has_capabilities(&axis));
    }

    #[test]
    fn merge_respects_exclusions() {
        let mut pad = CapabilitySet::default();
        pad.synchs.insert(SYN_REPORT);
        pad.keys.insert(BTN_SOUTH);
        pad.force_feedbacks.insert(FF_RUMBLE);
        pad.absolute_axes.insert(ABS_X, AbsInfo { maximum: 10, ..AbsInfo::default() });

        let excluded: BTreeSet<u16> = DEFAULT_EXCLUDED.into_iter().collect();
        let mut merged = keyboard();
        merged.merge(&pad, &excluded);

        assert_eq!(merged.keys, [KEY_A, KEY_B, BTN_SOUTH].into_iter().collect());
        assert!(merged.synchs.is_empty());
        assert!(merged.force_feedbacks.is_empty());
        assert_eq!(merged.absolute_axes[&ABS_X].maximum, 10);
    }

    #[test]
    fn merged_effect_count_is_the_minimum() {
        let profiles: Vec<DeviceProfile> = [4, 2, 8]
            .into_iter()
            .map(|max_effects| DeviceProfile {
                capabilities: keyboard(),
                max_effects,
            })
            .collect();
        let merged = DeviceProfile::merge(&profiles, &BTreeSet::new(), FF_MAX_EFFECTS);
        assert_eq!(merged.max_effects, 2);
        assert_eq!(merged.capabilities, keyboard());

        let merged = DeviceProfile::merge(&Vec::new(), &BTreeSet::new(), FF_MAX_EFFECTS);
        assert_eq!(merged.max_effects, FF_MAX_EFFECTS);
        assert!(merged.capabilities.is_empty());
    }

    #[test]
    fn leds_are_never_enabled() {
        let capabilities = CapabilitySet {
            leds: [LED_CAPSL, LED_NUML].into_iter().collect(),
            ..CapabilitySet::default()
        };
        assert!(!ENABLE_ORDER.contains(&EV_LED));
        assert!(capabilities.enable_plan().is_empty());
    }

    #[test]
    fn enable_plan_follows_kernel_order() {
        let mut capabilities = keyboard();
        capabilities.relative_axes.insert(REL_X);
        capabilities.absolute_axes.insert(ABS_Y, AbsInfo::default());
        capabilities.synchs.insert(SYN_REPORT);

        let plan = capabilities.enable_plan();
        assert_eq!(
            plan,
            vec![
                (EV_KEY, vec![KEY_A, KEY_B]),
                (EV_ABS, vec![ABS_Y]),
                (EV_REL, vec![REL_X]),
            ]
        );
        assert!(CapabilitySet::default().enable_plan().is_empty());
    }

    fn capability_set() -> impl Strategy<Value = CapabilitySet> {
        (
            btree_set(0u16..0x300, 0..16),
            btree_set(0u16..0x10, 0..4),
            btree_map(0u16..0x40, any::<i32>(), 0..4),
            btree_set(0x50u16..0x62, 0..4),
        )
            .prop_map(|(keys, relative_axes, axes, force_feedbacks)| CapabilitySet {
                keys,
                relative_axes,
                absolute_axes: axes
                    .into_iter()
                    .map(|(code, maximum)| (code, AbsInfo { maximum, ..AbsInfo::default() }))
                    .collect(),
                force_feedbacks,
                ..CapabilitySet::default()
            })
    }

    proptest! {
        #[test]
        fn containment_is_reflexive(set in capability_set()) {
            prop_assert!(set.has_capabilities(&set));
        }

        #[test]
        fn containment_is_monotonic(set in capability_set(), keep in any::<u64>()) {
            let mut subset = set.clone();
            let mut index = 0;
            subset.keys.retain(|_| {
                index += 1;
                keep & (1 << (index % 64)) != 0
            });
            subset.absolute_axes.clear();
            prop_assert!(set.has_capabilities(&subset));
        }

        #[test]
        fn merge_is_a_union(sets in proptest::collection::vec(capability_set(), 1..5)) {
            let mut merged = CapabilitySet::default();
            for set in &sets {
                merged.merge(set, &BTreeSet::new());
            }
            for set in &sets {
                prop_assert!(merged.has_capabilities(set));
            }
            let keys: BTreeSet<u16> = sets.iter().flat_map(|set| set.keys.iter().copied()).collect();
            prop_assert_eq!(&merged.keys, &keys);

            let excluded: BTreeSet<u16> = [EV_KEY].into_iter().collect();
            let mut without_keys = CapabilitySet::default();
            for set in &sets {
                without_keys.merge(set, &excluded);
            }
            prop_assert!(without_keys.keys.is_empty());
        }
    }
}
