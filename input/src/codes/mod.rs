//! Event codes and the registry that names them.
//!
//! Every code category of `linux/input-event-codes.h` is exported as plain
//! `u16` constants (`KEY_A`, `BTN_LEFT`, `ABS_X`, `FF_RUMBLE`, ...). The
//! [`Registry`] maps codes back to names and answers the membership questions
//! the categorization and capability code relies on. It is built once and
//! never mutated, so it is shared process-wide through [`registry`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

macro_rules! codes {
    ($table:ident { $($name:ident = $value:expr,)* }) => {
        $(pub const $name: u16 = $value;)*

        pub(crate) static $table: &[(&str, u16)] = &[$((stringify!($name), $name),)*];
    };
}

mod tables;

pub use tables::*;

/// Highest event type the kernel defines.
pub const EV_MAX: u16 = 0x1f;
/// Highest key or button code the kernel defines.
pub const KEY_MAX: u16 = 0x2ff;
pub const REL_MAX: u16 = 0x0f;
pub const ABS_MAX: u16 = 0x3f;
pub const SW_MAX: u16 = 0x10;
pub const MSC_MAX: u16 = 0x07;
pub const LED_MAX: u16 = 0x0f;
pub const SND_MAX: u16 = 0x07;
pub const FF_MAX: u16 = 0x7f;
pub const INPUT_PROP_MAX: u16 = 0x1f;

/// Number of effects a virtual device advertises unless told otherwise.
pub const FF_MAX_EFFECTS: u32 = FF_GAIN as u32;

/// A family of codes sharing one meaning.
///
/// Categories are disjoint, with one wrinkle: [`Category::Key`] and
/// [`Category::Button`] travel under the same wire event type (`EV_KEY`) and
/// are told apart by table membership only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    EventType,
    Synch,
    Key,
    Button,
    RelativeAxis,
    AbsoluteAxis,
    Misc,
    Switch,
    Led,
    Sound,
    Autorepeat,
    ForceFeedback,
    UiForceFeedback,
    Property,
    Bus,
}

impl Category {
    pub const ALL: [Category; 15] = [
        Category::EventType,
        Category::Synch,
        Category::Key,
        Category::Button,
        Category::RelativeAxis,
        Category::AbsoluteAxis,
        Category::Misc,
        Category::Switch,
        Category::Led,
        Category::Sound,
        Category::Autorepeat,
        Category::ForceFeedback,
        Category::UiForceFeedback,
        Category::Property,
        Category::Bus,
    ];

    /// Human readable name of the category, as used when printing events.
    pub fn class_name(self) -> &'static str {
        match self {
            Category::EventType => "EventType",
            Category::Synch => "Synch",
            Category::Key => "Key",
            Category::Button => "Button",
            Category::RelativeAxis => "RelativeAxis",
            Category::AbsoluteAxis => "AbsoluteAxis",
            Category::Misc => "Misc",
            Category::Switch => "Switch",
            Category::Led => "LED",
            Category::Sound => "Sound",
            Category::Autorepeat => "Autorepeat",
            Category::ForceFeedback => "ForceFeedback",
            Category::UiForceFeedback => "UIForceFeedback",
            Category::Property => "Property",
            Category::Bus => "BusType",
        }
    }

    fn table(self) -> &'static [(&'static str, u16)] {
        match self {
            Category::EventType => EVENT_TYPES,
            Category::Synch => SYNCHS,
            Category::Key => KEYS,
            Category::Button => BUTTONS,
            Category::RelativeAxis => RELATIVE_AXES,
            Category::AbsoluteAxis => ABSOLUTE_AXES,
            Category::Misc => MISCS,
            Category::Switch => SWITCHES,
            Category::Led => LEDS,
            Category::Sound => SOUNDS,
            Category::Autorepeat => AUTOREPEATS,
            Category::ForceFeedback => FORCE_FEEDBACKS,
            Category::UiForceFeedback => UI_FORCE_FEEDBACKS,
            Category::Property => PROPERTIES,
            Category::Bus => BUSES,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Read-only code-to-name tables, one per [`Category`].
#[derive(Clone, Debug, Default)]
pub struct Registry {
    names: HashMap<Category, HashMap<u16, &'static str>>,
}

impl Registry {
    /// A registry that knows no codes at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The tables of `linux/input-event-codes.h` this crate was built with.
    pub fn builtin() -> Self {
        Category::ALL
            .iter()
            .fold(Self::empty(), |registry, &category| {
                registry.with_table(
                    category,
                    category.table().iter().map(|&(name, code)| (code, name)),
                )
            })
    }

    /// Adds `entries` to the table of `category`. Codes already present keep
    /// their first name.
    pub fn with_table<I>(mut self, category: Category, entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, &'static str)>,
    {
        let table = self.names.entry(category).or_default();
        for (code, name) in entries {
            table.entry(code).or_insert(name);
        }
        self
    }

    pub fn contains(&self, category: Category, code: u16) -> bool {
        self.names
            .get(&category)
            .map(|table| table.contains_key(&code))
            .unwrap_or(false)
    }

    pub fn name(&self, category: Category, code: u16) -> Option<&'static str> {
        self.names.get(&category)?.get(&code).copied()
    }

    /// Reverse lookup by symbolic name. Aliases the registry dropped are not
    /// found.
    pub fn code(&self, category: Category, name: &str) -> Option<u16> {
        self.names
            .get(&category)?
            .iter()
            .find(|(_, &known)| known == name)
            .map(|(&code, _)| code)
    }

    /// Every known code of `category`, in ascending order.
    pub fn codes(&self, category: Category) -> BTreeSet<u16> {
        self.names
            .get(&category)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default()
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry. Falls back to [`Registry::builtin`] when
/// [`install`] was never called.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::builtin)
}

/// Installs `registry` as the process-wide registry.
///
/// Must run before anything calls [`registry`]; once the registry has been
/// initialized the argument is handed back.
pub fn install(registry: Registry) -> Result<(), Registry> {
    REGISTRY.set(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_buttons_are_disjoint() {
        let registry = Registry::builtin();
        let keys = registry.codes(Category::Key);
        let buttons = registry.codes(Category::Button);
        assert!(keys.is_disjoint(&buttons));
        assert!(keys.contains(&KEY_A));
        assert!(buttons.contains(&BTN_LEFT));
    }

    #[test]
    fn first_name_wins_for_aliases() {
        let registry = Registry::builtin();
        assert_eq!(registry.name(Category::Key, KEY_A), Some("KEY_A"));
        assert_eq!(registry.name(Category::Button, BTN_MISC), Some("BTN_MISC"));
        assert_eq!(registry.name(Category::Button, BTN_0), Some("BTN_MISC"));
        assert_eq!(registry.code(Category::EventType, "EV_FF"), Some(EV_FF));
        assert_eq!(registry.code(Category::Button, "BTN_0"), None);
    }

    #[test]
    fn unknown_codes_have_no_name() {
        let registry = Registry::builtin();
        assert_eq!(registry.name(Category::RelativeAxis, 0x0e), None);
        assert!(!registry.contains(Category::Key, BTN_LEFT));
        assert!(!Registry::empty().contains(Category::Key, KEY_A));
    }

    #[test]
    fn custom_tables_extend_the_registry() {
        let registry = Registry::empty().with_table(Category::Led, [(LED_CAPSL, "CAPS")]);
        assert_eq!(registry.name(Category::Led, LED_CAPSL), Some("CAPS"));
        assert!(!registry.contains(Category::Led, LED_NUML));
    }

    #[test]
    fn force_feedback_constants_match_kernel() {
        assert_eq!(FF_RUMBLE, 0x50);
        assert_eq!(FF_CUSTOM, 0x5d);
        assert_eq!(FF_MAX_EFFECTS, 96);
        assert_eq!(EV_UINPUT, 0x0101);
        assert_eq!(UI_FF_UPLOAD, 1);
    }
}
