//! Input events, raw and categorized.
//!
//! [`InputEvent`] mirrors the kernel's `input_event` record. Turning it into a
//! [`CategorizedEvent`] resolves the code against the [`Registry`], which is
//! only needed for nicer printing or when a consumer wants to match on the
//! code family instead of the raw numbers.

use crate::codes::{self, Category, Registry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A generic input event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEvent {
    pub timestamp: SystemTime,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(type_: u16, code: u16, value: i32) -> Self {
        Self {
            timestamp: UNIX_EPOCH,
            type_,
            code,
            value,
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Resolves the event against the process-wide registry.
    pub fn categorize(self) -> CategorizedEvent {
        CategorizedEvent::categorize(self, codes::registry())
    }
}

impl Default for InputEvent {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Up,   // The key is released.
    Down, // The key is pressed.
    Hold, // The key is auto-repeating.
}

impl KeyState {
    pub fn from_value(value: i32) -> Self {
        match value {
            1 => KeyState::Down,
            2 => KeyState::Hold,
            _ => KeyState::Up,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Key(u16),
    Button(u16),
}

/// An event generated by a keyboard, button or other key-like device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    pub event: InputEvent,
    pub state: KeyState,
    pub key: Option<u16>,
    pub button: Option<u16>,
}

impl KeyEvent {
    pub fn new(event: InputEvent, registry: &Registry) -> Self {
        let resolve = |category| Some(event.code).filter(|&code| registry.contains(category, code));
        Self {
            event,
            state: KeyState::from_value(event.value),
            key: resolve(Category::Key),
            button: resolve(Category::Button),
        }
    }

    pub fn is_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn is_button(&self) -> bool {
        self.button.is_some()
    }

    pub fn is_in_category(&self) -> bool {
        self.is_key() || self.is_button()
    }

    pub fn kind(&self) -> Option<KeyKind> {
        self.key
            .map(KeyKind::Key)
            .or_else(|| self.button.map(KeyKind::Button))
    }
}

/// An event whose code was resolved against one category table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodedEvent {
    pub event: InputEvent,
    pub code: Option<u16>,
}

impl CodedEvent {
    pub fn new(event: InputEvent, category: Category, registry: &Registry) -> Self {
        Self {
            event,
            code: Some(event.code).filter(|&code| registry.contains(category, code)),
        }
    }

    pub fn is_in_category(&self) -> bool {
        self.code.is_some()
    }
}

/// An input event tagged with the code family it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategorizedEvent {
    Generic(InputEvent),
    Key(KeyEvent),
    Relative(CodedEvent),
    Absolute(CodedEvent),
    Synch(CodedEvent),
    Switch(CodedEvent),
    Misc(CodedEvent),
    Led(CodedEvent),
    Autorepeat(CodedEvent),
    Sound(CodedEvent),
    ForceFeedbackStatus(CodedEvent),
    UiForceFeedback(CodedEvent),
}

// Evaluation order of both categorization passes. First match wins.
#[derive(Clone, Copy, Debug)]
enum Variant {
    Key,
    Relative,
    Absolute,
    Synch,
    Misc,
    Switch,
    Led,
    Sound,
    Autorepeat,
    ForceFeedbackStatus,
    UiForceFeedback,
}

const ORDER: [Variant; 11] = [
    Variant::Key,
    Variant::Relative,
    Variant::Absolute,
    Variant::Synch,
    Variant::Misc,
    Variant::Switch,
    Variant::Led,
    Variant::Sound,
    Variant::Autorepeat,
    Variant::ForceFeedbackStatus,
    Variant::UiForceFeedback,
];

impl Variant {
    fn expected_type(self) -> u16 {
        match self {
            Variant::Key => codes::EV_KEY,
            Variant::Relative => codes::EV_REL,
            Variant::Absolute => codes::EV_ABS,
            Variant::Synch => codes::EV_SYN,
            Variant::Misc => codes::EV_MSC,
            Variant::Switch => codes::EV_SW,
            Variant::Led => codes::EV_LED,
            Variant::Sound => codes::EV_SND,
            Variant::Autorepeat => codes::EV_REP,
            Variant::ForceFeedbackStatus => codes::EV_FF_STATUS,
            Variant::UiForceFeedback => codes::EV_UINPUT,
        }
    }

    /// Builds this variant around `event`, or `None` if the code is not in
    /// the variant's table.
    fn build(self, event: InputEvent, registry: &Registry) -> Option<CategorizedEvent> {
        let coded = |category| {
            let coded = CodedEvent::new(event, category, registry);
            Some(coded).filter(CodedEvent::is_in_category)
        };
        let categorized = match self {
            Variant::Key => {
                let key = KeyEvent::new(event, registry);
                return Some(CategorizedEvent::Key(key)).filter(|_| key.is_in_category());
            }
            Variant::Relative => CategorizedEvent::Relative(coded(Category::RelativeAxis)?),
            Variant::Absolute => CategorizedEvent::Absolute(coded(Category::AbsoluteAxis)?),
            Variant::Synch => CategorizedEvent::Synch(coded(Category::Synch)?),
            Variant::Misc => CategorizedEvent::Misc(coded(Category::Misc)?),
            Variant::Switch => CategorizedEvent::Switch(coded(Category::Switch)?),
            Variant::Led => CategorizedEvent::Led(coded(Category::Led)?),
            Variant::Sound => CategorizedEvent::Sound(coded(Category::Sound)?),
            Variant::Autorepeat => CategorizedEvent::Autorepeat(coded(Category::Autorepeat)?),
            Variant::ForceFeedbackStatus => {
                CategorizedEvent::ForceFeedbackStatus(coded(Category::ForceFeedback)?)
            }
            Variant::UiForceFeedback => {
                CategorizedEvent::UiForceFeedback(coded(Category::UiForceFeedback)?)
            }
        };
        Some(categorized)
    }
}

impl CategorizedEvent {
    /// Categorizes `event`. Never fails: an event no table recognizes comes
    /// back as [`CategorizedEvent::Generic`].
    ///
    /// The declared event type is trusted first. Only if no category of that
    /// type claims the code are all tables tried regardless of type.
    pub fn categorize(event: InputEvent, registry: &Registry) -> Self {
        ORDER
            .iter()
            .filter(|variant| variant.expected_type() == event.type_)
            .find_map(|variant| variant.build(event, registry))
            .or_else(|| {
                ORDER
                    .iter()
                    .find_map(|variant| variant.build(event, registry))
            })
            .unwrap_or(CategorizedEvent::Generic(event))
    }

    /// Categorizes again in place, e.g. after swapping the registry.
    pub fn recategorize(&mut self, registry: &Registry) {
        *self = Self::categorize(*self.base(), registry);
    }

    /// The raw event every variant carries.
    pub fn base(&self) -> &InputEvent {
        match self {
            CategorizedEvent::Generic(event) => event,
            CategorizedEvent::Key(key) => &key.event,
            CategorizedEvent::Relative(coded)
            | CategorizedEvent::Absolute(coded)
            | CategorizedEvent::Synch(coded)
            | CategorizedEvent::Switch(coded)
            | CategorizedEvent::Misc(coded)
            | CategorizedEvent::Led(coded)
            | CategorizedEvent::Autorepeat(coded)
            | CategorizedEvent::Sound(coded)
            | CategorizedEvent::ForceFeedbackStatus(coded)
            | CategorizedEvent::UiForceFeedback(coded) => &coded.event,
        }
    }

    pub fn into_generic(self) -> InputEvent {
        *self.base()
    }

    pub fn is_in_category(&self) -> bool {
        match self {
            CategorizedEvent::Generic(_) => false,
            CategorizedEvent::Key(key) => key.is_in_category(),
            CategorizedEvent::Relative(coded)
            | CategorizedEvent::Absolute(coded)
            | CategorizedEvent::Synch(coded)
            | CategorizedEvent::Switch(coded)
            | CategorizedEvent::Misc(coded)
            | CategorizedEvent::Led(coded)
            | CategorizedEvent::Autorepeat(coded)
            | CategorizedEvent::Sound(coded)
            | CategorizedEvent::ForceFeedbackStatus(coded)
            | CategorizedEvent::UiForceFeedback(coded) => coded.is_in_category(),
        }
    }

    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            CategorizedEvent::Key(key) => Some(key),
            _ => None,
        }
    }

    /// The table the resolved code belongs to, `None` for generic events.
    pub fn category(&self) -> Option<Category> {
        let category = match self {
            CategorizedEvent::Generic(_) => return None,
            CategorizedEvent::Key(key) => {
                if key.is_button() {
                    Category::Button
                } else {
                    Category::Key
                }
            }
            CategorizedEvent::Relative(_) => Category::RelativeAxis,
            CategorizedEvent::Absolute(_) => Category::AbsoluteAxis,
            CategorizedEvent::Synch(_) => Category::Synch,
            CategorizedEvent::Switch(_) => Category::Switch,
            CategorizedEvent::Misc(_) => Category::Misc,
            CategorizedEvent::Led(_) => Category::Led,
            CategorizedEvent::Autorepeat(_) => Category::Autorepeat,
            CategorizedEvent::Sound(_) => Category::Sound,
            CategorizedEvent::ForceFeedbackStatus(_) => Category::ForceFeedback,
            CategorizedEvent::UiForceFeedback(_) => Category::UiForceFeedback,
        };
        Some(category)
    }
}

fn write_timestamp(f: &mut fmt::Formatter<'_>, timestamp: SystemTime) -> fmt::Result {
    let since_epoch = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    write!(f, "{}.{:06}", since_epoch.as_secs(), since_epoch.subsec_micros())
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = codes::registry();
        let type_name = registry
            .name(Category::EventType, self.type_)
            .unwrap_or("UNKNOWN");
        write!(f, "{:<14} event at ", type_name)?;
        write_timestamp(f, self.timestamp)?;
        write!(
            f,
            ", {:<20} (0x{:04X}), value: {:12}",
            "UNCATEGORIZED", self.code, self.value
        )
    }
}

impl fmt::Display for CategorizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = match self.category() {
            Some(category) => category,
            None => return fmt::Display::fmt(self.base(), f),
        };
        let event = self.base();
        let code_name = codes::registry()
            .name(category, event.code)
            .unwrap_or("UNKNOWN");
        let class_name = match category {
            Category::Button => Category::Key.class_name(),
            category => category.class_name(),
        };

        if let CategorizedEvent::Key(key) = self {
            write!(f, "{} event at ", class_name)?;
            write_timestamp(f, event.timestamp)?;
            let state = match key.state {
                KeyState::Up => "up",
                KeyState::Down => "down",
                KeyState::Hold => "hold",
            };
            return write!(f, ", {} (0x{:04X}), {}", code_name, event.code, state);
        }

        write!(f, "{:<14} event at ", class_name)?;
        write_timestamp(f, event.timestamp)?;
        write!(
            f,
            ", {:<20} (0x{:04X}), value: {:12}",
            code_name, event.code, event.value
        )
    }
}
