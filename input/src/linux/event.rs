use crate::event::InputEvent;
use crate::linux::glue;
use std::convert::TryFrom;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

impl InputEvent {
    pub(crate) fn to_raw(&self) -> glue::input_event {
        let since_epoch = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        glue::input_event {
            type_: self.type_,
            code: self.code,
            value: self.value,
            time: libc::timeval {
                tv_sec: since_epoch.as_secs() as libc::time_t,
                tv_usec: since_epoch.subsec_micros() as libc::suseconds_t,
            },
        }
    }

    pub(crate) fn from_raw(raw: glue::input_event) -> Self {
        let secs = u64::try_from(raw.time.tv_sec).unwrap_or(0);
        let micros = u64::try_from(raw.time.tv_usec).unwrap_or(0);
        let timestamp = UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros);

        InputEvent {
            timestamp,
            type_: raw.type_,
            code: raw.code,
            value: raw.value,
        }
    }

    /// Stamps the event with the current time, as done for every event
    /// written to a device.
    pub(crate) fn stamped_now(mut self) -> Self {
        self.timestamp = SystemTime::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{EV_KEY, KEY_A};

    #[test]
    fn raw_events_keep_microseconds() {
        let event = InputEvent::new(EV_KEY, KEY_A, 1)
            .with_timestamp(UNIX_EPOCH + Duration::new(12, 345_678_999));
        let raw = event.to_raw();
        assert_eq!(raw.time.tv_sec, 12);
        assert_eq!(raw.time.tv_usec, 345_678);

        let back = InputEvent::from_raw(raw);
        assert_eq!(back.timestamp, UNIX_EPOCH + Duration::new(12, 345_678_000));
        assert_eq!((back.type_, back.code, back.value), (EV_KEY, KEY_A, 1));
    }

    #[test]
    fn negative_times_clamp_to_epoch() {
        let mut raw = InputEvent::new(EV_KEY, KEY_A, 0).to_raw();
        raw.time.tv_sec = -5;
        assert_eq!(InputEvent::from_raw(raw).timestamp, UNIX_EPOCH);
    }
}
