//! Locating the event node of a freshly created virtual device.
//!
//! The kernel creates the node asynchronously and udev may still be fixing
//! its permissions when we look, so both strategies tolerate a short lag.
//! The direct strategy follows the device's sysfs entry. The fallback scans
//! every event node for one reporting the expected name.

use crate::error::{Error, Result};
use crate::linux::device::{list_devices, InputDevice};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Retry limits and file-system locations used by discovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// Extra open attempts of the direct strategy after the first one.
    pub attempts: u32,
    pub interval: Duration,
    /// Wait before the fallback strategy scans the nodes.
    pub warmup: Duration,
    pub input_dir: PathBuf,
    /// sysfs directory of a virtual device; `{}` stands for its system name.
    pub sysfs_template: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: 19,
            interval: Duration::from_millis(100),
            warmup: Duration::from_millis(100),
            input_dir: PathBuf::from("/dev/input"),
            sysfs_template: String::from("/sys/devices/virtual/input/{}"),
        }
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Something discovery can match by name.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for InputDevice {
    fn name(&self) -> &str {
        InputDevice::name(self)
    }
}

/// True for `event` followed by at least one decimal digit.
pub fn is_event_node_name(name: &str) -> bool {
    name.strip_prefix("event")
        .map(|index| !index.is_empty() && index.bytes().all(|byte| byte.is_ascii_digit()))
        .unwrap_or(false)
}

/// Event nodes in `dir` named `event<N>`, sorted by file name.
///
/// The sort is lexicographic, so `event10` comes before `event2`. Since the
/// fallback strategy matches on the device name, the order only decides
/// between several devices sharing that name.
pub fn candidate_nodes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut nodes: Vec<PathBuf> = list_devices(dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(is_event_node_name)
                .unwrap_or(false)
        })
        .collect();
    nodes.sort();
    Ok(nodes)
}

/// Runs the discovery strategies with an injected opener and sleeper.
pub struct Discovery<'a, S, O> {
    config: &'a DiscoveryConfig,
    sleeper: S,
    open: O,
}

impl<'a, S, O, D> Discovery<'a, S, O>
where
    S: Sleeper,
    O: FnMut(&Path) -> Result<D>,
    D: Named,
{
    pub fn new(config: &'a DiscoveryConfig, sleeper: S, open: O) -> Self {
        Self {
            config,
            sleeper,
            open,
        }
    }

    /// Tries the direct strategy if the system name is known, then the
    /// fallback.
    pub fn find(&mut self, sysname: Option<&str>, name: &str) -> Result<D> {
        if let Some(sysname) = sysname {
            match self.find_direct(sysname) {
                Ok(device) => return Ok(device),
                Err(err) => debug!("Direct lookup of {} failed: {}", sysname, err),
            }
        }

        self.find_fallback(name)
    }

    /// Opens the node listed in the device's sysfs directory, retrying the
    /// lookup and the open until the attempts run out.
    pub fn find_direct(&mut self, sysname: &str) -> Result<D> {
        let mut attempt = 0;
        loop {
            let result = self
                .resolve_sysname(sysname)
                .and_then(|path| (self.open)(&path));
            match result {
                Ok(device) => return Ok(device),
                Err(err) if attempt >= self.config.attempts => return Err(err),
                Err(err) => {
                    debug!("Attempt {} to open {} failed: {}", attempt + 1, sysname, err);
                    attempt += 1;
                    self.sleeper.sleep(self.config.interval);
                }
            }
        }
    }

    /// Opens every event node in turn and returns the first whose name is
    /// `name`.
    pub fn find_fallback(&mut self, name: &str) -> Result<D> {
        self.sleeper.sleep(self.config.warmup);

        for path in candidate_nodes(&self.config.input_dir)? {
            match (self.open)(&path) {
                Ok(device) if device.name() == name => return Ok(device),
                Ok(_) => {}
                Err(err) => debug!("Skipping {}: {}", path.display(), err),
            }
        }

        Err(Error::NotFound(format!(
            "Could not find device matching name '{}'",
            name
        )))
    }

    fn resolve_sysname(&self, sysname: &str) -> Result<PathBuf> {
        let syspath = PathBuf::from(self.config.sysfs_template.replace("{}", sysname));
        let not_found = || Error::NotFound(format!("Could not find device in {}", syspath.display()));

        let entries = fs::read_dir(&syspath).map_err(|_| not_found())?;
        for entry in entries {
            let file_name = entry?.file_name();
            if let Some(file_name) = file_name.to_str().filter(|name| is_event_node_name(name)) {
                return Ok(self.config.input_dir.join(file_name));
            }
        }

        Err(not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::os::unix::fs::symlink;

    #[derive(Debug, PartialEq)]
    struct FakeDevice {
        path: PathBuf,
        name: String,
    }

    impl Named for FakeDevice {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Default)]
    struct RecordingSleeper(Vec<Duration>);

    impl Sleeper for &mut RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.0.push(duration);
        }
    }

    fn config(root: &Path) -> DiscoveryConfig {
        DiscoveryConfig {
            attempts: 3,
            interval: Duration::from_millis(5),
            warmup: Duration::from_millis(7),
            input_dir: root.join("input"),
            sysfs_template: root.join("sys").join("{}").to_string_lossy().into_owned(),
        }
    }

    fn opener(names: HashMap<&'static str, &'static str>) -> impl FnMut(&Path) -> Result<FakeDevice> {
        move |path| {
            let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
            names
                .get(file_name)
                .map(|name| FakeDevice {
                    path: path.to_owned(),
                    name: name.to_string(),
                })
                .ok_or_else(|| Error::NotFound(file_name.to_owned()))
        }
    }

    #[test]
    fn event_node_names() {
        assert!(is_event_node_name("event0"));
        assert!(is_event_node_name("event123"));
        assert!(!is_event_node_name("event"));
        assert!(!is_event_node_name("events_all"));
        assert!(!is_event_node_name("mouse0"));
    }

    #[test]
    fn fallback_finds_matching_name_whatever_the_order() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir(&config.input_dir).unwrap();
        for node in ["event2", "event10", "event3"] {
            symlink("/dev/null", config.input_dir.join(node)).unwrap();
        }

        let candidates = candidate_nodes(&config.input_dir).unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["event10", "event2", "event3"]);

        let mut sleeper = RecordingSleeper::default();
        let open = opener(
            [("event2", "keyboard"), ("event10", "evinput-uinput"), ("event3", "mouse")]
                .into_iter()
                .collect(),
        );
        let device = Discovery::new(&config, &mut sleeper, open)
            .find_fallback("evinput-uinput")
            .unwrap();
        assert_eq!(device.path, config.input_dir.join("event10"));
        assert_eq!(sleeper.0, vec![config.warmup]);
    }

    #[test]
    fn fallback_takes_the_first_duplicate_in_sort_order() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir(&config.input_dir).unwrap();
        for node in ["event2", "event10"] {
            symlink("/dev/null", config.input_dir.join(node)).unwrap();
        }

        let mut sleeper = RecordingSleeper::default();
        let open = opener([("event2", "pad"), ("event10", "pad")].into_iter().collect());
        let device = Discovery::new(&config, &mut sleeper, open)
            .find_fallback("pad")
            .unwrap();
        assert_eq!(device.path, config.input_dir.join("event10"));
    }

    #[test]
    fn fallback_without_match_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());

        let mut sleeper = RecordingSleeper::default();
        let err = Discovery::new(&config, &mut sleeper, opener(HashMap::new()))
            .find_fallback("ghost")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn direct_retries_until_the_node_opens() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir_all(root.path().join("sys/input7/event12")).unwrap();
        fs::create_dir_all(root.path().join("sys/input7/capabilities")).unwrap();

        let mut failures = 2;
        let open = |path: &Path| {
            if failures > 0 {
                failures -= 1;
                return Err(Error::NotFound("not yet".into()));
            }
            Ok(FakeDevice {
                path: path.to_owned(),
                name: String::new(),
            })
        };

        let mut sleeper = RecordingSleeper::default();
        let device = Discovery::new(&config, &mut sleeper, open)
            .find_direct("input7")
            .unwrap();
        assert_eq!(device.path, config.input_dir.join("event12"));
        assert_eq!(sleeper.0, vec![config.interval; 2]);
    }

    #[test]
    fn direct_gives_up_after_all_attempts() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir_all(root.path().join("sys/input7/event12")).unwrap();

        let mut opens = 0;
        let open = |_: &Path| -> Result<FakeDevice> {
            opens += 1;
            Err(Error::NotFound("never".into()))
        };

        let mut sleeper = RecordingSleeper::default();
        let err = Discovery::new(&config, &mut sleeper, open)
            .find_direct("input7")
            .unwrap_err();
        assert_eq!(err.to_string(), "never");
        assert_eq!(sleeper.0.len(), config.attempts as usize);
        assert_eq!(opens, config.attempts + 1);
    }

    #[test]
    fn find_falls_back_when_sysfs_has_no_node() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir(&config.input_dir).unwrap();
        symlink("/dev/null", config.input_dir.join("event4")).unwrap();

        let mut sleeper = RecordingSleeper::default();
        let open = opener([("event4", "evinput-uinput")].into_iter().collect());
        let device = Discovery::new(&config, &mut sleeper, open)
            .find(Some("input9"), "evinput-uinput")
            .unwrap();
        assert_eq!(device.path, config.input_dir.join("event4"));
        // Four failed sysfs lookups, then the warm-up.
        assert_eq!(sleeper.0.len(), config.attempts as usize + 1);
        assert_eq!(sleeper.0.last(), Some(&config.warmup));
    }
}
