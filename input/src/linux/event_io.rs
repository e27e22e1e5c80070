use crate::error::{Error, Result};
use crate::event::InputEvent;
use crate::linux::glue;
use std::fs::File;
use std::mem::{size_of, MaybeUninit};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

const READ_BATCH: usize = 64;

/// Blocking event transport over an evdev or uinput file descriptor.
///
/// On an input device it reads the events the user generates and writes
/// feedback such as LED changes. On a virtual device it is the other way
/// around.
#[derive(Debug)]
pub struct EventIo {
    file: File,
}

impl EventIo {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Waits until an event can be read. Returns `false` if `timeout`
    /// elapsed first.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ret < 0 {
            return Err(Error::last_os_error("Wait on input event failed"));
        }

        Ok(ret != 0)
    }

    /// Reads a single event. With nothing pending the error carries `EAGAIN`,
    /// see [`Error::is_would_block`].
    pub fn read_one(&self) -> Result<InputEvent> {
        let mut event = MaybeUninit::<glue::input_event>::uninit();
        let size = size_of::<glue::input_event>();
        let ret = unsafe { libc::read(self.as_raw_fd(), event.as_mut_ptr() as *mut _, size) };
        if ret < 0 {
            return Err(Error::last_os_error("ReadOne input event failed"));
        }
        if (ret as usize) < size {
            return Err(Error::Os {
                context: "ReadOne input event failed".into(),
                source: std::io::ErrorKind::UnexpectedEof.into(),
            });
        }

        let event = unsafe { event.assume_init() };
        Ok(InputEvent::from_raw(event))
    }

    /// Reads every pending event.
    pub fn read_all(&self) -> Result<Vec<InputEvent>> {
        let mut result = Vec::new();
        let mut events = [MaybeUninit::<glue::input_event>::uninit(); READ_BATCH];
        let size = size_of::<glue::input_event>();

        loop {
            let ret = unsafe {
                libc::read(
                    self.as_raw_fd(),
                    events.as_mut_ptr() as *mut _,
                    size * events.len(),
                )
            };
            if ret < 0 {
                let err = Error::last_os_error("ReadAll input event failed");
                if err.is_would_block() {
                    return Ok(result);
                }
                return Err(err);
            }
            if ret == 0 {
                return Ok(result);
            }

            let count = ret as usize / size;
            result.extend(
                events[..count]
                    .iter()
                    .map(|event| InputEvent::from_raw(unsafe { event.assume_init() })),
            );
        }
    }

    pub fn write(&self, type_: u16, code: u16, value: i32) -> Result<()> {
        self.write_event(&InputEvent::new(type_, code, value))
    }

    /// Writes `event`, stamped with the current time.
    pub fn write_event(&self, event: &InputEvent) -> Result<()> {
        let raw = event.stamped_now().to_raw();
        let size = size_of::<glue::input_event>();
        let ret = unsafe {
            libc::write(
                self.as_raw_fd(),
                &raw as *const glue::input_event as *const _,
                size,
            )
        };
        check_write(ret, size)
    }
}

fn check_write(ret: libc::ssize_t, size: usize) -> Result<()> {
    const CONTEXT: &str = "error writing event to uinput device";
    if ret < 0 {
        return Err(Error::last_os_error(CONTEXT));
    }
    if (ret as usize) < size {
        return Err(Error::Os {
            context: CONTEXT.into(),
            source: std::io::ErrorKind::WriteZero.into(),
        });
    }
    Ok(())
}

/// Waits until at least one of `ios` can be read and returns the indices of
/// those that can. An empty result means `timeout` elapsed.
pub fn wait_any(ios: &[&EventIo], timeout: Duration) -> Result<Vec<usize>> {
    let mut pfds: Vec<libc::pollfd> = ios
        .iter()
        .map(|io| libc::pollfd {
            fd: io.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let ret = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, millis) };
    if ret < 0 {
        return Err(Error::last_os_error("Wait on input event failed"));
    }

    Ok(pfds
        .iter()
        .enumerate()
        .filter(|(_, pfd)| pfd.revents & libc::POLLIN != 0)
        .map(|(index, _)| index)
        .collect())
}

impl AsRawFd for EventIo {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{EV_KEY, EV_SYN, KEY_A, SYN_REPORT};
    use std::os::unix::io::FromRawFd;

    // A non-blocking pipe: events written to the second end come out of
    // the first.
    fn pipe() -> (EventIo, EventIo) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(ret, 0);
        unsafe {
            (
                EventIo::new(File::from_raw_fd(fds[0])),
                EventIo::new(File::from_raw_fd(fds[1])),
            )
        }
    }

    #[test]
    fn written_events_are_read_back() {
        let (reader, writer) = pipe();
        assert!(!reader.wait(Duration::from_millis(1)).unwrap());

        writer.write(EV_KEY, KEY_A, 1).unwrap();
        writer.write(EV_SYN, SYN_REPORT, 0).unwrap();
        assert!(reader.wait(Duration::from_millis(100)).unwrap());

        let event = reader.read_one().unwrap();
        assert_eq!((event.type_, event.code, event.value), (EV_KEY, KEY_A, 1));
        assert_ne!(event.timestamp, std::time::UNIX_EPOCH);

        let rest = reader.read_all().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].type_, EV_SYN);
    }

    #[test]
    fn wait_any_reports_ready_handles() {
        let (first, first_writer) = pipe();
        let (second, _second_writer) = pipe();
        assert!(wait_any(&[&first, &second], Duration::from_millis(1))
            .unwrap()
            .is_empty());

        first_writer.write(EV_KEY, KEY_A, 0).unwrap();
        assert_eq!(
            wait_any(&[&first, &second], Duration::from_millis(100)).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn empty_reads_would_block() {
        let (reader, _writer) = pipe();
        let err = reader.read_one().unwrap_err();
        assert!(err.is_would_block());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn short_writes_are_write_zero() {
        let err = check_write(10, size_of::<glue::input_event>()).unwrap_err();
        assert_eq!(err.raw_os_error(), None);
        match err {
            Error::Os { source, .. } => assert_eq!(source.kind(), std::io::ErrorKind::WriteZero),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(check_write(24, 24).is_ok());
    }

    #[test]
    fn read_all_drains_several_batches() {
        let (reader, writer) = pipe();
        for value in 0..(READ_BATCH as i32 + 10) {
            writer.write(EV_KEY, KEY_A, value).unwrap();
        }

        let events = reader.read_all().unwrap();
        assert_eq!(events.len(), READ_BATCH + 10);
        assert_eq!(events.last().map(|event| event.value), Some(READ_BATCH as i32 + 9));
    }
}
