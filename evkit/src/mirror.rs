use crate::config::Config;
use anyhow::{anyhow, Context, Error};
use input::codes;
use input::{EventIo, InputDevice, InputEvent, UserDevice};
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

// Requests from programs playing effects on the virtual device. They are
// accepted without being passed on to the sources.
fn handle_feedback(virtual_device: &UserDevice, event: InputEvent) -> Result<(), Error> {
    match (event.type_, event.code) {
        (codes::EV_UINPUT, codes::UI_FF_UPLOAD) => {
            let mut upload = virtual_device.begin_upload(event.value as u32)?;
            log::debug!("Upload of effect {:?}", upload.effect.kind);
            upload.retval = 0;
            virtual_device.end_upload(&upload)?;
        }
        (codes::EV_UINPUT, codes::UI_FF_ERASE) => {
            let mut erase = virtual_device.begin_erase(event.value as u32)?;
            log::debug!("Erase of effect {}", erase.effect_id);
            erase.retval = 0;
            virtual_device.end_erase(&erase)?;
        }
        _ => {}
    }
    Ok(())
}

pub fn run(config: &Config) -> Result<(), Error> {
    let virtual_config = config.virtual_device();
    if virtual_config.sources.is_empty() {
        return Err(anyhow!("No sources specified in [virtual-device]"));
    }

    let sources = virtual_config
        .sources
        .iter()
        .map(|path| {
            InputDevice::open(path).with_context(|| format!("Failed to open {}", path.display()))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let options = config.create_options();
    let virtual_device = UserDevice::create_from_devices(&sources, &config.excluded()?, &options)
        .context("Failed to create virtual device")?;
    log::info!(
        "Mirroring {} devices into '{}'",
        sources.len(),
        virtual_device.name()
    );

    let _grabs = sources
        .iter()
        .map(|source| {
            source
                .grab_scoped()
                .with_context(|| format!("Failed to grab {}", source.path().display()))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut ios: Vec<&EventIo> = sources.iter().map(InputDevice::io).collect();
    ios.push(virtual_device.io());

    loop {
        for index in input::wait_any(&ios, POLL_TIMEOUT)? {
            let events = ios[index].read_all()?;
            if index == sources.len() {
                for event in events {
                    handle_feedback(&virtual_device, event)?;
                }
                continue;
            }

            for event in events {
                virtual_device.io().write_event(&event)?;
            }
        }
    }
}
