use anyhow::{Context, Error};
use input::InputDevice;
use std::path::Path;

pub fn list(input_dir: &Path) -> Result<(), Error> {
    let mut paths = input::list_devices(input_dir)
        .with_context(|| format!("Listing devices in {}", input_dir.display()))?;
    paths.sort();

    for path in paths {
        match InputDevice::open(&path) {
            Ok(device) => {
                let info = device.info();
                println!(
                    "{}: '{}' bus 0x{:04X} vendor 0x{:04X} product 0x{:04X} version 0x{:04X}",
                    path.display(),
                    device.name(),
                    info.bustype,
                    info.vendor,
                    info.product,
                    info.version
                );
            }
            Err(err) => log::warn!("{}: {}", path.display(), err),
        }
    }

    Ok(())
}

pub fn clear_effects(path: &Path) -> Result<(), Error> {
    let device = InputDevice::open(path).context("Failed to open device")?;
    let _grab = device.grab_scoped().context("Failed to grab device")?;

    log::info!(
        "Clearing {} effect slots of {}",
        device.ff_effects_count(),
        path.display()
    );
    device.clear_effects();
    Ok(())
}
