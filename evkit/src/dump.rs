use anyhow::{Context, Error};
use input::codes::{self, Category, Registry};
use input::effect::Periodic;
use input::{CapabilitySet, Effect, EffectKind, InputDevice};
use std::collections::BTreeSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn print_codes(registry: &Registry, type_: u16, categories: &[Category], set: &BTreeSet<u16>) {
    if set.is_empty() {
        return;
    }

    let type_name = registry.name(Category::EventType, type_).unwrap_or("?");
    println!("  Event type {} (0x{:X})", type_name, type_);
    for &code in set {
        let name = categories
            .iter()
            .find_map(|&category| registry.name(category, code));
        if let Some(name) = name {
            println!("    Event code {} (0x{:X})", name, code);
        }
    }
}

pub fn print_capabilities(registry: &Registry, capabilities: &CapabilitySet) {
    println!("Supported events:");
    print_codes(registry, codes::EV_SYN, &[Category::Synch], &capabilities.synchs);
    print_codes(
        registry,
        codes::EV_KEY,
        &[Category::Key, Category::Button],
        &capabilities.keys,
    );
    print_codes(
        registry,
        codes::EV_REL,
        &[Category::RelativeAxis],
        &capabilities.relative_axes,
    );

    if !capabilities.absolute_axes.is_empty() {
        println!("  Event type EV_ABS (0x{:X})", codes::EV_ABS);
        for (&code, info) in &capabilities.absolute_axes {
            if let Some(name) = registry.name(Category::AbsoluteAxis, code) {
                println!("    Event code {} (0x{:X})", name, code);
                println!("      Value {:6}", info.value);
                println!("      Min   {:6}", info.minimum);
                println!("      Max   {:6}", info.maximum);
                println!("      Fuzz  {:6}", info.fuzz);
                println!("      Flat  {:6}", info.flat);
            }
        }
    }

    print_codes(registry, codes::EV_MSC, &[Category::Misc], &capabilities.miscs);
    print_codes(registry, codes::EV_SW, &[Category::Switch], &capabilities.switches);
    print_codes(registry, codes::EV_LED, &[Category::Led], &capabilities.leds);
    print_codes(registry, codes::EV_SND, &[Category::Sound], &capabilities.sounds);
    print_codes(
        registry,
        codes::EV_REP,
        &[Category::Autorepeat],
        &capabilities.autorepeats,
    );
    print_codes(
        registry,
        codes::EV_FF,
        &[Category::ForceFeedback],
        &capabilities.force_feedbacks,
    );
    print_codes(
        registry,
        codes::EV_UINPUT,
        &[Category::UiForceFeedback],
        &capabilities.uinputs,
    );
}

fn can_rumble(capabilities: &CapabilitySet) -> bool {
    let mut square = CapabilitySet::default();
    square.force_feedbacks = [codes::FF_PERIODIC, codes::FF_SQUARE].into_iter().collect();
    capabilities.has_capabilities(&square)
}

fn rumble(device: &InputDevice) -> Result<(), Error> {
    println!("Rumbling device {} ...", device.path().display());
    let effect = Effect::new(EffectKind::Periodic(Periodic {
        waveform: codes::FF_SQUARE,
        period: Duration::from_millis(500),
        magnitude: 30000,
        ..Periodic::default()
    }));

    let id = device
        .upload_effect(&effect)
        .context("Failed to upload rumble effect on device")?;
    device
        .play_effect(id, 1)
        .context("Failed to play rumble effect on device")?;
    thread::sleep(Duration::from_millis(600));
    device
        .erase_effect(id)
        .context("Failed to erase rumble effect on device")?;
    Ok(())
}

pub fn run(path: &Path, rumble_when_idle: bool) -> Result<(), Error> {
    let device = InputDevice::open(path).context("Failed to open device")?;
    let registry = codes::registry();

    let version = device.driver_version();
    println!(
        "Input driver version is {}.{}.{}",
        version >> 16,
        (version >> 8) % 256,
        version % 256
    );
    let info = device.info();
    println!(
        "Input device ID: bus 0x{:04X} vendor 0x{:04X} product 0x{:04X} version 0x{:04X}",
        info.bustype, info.vendor, info.product, info.version
    );
    println!("Input device name: '{}'", device.name());
    print_capabilities(registry, device.capabilities());

    let rumble_when_idle = rumble_when_idle && can_rumble(device.capabilities());
    loop {
        let ready = device
            .io()
            .wait(IDLE_TIMEOUT)
            .context("Failed to wait for events on device")?;
        if !ready {
            if rumble_when_idle {
                rumble(&device)?;
            } else {
                println!("Waiting for events on device {} ...", path.display());
            }
            continue;
        }

        let events = device
            .io()
            .read_all()
            .context("Failed to read events on device")?;
        for event in events {
            println!("{}", event.categorize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rumble_needs_periodic_square() {
        let mut capabilities = CapabilitySet::default();
        capabilities.force_feedbacks.insert(codes::FF_PERIODIC);
        assert!(!can_rumble(&capabilities));
        capabilities.force_feedbacks.insert(codes::FF_SQUARE);
        assert!(can_rumble(&capabilities));
    }
}
