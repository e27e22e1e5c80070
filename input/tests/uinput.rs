//! These tests create real virtual devices and need write access to
//! `/dev/uinput`. Run them with `cargo test -- --ignored`.

use input::codes::{self, EV_KEY, EV_SYN, EV_UINPUT, FF_RUMBLE, KEY_A, SYN_REPORT};
use input::effect::Rumble;
use input::{
    CapabilitySet, CategorizedEvent, CreateOptions, Effect, EffectKind, InputDevice, UserDevice,
};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

fn keyboard_options(name: &str) -> CreateOptions {
    CreateOptions {
        name: name.to_owned(),
        capabilities: CapabilitySet {
            keys: [KEY_A].into_iter().collect(),
            ..CapabilitySet::default()
        },
        ..CreateOptions::default()
    }
}

#[test]
#[ignore]
fn created_device_reports_requested_capabilities() {
    let virtual_device = UserDevice::create(&keyboard_options("evinput-test-caps")).unwrap();
    let device = virtual_device.device().expect("virtual device node not found");
    assert_eq!(device.name(), "evinput-test-caps");

    // The kernel enables the synch codes of every device on its own.
    let mut reported = device.capabilities().clone();
    reported.synchs.clear();
    assert_eq!(reported, keyboard_options("").capabilities);
}

#[test]
#[ignore]
fn merged_device_excludes_synchs() {
    let source = UserDevice::create(&keyboard_options("evinput-test-source")).unwrap();
    let source_path = source.device().expect("source node not found").path().to_owned();

    let excluded: BTreeSet<u16> = input::capabilities::DEFAULT_EXCLUDED.into_iter().collect();
    let options = CreateOptions {
        name: "evinput-test-merged".into(),
        ..CreateOptions::default()
    };
    let merged = UserDevice::create_from_paths(&[source_path], &excluded, &options).unwrap();
    assert!(merged.capabilities().synchs.is_empty());
    assert_eq!(merged.capabilities().keys, [KEY_A].into_iter().collect());
    assert_eq!(merged.max_effects(), 0);
}

#[test]
#[ignore]
fn written_events_arrive_categorized() {
    let virtual_device = UserDevice::create(&keyboard_options("evinput-test-events")).unwrap();
    let device = virtual_device.device().expect("virtual device node not found");

    virtual_device.write(EV_KEY, KEY_A, 1).unwrap();
    virtual_device.synchronize().unwrap();
    assert!(device.io().wait(Duration::from_secs(1)).unwrap());

    let events: Vec<_> = device
        .io()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|event| event.categorize())
        .collect();
    match &events[0] {
        CategorizedEvent::Key(key) => assert_eq!(key.key, Some(KEY_A)),
        other => panic!("expected a key event, got {}", other),
    }
    assert!(events
        .iter()
        .any(|event| event.base().type_ == EV_SYN && event.base().code == SYN_REPORT));
    assert_eq!(codes::registry().name(codes::Category::Key, KEY_A), Some("KEY_A"));
}

// Reads from the virtual device until the kernel announces a force-feedback
// request with `code`, and returns its request id.
fn next_request(virtual_device: &UserDevice, code: u16) -> u32 {
    loop {
        assert!(virtual_device.io().wait(Duration::from_secs(5)).unwrap());
        let request = virtual_device
            .io()
            .read_all()
            .unwrap()
            .into_iter()
            .find(|event| event.type_ == EV_UINPUT && event.code == code);
        if let Some(event) = request {
            return event.value as u32;
        }
    }
}

#[test]
#[ignore]
fn force_feedback_requests_are_answered() {
    let options = CreateOptions {
        name: "evinput-test-ff".into(),
        capabilities: CapabilitySet {
            force_feedbacks: [FF_RUMBLE].into_iter().collect(),
            ..CapabilitySet::default()
        },
        max_effects: 4,
        ..CreateOptions::default()
    };
    let virtual_device = UserDevice::create(&options).unwrap();
    let path = virtual_device
        .device()
        .expect("virtual device node not found")
        .path()
        .to_owned();

    // Uploading and erasing block until the virtual device answers.
    let player = thread::spawn(move || {
        let device = InputDevice::open(&path)?;
        let effect = Effect::new(EffectKind::Rumble(Rumble {
            strong_magnitude: 0x8000,
            weak_magnitude: 0x4000,
        }));
        let id = device.upload_effect(&effect)?;
        device.erase_effect(id)?;
        Ok::<_, input::Error>(id)
    });

    let mut upload = virtual_device
        .begin_upload(next_request(&virtual_device, codes::UI_FF_UPLOAD))
        .unwrap();
    assert_eq!(
        upload.effect.kind,
        EffectKind::Rumble(Rumble {
            strong_magnitude: 0x8000,
            weak_magnitude: 0x4000,
        })
    );
    upload.retval = 0;
    virtual_device.end_upload(&upload).unwrap();

    let mut erase = virtual_device
        .begin_erase(next_request(&virtual_device, codes::UI_FF_ERASE))
        .unwrap();
    assert_eq!(erase.effect_id, upload.effect.id as u32);
    erase.retval = 0;
    virtual_device.end_erase(&erase).unwrap();

    let id = player.join().unwrap().unwrap();
    assert_eq!(id, upload.effect.id);
}
