use clap::Parser;
use deskmate::animations::builtin_table;
use deskmate::bridge::write_directive;
use deskmate::channel::RecordChannel;
use deskmate::config::{Args, FileSettings, Settings};
use deskmate::controls::ControlCommand;
use deskmate::scheduler::ClonePhase;
use deskmate::{Pet, PetState};
use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn at(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + ms)
}

fn settings(dir: &TempDir, session: &str, extra: &[&str]) -> Settings {
    let mut argv = vec!["deskmate", "--session", session, "--runtime-dir", dir.path().to_str().unwrap()];
    argv.extend_from_slice(extra);
    Settings::resolve(Args::parse_from(argv), FileSettings::default())
}

#[test]
fn teardown_mid_clone_leaves_no_record() {
    let dir = TempDir::new().unwrap();
    let s = settings(&dir, "clone-teardown", &[]);
    let mut pet = Pet::new(&s, builtin_table(), at(0), 42);
    pet.tick(at(0));
    write_directive(&s.state_file, "doubling").unwrap();

    let mut now = 0;
    while pet.scheduler().state() != PetState::CloneFrozen {
        now += 16;
        assert!(now < 10_000, "clone never froze");
        pet.tick(at(now));
    }
    assert_eq!(pet.scheduler().clone_phase(), Some(ClonePhase::Attack));

    let chan = RecordChannel::new(dir.path());
    assert!(chan.read(pet.id()).is_some());

    pet.shutdown();
    assert!(chan.read(pet.id()).is_none());
    assert_eq!(pet.scheduler().clone_phase(), None);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("-pos"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn clone_sequence_completes_and_swaps_position() {
    let dir = TempDir::new().unwrap();
    let s = settings(&dir, "clone-swap", &["--no-social"]);
    let mut pet = Pet::new(&s, builtin_table(), at(0), 7);
    // Park mid-screen so the swap target is inside the monitor.
    let floor = pet.wander().floor();
    pet.control(ControlCommand::Drag { x: 800.0, y: floor }, at(0));
    pet.control(ControlCommand::Release { vx: 0.0, vy: 0.0 }, at(0));
    let start = pet.tick(at(0));
    assert_eq!(start.x, 800.0);
    pet.control(ControlCommand::Clone, at(0));

    let mut spawned = None;
    let mut now = 0;
    loop {
        now += 16;
        assert!(now < 20_000, "clone sequence never finished");
        let frame = pet.tick(at(now));
        if let Some(clone) = frame.clone {
            spawned.get_or_insert(clone.x);
            // The body holds still while the choreography runs.
            assert_eq!(frame.x, start.x);
        }
        if spawned.is_some() && pet.scheduler().clone_phase().is_none() {
            assert_eq!(frame.state, PetState::Idle);
            assert!(!frame.manual_override);
            break;
        }
    }
    let clone_x = spawned.unwrap();
    assert_eq!((clone_x - start.x).abs(), 64.0);
    assert_eq!(pet.wander().x(), clone_x);
}

#[test]
fn two_pets_see_each_other() {
    let dir = TempDir::new().unwrap();
    let mut a = Pet::new(&settings(&dir, "alpha", &[]), builtin_table(), at(0), 1);
    let mut b = Pet::new(&settings(&dir, "beta", &[]), builtin_table(), at(0), 2);
    for i in 0..40 {
        a.tick(at(i * 16));
        b.tick(at(i * 16));
    }
    assert_eq!(a.social().unwrap().peers().len(), 1);
    assert_eq!(&a.social().unwrap().peers()[0].id, b.id());
    assert_eq!(&b.social().unwrap().peers()[0].id, a.id());

    b.shutdown();
    // Gone as soon as the record is removed, no need to wait for staleness.
    for i in 40..80 {
        a.tick(at(i * 16));
    }
    assert!(a.social().unwrap().peers().is_empty());
}

#[test]
fn quit_command_in_inbox_terminates() {
    let dir = TempDir::new().unwrap();
    let s = settings(&dir, "inbox-quit", &[]);
    let mut pet = Pet::new(&s, builtin_table(), at(0), 3);
    fs::write(&s.control_file, "wander off\nquit\n").unwrap();
    let frame = pet.tick(at(0));
    assert!(pet.is_terminated());
    assert_eq!(frame.movement, None);
}
