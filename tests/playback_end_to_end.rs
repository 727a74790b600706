//! A performance file played start to finish through the public API

use std::ops::ControlFlow;
use std::sync::Arc;

use ondes_gw::clock::{Clock, VirtualClock};
use ondes_gw::osc::{MemorySink, OutboundMessage};
use ondes_gw::playback::{Performance, Player, PlayerControls};

fn smf(ticks_per_quarter: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let mut data = b"MThd".to_vec();
    data.extend_from_slice(&6u32.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    data.extend_from_slice(&ticks_per_quarter.to_be_bytes());
    for track in tracks {
        data.extend_from_slice(b"MTrk");
        data.extend_from_slice(&(track.len() as u32).to_be_bytes());
        data.extend_from_slice(track);
    }
    data
}

#[test]
fn test_two_track_file_plays_on_time() {
    let conductor: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
    let melody: &[u8] = &[
        0x00, 0x90, 0x3C, 0x64, // note on, middle C
        0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // 250000 us per quarter
        0x60, 0x80, 0x3C, 0x40, // note off one quarter later
        0x00, 0xFF, 0x2F, 0x00,
    ];
    let data = smf(96, &[conductor, melody]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.mid");
    std::fs::write(&path, &data).unwrap();
    let performance = Performance::load(&path).unwrap();
    assert_eq!(performance.track_count(), 2);

    let clock = VirtualClock::new();
    let sink = MemorySink::with_clock(Arc::new(clock.clone()));
    let controls = PlayerControls::new([0; 8], [0; 3], -1, 0);
    let mut keep_playing = |_: &PlayerControls| ControlFlow::Continue(());

    let report = Player::new(&performance, controls).run(&mut keep_playing, &sink, &clock);

    assert!(!report.cancelled);
    assert_eq!(report.events, 5);
    assert_eq!(
        sink.timed(),
        vec![
            (0, OutboundMessage::Key { note: 24, sounding: true }),
            (250_000, OutboundMessage::Key { note: 24, sounding: false }),
        ]
    );
    assert_eq!(clock.now_micros(), 250_000);
}

#[test]
fn test_corrupt_file_is_rejected() {
    let data = smf(96, &[&[0x00, 0x3C, 0x64]]);
    assert!(Performance::parse(&data).is_err());
}
