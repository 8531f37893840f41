use std::time::{Duration, Instant};

use sleepstim_core::ConfigError;
use sleepstim_physio::{
    CardiacDetector, CardiacSettings, PhaseDetector, PhysioError, RespirationDetector,
    RespirationSettings, Sample, StreamInfo, StreamOutlet, Waveform, stream_channel,
};
use sleepstim_timing::StopFlag;

const STALL: Duration = Duration::from_millis(100);

fn fill(outlet: &StreamOutlet, fs: f64, seconds: f64, offset: f64, waves: &[Waveform]) {
    for i in 0..(seconds * fs) as usize {
        let t = offset + i as f64 / fs;
        let values = waves.iter().map(|w| w.value(t)).collect();
        outlet.push(Sample { timestamp: t, values }).unwrap();
    }
}

#[test]
fn respiration_events_follow_breaths_on_requested_channel() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let fs = 50.0;
    let info = StreamInfo::new("psg", &["ECG", "RESP"], fs);
    let (outlet, inlet) = stream_channel(info, 10_000);
    fill(
        &outlet,
        fs,
        40.0,
        100.0,
        &[Waveform::Ecg { bpm: 60.0 }, Waveform::Respiration { rate_hz: 0.25 }],
    );

    let mut detector =
        RespirationDetector::respiration(inlet, "RESP", RespirationSettings::default(), STALL)
            .unwrap();
    let stop = StopFlag::new();
    let events: Vec<_> = detector
        .events(&stop)
        .take(6)
        .collect::<Result<_, _>>()
        .unwrap();

    for (i, pair) in events.windows(2).enumerate() {
        assert_eq!(pair[0].index, i as u64);
        assert!((pair[1].timestamp - pair[0].timestamp - 4.0).abs() < 0.1);
    }
    // Landmark sits shortly after the raw inhalation peak at 101 + 4k s.
    let lag = (events[0].timestamp - 101.0).rem_euclid(4.0);
    assert!(lag < 0.6, "lag {lag}");
}

#[test]
fn clock_offset_is_applied_to_events() {
    let fs = 250.0;
    let mut info = StreamInfo::new("ecg", &["ECG"], fs);
    info.clock_offset = -50.0;
    let (outlet, inlet) = stream_channel(info, 20_000);
    fill(&outlet, fs, 10.0, 50.0, &[Waveform::Ecg { bpm: 60.0 }]);

    let mut detector =
        CardiacDetector::cardiac(inlet, "ECG", CardiacSettings::default(), STALL).unwrap();
    let event = detector.next_event(&StopFlag::new()).unwrap();
    assert!(event.timestamp >= 2.0 && event.timestamp < 4.0, "{event:?}");
    assert!((event.timestamp.rem_euclid(1.0) - Waveform::R_WAVE_S).abs() < 0.05);
}

#[test]
fn silent_stream_reports_stall() {
    let (_outlet, inlet) = stream_channel(StreamInfo::new("resp", &["RESP"], 50.0), 16);
    let mut detector =
        RespirationDetector::respiration(inlet, "RESP", RespirationSettings::default(), STALL)
            .unwrap();
    let started = Instant::now();
    let err = detector.next_event(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PhysioError::Stalled { .. }), "{err:?}");
    assert!(started.elapsed() >= STALL);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn stall_after_data_stops() {
    let fs = 50.0;
    let (outlet, inlet) = stream_channel(StreamInfo::new("resp", &["RESP"], fs), 10_000);
    // Less than a breath: no event can be confirmed before the data runs out.
    fill(&outlet, fs, 1.0, 0.0, &[Waveform::Respiration { rate_hz: 0.25 }]);
    let mut detector =
        RespirationDetector::respiration(inlet, "RESP", RespirationSettings::default(), STALL)
            .unwrap();
    let err = detector.next_event(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PhysioError::Stalled { .. }));
    drop(outlet);
}

#[test]
fn closed_stream_reports_disconnect() {
    let (outlet, inlet) = stream_channel(StreamInfo::new("ecg", &["ECG"], 250.0), 16);
    drop(outlet);
    let mut detector =
        CardiacDetector::cardiac(inlet, "ECG", CardiacSettings::default(), STALL).unwrap();
    assert!(matches!(
        detector.next_event(&StopFlag::new()),
        Err(PhysioError::Disconnected(_))
    ));
}

#[test]
fn stop_flag_cancels_wait() {
    let (_outlet, inlet) = stream_channel(StreamInfo::new("ecg", &["ECG"], 250.0), 16);
    let mut detector = CardiacDetector::cardiac(
        inlet,
        "ECG",
        CardiacSettings::default(),
        Duration::from_secs(30),
    )
    .unwrap();
    let stop = StopFlag::new();
    let remote = stop.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        remote.stop();
    });
    let started = Instant::now();
    assert_eq!(detector.next_event(&stop), Err(PhysioError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
    handle.join().unwrap();
}

#[test]
fn unknown_channel_is_a_configuration_error() {
    let (_outlet, inlet) = stream_channel(StreamInfo::new("psg", &["ECG"], 250.0), 16);
    let err = RespirationDetector::respiration(inlet, "RESP", RespirationSettings::default(), STALL)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        PhysioError::Config(ConfigError::UnknownChannel { .. })
    ));
}

#[test]
fn queued_samples_are_not_a_stall_after_a_long_pause() {
    let fs = 250.0;
    let (outlet, inlet) = stream_channel(StreamInfo::new("ecg", &["ECG"], fs), 20_000);
    fill(&outlet, fs, 20.0, 0.0, &[Waveform::Ecg { bpm: 60.0 }]);
    let mut detector =
        CardiacDetector::cardiac(inlet, "ECG", CardiacSettings::default(), STALL).unwrap();
    let stop = StopFlag::new();

    let first = detector.next_event(&stop).unwrap();
    // The caller is busy for longer than the stall timeout.
    std::thread::sleep(STALL + Duration::from_millis(50));
    let second = detector.next_event(&stop).unwrap();
    assert!((second.timestamp - first.timestamp - 1.0).abs() < 0.05, "{second:?}");
    drop(outlet);
}

#[test]
fn timestamp_gap_restarts_warmup() {
    let fs = 250.0;
    let (outlet, inlet) = stream_channel(StreamInfo::new("ecg", &["ECG"], fs), 20_000);
    let ecg = [Waveform::Ecg { bpm: 60.0 }];
    fill(&outlet, fs, 10.0, 0.0, &ecg);
    // Resumes after a dropout with only 1.5 s of data: inside the warm-up.
    fill(&outlet, fs, 1.5, 50.0, &ecg);
    let mut detector =
        CardiacDetector::cardiac(inlet, "ECG", CardiacSettings::default(), STALL).unwrap();

    let stop = StopFlag::new();
    let mut events = Vec::new();
    let err = loop {
        match detector.next_event(&stop) {
            Ok(event) => events.push(event.timestamp),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, PhysioError::Stalled { .. }), "{err:?}");
    assert!(events.len() >= 6, "{events:?}");
    assert!(events.iter().all(|&t| t < 10.0), "{events:?}");
    drop(outlet);
}
