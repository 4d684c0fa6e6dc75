use aqua_feeder_controller::codec::{decode, decode_last_setting, encode_single};
use aqua_feeder_controller::timestamp;
use aqua_feeder_controller::*;
use chrono::NaiveDate;

fn setting(start: &str, kg: u32, dispatch: DispatchGrams, gap: TimeGap) -> FeedingSetting {
    FeedingSetting::new(start, FeedLevel::new(kg).unwrap(), dispatch, gap)
}

fn positions(store: &SettingStore) -> Vec<usize> {
    store.settings().iter().map(FeedingSetting::position).collect()
}

#[test]
fn operator_session_then_controller_ack() {
    let mut store = SettingStore::new();
    store.add(setting("06:00", 20, DispatchGrams::G500, TimeGap::S180)).unwrap();
    store.add(setting("09:00", 15, DispatchGrams::G250, TimeGap::S240)).unwrap();
    store.add(setting("17:30", 30, DispatchGrams::G500, TimeGap::S300)).unwrap();

    // 20 kg / 500 g = 40 cycles * 180 s = 2 h, ends at 08:00
    let err = store.add(setting("07:45", 1, DispatchGrams::G500, TimeGap::S180)).unwrap_err();
    assert!(matches!(err, Error::Validation(ViolationKind::Overlap)));

    store.remove(2).unwrap();
    assert_eq!(positions(&store), [1, 2]);
    assert_eq!(store.get(2).unwrap().label(), "Setting 2");

    let payload = store.payload();
    assert_eq!(
        payload,
        "c0=212&as1=0600:1730&as2=0020:0030&as3=0200:0500&as4=0180:0300&as9=0500:0500&as10=0040:0060"
    );

    // Controller echoes the settings back with '|' separators and extra keys
    let ack = LastSettingResponse {
        sent_settings: payload.replace(':', "|") + "&a7=1",
        set_time_raw: Some("051225093015".into()),
    };
    let fallback = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let decoded = decode_last_setting(&ack, fallback);
    assert_eq!(decoded.accepted_at, timestamp::parse("051225093015").unwrap());

    let mut replica = SettingStore::new();
    replica.replace_all(decoded.settings);
    assert_eq!(replica.len(), 2);
    for (sent, back) in store.settings().iter().zip(replica.settings()) {
        assert!(sent.is_exact_duplicate_of(back));
        assert_eq!(sent.position(), back.position());
    }

    let today = NaiveDate::from_ymd_opt(2025, 12, 5).unwrap();
    let evening = replica.get(2).unwrap().metrics(today);
    assert_eq!(evening.cycles, 60);
    assert_eq!(evening.run_text, "5h 0m");
    assert_eq!(evening.end_time, "22:30");
    assert!(!evening.ends_next_day);
}

#[test]
fn capacity_holds_after_rejection() {
    let mut store = SettingStore::new();
    for hour in 0..10 {
        store
            .add(setting(&format!("{hour:02}:30"), 1, DispatchGrams::G500, TimeGap::S180))
            .unwrap();
    }
    assert!(matches!(
        store.add(setting("23:00", 1, DispatchGrams::G500, TimeGap::S180)),
        Err(Error::CapacityExceeded(10))
    ));
    assert_eq!(positions(&store), (1..=10).collect::<Vec<_>>());
}

#[test]
fn start_times_stay_unique() {
    let mut store = SettingStore::new();
    let candidates = ["06:00", "06:00", "6:00", "07:00", "07:00", "08:00"];
    for start in candidates {
        let _ = store.add(setting(start, 0, DispatchGrams::G250, TimeGap::S180));
    }
    let starts: Vec<_> = store.settings().iter().map(|s| s.start_time.as_str()).collect();
    for (i, a) in starts.iter().enumerate() {
        for b in &starts[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn long_single_run_keeps_every_digit() {
    let payload = encode_single(&setting("06:00", 500, DispatchGrams::G250, TimeGap::S180));
    assert_eq!(payload, "c0=212&as1=0600&as2=0500&as3=10000&as4=0180&as9=0250&as10=2000");
}

#[test]
fn partial_report_decodes_with_defaults() {
    let settings = decode("as1=0600|0800&as2=0500|0300", None);
    let summary: Vec<_> = settings
        .iter()
        .map(|s| (s.start_time.as_str(), s.feed_level.kg(), s.time_gap.seconds(), s.dispatch.grams()))
        .collect();
    assert_eq!(summary, [("06:00", 500, 180, 250), ("08:00", 300, 180, 250)]);
    assert!(decode("", None).is_empty());
}
