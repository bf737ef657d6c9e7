use crate::*;
use proxtrace_peer_table::PeerTable;
use proxtrace_primitives::{PeerId, Rssi};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// Arbitrary epoch so that relative t=0 is a real timestamp.
const T0: u64 = 1_717_000_000;

fn peer(name: &str) -> PeerId {
    name.parse().unwrap()
}

fn observe(name: &str, rssi: Rssi, t: u64) -> Observation {
    Observation::new(peer(name), rssi, T0 + t)
}

fn evaluator() -> ExposureEvaluator {
    ExposureEvaluator::new(ExposureConfig {
        close_contact_rssi_threshold: -60,
        exposure_time_threshold_secs: 300,
    })
}

/// Sum of closed runs of close samples, each run lasting from its first close
/// sample to the next far sample.
fn reference_accumulated(samples: &[(u64, Rssi)], threshold: Rssi) -> u64 {
    let mut total = 0;
    let mut start = None;
    for &(t, rssi) in samples {
        match (start, rssi >= threshold) {
            (None, true) => start = Some(t),
            (Some(s), false) => {
                total += t - s;
                start = None;
            }
            _ => {}
        }
    }
    total
}

#[test]
fn test_reference_scenario() {
    let eval = evaluator();
    let mut table = PeerTable::new(10);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -55, 0));
    assert_eq!(m.admission, Admission::Inserted);
    assert_eq!(m.transition, SessionTransition::Opened);
    assert_eq!(m.close_contact_secs, 0);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -80, 200));
    assert_eq!(m.transition, SessionTransition::Closed { added_secs: 200 });
    assert_eq!(m.close_contact_accumulated_secs, 200);
    assert_eq!(m.close_contact_secs, 200);
    assert_eq!(m.total_contact_secs, 200);
    assert_eq!(m.exposure_status, ExposureStatus::Normal);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -55, 350));
    assert_eq!(m.transition, SessionTransition::Opened);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -80, 400));
    assert_eq!(m.close_contact_accumulated_secs, 250);
    assert_eq!(m.exposure_status, ExposureStatus::Normal);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -80, 460));
    assert_eq!(m.transition, SessionTransition::Unchanged);
    assert_eq!(m.close_contact_accumulated_secs, 250);
    assert_eq!(m.close_contact_secs, 250);

    let m = eval.evaluate(&mut table, &observe("AA:BB", -55, 500));
    assert_eq!(m.transition, SessionTransition::Opened);
    assert_eq!(m.close_contact_secs, 250);

    let q = eval.query(&table, &peer("AA:BB"), T0 + 560).unwrap();
    assert_eq!(q.close_contact_accumulated_secs, 250);
    assert_eq!(q.close_contact_secs, 310);
    assert_eq!(q.total_contact_secs, 560);
    assert_eq!(q.exposure_status, ExposureStatus::Exposure);
}

#[test]
fn test_repeated_close_does_not_restamp_session() {
    let eval = evaluator();
    let mut table = PeerTable::new(10);

    eval.evaluate(&mut table, &observe("AA:BB", -50, 10));
    let m = eval.evaluate(&mut table, &observe("AA:BB", -40, 70));
    assert_eq!(m.transition, SessionTransition::Unchanged);
    assert_eq!(table.find(&peer("AA:BB")).unwrap().close_session_start(), Some(T0 + 10));
    assert_eq!(m.close_contact_secs, 60);
    assert_eq!(m.close_contact_accumulated_secs, 0);
}

#[test]
fn test_threshold_bounds_are_inclusive() {
    let eval = evaluator();
    assert!(eval.is_close(-60));
    assert!(!eval.is_close(-61));
    assert!(eval.is_exposure_event(300));
    assert!(!eval.is_exposure_event(299));
}

#[test]
fn test_far_peer_never_exposed() {
    let eval = evaluator();
    let mut table = PeerTable::new(10);

    for t in (0..5_000).step_by(15) {
        let m = eval.evaluate(&mut table, &observe("CC:DD", -85, t));
        assert_eq!(m.close_contact_secs, 0);
        assert_eq!(m.exposure_status, ExposureStatus::Normal);
    }
    assert!(!table.find(&peer("CC:DD")).unwrap().in_close_session());
}

#[test]
fn test_full_table_peer_is_invisible() {
    let eval = evaluator();
    let mut table = PeerTable::new(2);
    eval.evaluate(&mut table, &observe("P1", -50, 0));
    eval.evaluate(&mut table, &observe("P2", -80, 0));
    let snapshot = table.clone();

    for t in [10, 400, 900] {
        let m = eval.evaluate(&mut table, &observe("P3", -30, t));
        assert_eq!(m, ContactMetrics::untracked(Admission::TableFull));
        assert!(!m.is_tracked());
    }
    assert_eq!(table, snapshot);
    assert!(eval.query(&table, &peer("P3"), T0 + 900).is_none());
}

#[test]
fn test_unknown_time_leaves_table_untouched() {
    let eval = evaluator();
    let mut table = PeerTable::new(4);

    let m = eval.evaluate(&mut table, &Observation::new(peer("AA:BB"), -40, 0));
    assert_eq!(m.admission, Admission::UnknownTime);
    assert!(table.is_empty());
}

#[test]
fn test_exposure_is_sticky() {
    let eval = evaluator();
    let mut table = PeerTable::new(4);

    eval.evaluate(&mut table, &observe("AA:BB", -50, 0));
    let m = eval.evaluate(&mut table, &observe("AA:BB", -90, 301));
    assert_eq!(m.exposure_status, ExposureStatus::Exposure);

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut t = 301;
    for _ in 0..200 {
        t += rng.gen_range(1..120);
        let m = eval.evaluate(&mut table, &observe("AA:BB", rng.gen_range(-95..-30), t));
        assert_eq!(m.exposure_status, ExposureStatus::Exposure);
    }
}

#[test]
fn test_accumulated_matches_closed_runs() {
    let eval = evaluator();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for _ in 0..50 {
        let mut table = PeerTable::new(1);
        let mut samples = Vec::new();
        let mut t = 0u64;
        let mut last_accumulated = 0;

        for _ in 0..rng.gen_range(1..40) {
            t += rng.gen_range(1..90);
            let rssi: Rssi = rng.gen_range(-95..-35);
            samples.push((t, rssi));

            let m = eval.evaluate(&mut table, &observe("AA:BB", rssi, t));
            assert!(m.close_contact_accumulated_secs >= last_accumulated);
            assert!(m.close_contact_secs >= m.close_contact_accumulated_secs);
            last_accumulated = m.close_contact_accumulated_secs;
        }

        let entry = table.find(&peer("AA:BB")).unwrap();
        assert_eq!(entry.close_contact_accumulated(), reference_accumulated(&samples, -60));

        // A trailing open session shows up only in the live total.
        let (last_t, _) = samples[samples.len() - 1];
        let ongoing = entry
            .close_session_start()
            .map(|start| T0 + last_t - start)
            .unwrap_or(0);
        let live = eval.query(&table, &peer("AA:BB"), T0 + last_t).unwrap();
        assert_eq!(live.close_contact_secs, entry.close_contact_accumulated() + ongoing);
    }
}

#[test]
fn test_peers_accounted_independently() {
    let eval = evaluator();
    let mut table = PeerTable::new(10);

    eval.evaluate(&mut table, &observe("AA", -50, 0));
    eval.evaluate(&mut table, &observe("BB", -80, 0));
    eval.evaluate(&mut table, &observe("BB", -50, 100));
    eval.evaluate(&mut table, &observe("AA", -80, 120));
    eval.evaluate(&mut table, &observe("BB", -80, 130));

    assert_eq!(table.find(&peer("AA")).unwrap().close_contact_accumulated(), 120);
    assert_eq!(table.find(&peer("BB")).unwrap().close_contact_accumulated(), 30);
}
