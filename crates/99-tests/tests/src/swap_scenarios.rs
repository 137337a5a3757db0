//! The concrete end-to-end scenarios of the swap protocol: fresh load,
//! double publication, canary tamper, loader race, a reader holding its
//! snapshot across a swap, and the layout version guard.

use crate::fixtures::{self, ScenarioNamespace};
use dataset_layout::{BlockId, DatasetLayout, LayoutError, SlotId, CANARY_LEN};
use datastore::Store;
use query_facade::{FacadeError, SharedDataset};
use shm_barrier::RegistryView;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn registry_timestamp(scenario: &ScenarioNamespace) -> Option<u32> {
    RegistryView::open(scenario.namespace())
        .expect("probe registry")
        .map(|view| view.record().timestamp)
}

fn wait_for_timestamp(scenario: &ScenarioNamespace, expected: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry_timestamp(scenario) != Some(expected) {
        assert!(
            Instant::now() < deadline,
            "registry never reached timestamp {expected}"
        );
        thread::yield_now();
    }
}

/// S1: loader runs against an empty namespace; a reader attaches and every
/// typed block view resolves.
#[test]
fn fresh_load_serves_every_block() {
    let scenario = ScenarioNamespace::new("fresh");
    let fixture = fixtures::small(1);

    let report = Store::new(scenario.namespace().clone(), fixture.paths.clone())
        .run()
        .expect("first publication");
    assert_eq!(report.slot, SlotId::A);
    assert_eq!(report.timestamp, 1);
    assert_eq!(report.reclaimed, None);

    let record = RegistryView::open(scenario.namespace())
        .expect("open registry")
        .expect("registry exists")
        .record();
    assert_eq!(record.active_slot().expect("consistent"), Some(SlotId::A));
    assert_eq!(record.timestamp, 1);

    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    let snapshot = reader.begin_query().expect("query");
    let facade = snapshot.facade();

    assert_eq!(facade.graph_nodes().expect("nodes").len(), 3);
    assert_eq!(facade.graph_edges().expect("edges").len(), 3);
    assert_eq!(facade.coordinates().expect("coords").len(), 3);
    assert_eq!(facade.via_nodes().expect("via").len(), 3);
    assert_eq!(facade.name_ids().expect("name ids").len(), 3);
    assert_eq!(facade.turn_instructions().expect("turns").len(), 3);
    assert_eq!(facade.travel_modes().expect("modes").len(), 3);
    assert_eq!(facade.search_tree().expect("tree").len(), 1);
    assert_eq!(facade.geometry_index().expect("geo index").len(), 2);
    assert_eq!(facade.geometry_list().expect("geo list").len(), 3);
    assert_eq!(facade.hsgr_checksum().expect("checksum"), fixture.checksum);
    assert_eq!(facade.timestamp_text().expect("stamp"), "load-1");
    assert_eq!(
        facade.leaf_index_path().expect("leaf path"),
        fixture.paths.leaf_index
    );
    assert_eq!(facade.is_core_node(0).expect("core"), Some(true));
    assert_eq!(facade.is_core_node(1).expect("core"), Some(false));
    assert_eq!(
        facade.street_name(0).expect("name"),
        Some("High".to_owned())
    );
    assert_eq!(
        facade.street_name(1).expect("name"),
        Some("Street".to_owned())
    );

    drop(snapshot);
    assert_eq!(reader.barrier().in_flight_queries().expect("count"), 0);
}

/// S2: a second publication flips to slot B, the reader re-attaches on its
/// next request, and slot A's regions are gone afterwards.
#[test]
fn double_publication_hops_the_reader_forward() {
    let scenario = ScenarioNamespace::new("double");
    let first = fixtures::small(1);
    let second = fixtures::small(2);

    Store::new(scenario.namespace().clone(), first.paths.clone())
        .run()
        .expect("first publication");

    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    {
        let snapshot = reader.begin_query().expect("query against A");
        assert_eq!(snapshot.slot(), SlotId::A);
        assert_eq!(snapshot.facade().timestamp_text().expect("stamp"), "load-1");
    }

    let report = Store::new(scenario.namespace().clone(), second.paths.clone())
        .run()
        .expect("second publication");
    assert_eq!(report.slot, SlotId::B);
    assert_eq!(report.timestamp, 2);
    assert_eq!(report.reclaimed, Some(SlotId::A));

    assert!(!shm_region::exists(
        &scenario.namespace().layout_region(SlotId::A)
    ));
    assert!(!shm_region::exists(
        &scenario.namespace().data_region(SlotId::A)
    ));

    let snapshot = reader.begin_query().expect("query against B");
    assert_eq!(snapshot.slot(), SlotId::B);
    assert_eq!(snapshot.timestamp(), 2);
    assert_eq!(snapshot.facade().timestamp_text().expect("stamp"), "load-2");
}

/// Property 4 over several runs: the timestamp strictly increases and the
/// active slot alternates.
#[test]
fn publications_alternate_slots_with_monotone_timestamps() {
    let scenario = ScenarioNamespace::new("monotone");

    let mut expected_slot = SlotId::A;
    for expected_ts in 1..=5u32 {
        let fixture = fixtures::small(expected_ts as i32);
        let report = Store::new(scenario.namespace().clone(), fixture.paths.clone())
            .run()
            .expect("publication");
        assert_eq!(report.timestamp, expected_ts);
        assert_eq!(report.slot, expected_slot);
        expected_slot = expected_slot.other();
    }
}

/// S3: a flipped canary byte fails exactly that dataset's queries with a
/// typed error; the reader process stays healthy.
#[test]
fn canary_tamper_is_detected_not_fatal() {
    let scenario = ScenarioNamespace::new("tamper");
    let fixture = fixtures::small(1);
    Store::new(scenario.namespace().clone(), fixture.paths.clone())
        .run()
        .expect("publication");

    let layout_region = shm_region::attach_read(&scenario.namespace().layout_region(SlotId::A))
        .expect("attach layout");
    let layout = DatasetLayout::read_from(layout_region.as_slice()).expect("parse layout");
    let offset = layout.block_offset(BlockId::GraphEdgeList) as usize;

    let mut data = shm_region::attach_write(&scenario.namespace().data_region(SlotId::A))
        .expect("attach data");
    data.as_mut_slice()[offset - CANARY_LEN] ^= 0xFF;
    drop(data);

    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    match reader.begin_query() {
        Err(FacadeError::Corrupt(LayoutError::CorruptStartCanary(block))) => {
            assert_eq!(block, BlockId::GraphEdgeList);
        }
        other => panic!("expected corrupt start canary, got {other:?}"),
    }
    assert_eq!(reader.barrier().in_flight_queries().expect("count"), 0);

    // The next publication clears the failure.
    let fresh = fixtures::small(2);
    Store::new(scenario.namespace().clone(), fresh.paths.clone())
        .run()
        .expect("republication");
    let snapshot = reader.begin_query().expect("recovered query");
    assert_eq!(snapshot.facade().timestamp_text().expect("stamp"), "load-2");
}

/// S4: two loaders racing from the same starting state both succeed, the
/// publication sequence serializes, and only the final slot survives.
#[test]
fn racing_loaders_serialize() {
    let scenario = ScenarioNamespace::new("race");
    let initial = fixtures::small(1);
    Store::new(scenario.namespace().clone(), initial.paths.clone())
        .run()
        .expect("initial publication");

    let mut racers = Vec::new();
    for marker in [2, 3] {
        let namespace = scenario.namespace().clone();
        racers.push(thread::spawn(move || {
            let fixture = fixtures::small(marker);
            let report = Store::new(namespace, fixture.paths.clone())
                .run()
                .expect("racing publication");
            (marker, report)
        }));
    }
    let outcomes: Vec<_> = racers
        .into_iter()
        .map(|racer| racer.join().expect("racer thread"))
        .collect();

    let timestamps: Vec<u32> = outcomes.iter().map(|(_, report)| report.timestamp).collect();
    assert!(timestamps.contains(&2) && timestamps.contains(&3));

    let record = RegistryView::open(scenario.namespace())
        .expect("open registry")
        .expect("registry exists")
        .record();
    assert_eq!(record.timestamp, 3);
    // Publications from the S1 state go B then A, regardless of which racer
    // wins the pending-update mutex.
    assert_eq!(record.active_slot().expect("consistent"), Some(SlotId::A));
    assert!(!shm_region::exists(
        &scenario.namespace().data_region(SlotId::B)
    ));

    // The surviving dataset is the one the final publisher wrote, intact.
    let (final_marker, _) = outcomes
        .iter()
        .find(|(_, report)| report.timestamp == 3)
        .expect("final publication");
    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    let snapshot = reader.begin_query().expect("query");
    assert_eq!(snapshot.timestamp(), 3);
    assert_eq!(
        snapshot.facade().timestamp_text().expect("stamp"),
        format!("load-{final_marker}")
    );
}

/// S5: reclamation blocks until the reader holding a snapshot of the old
/// slot finishes its request; only then is the old data region removed.
#[test]
fn reclaim_waits_for_the_in_flight_reader() {
    let scenario = ScenarioNamespace::new("drain");
    let first = fixtures::small(1);
    Store::new(scenario.namespace().clone(), first.paths.clone())
        .run()
        .expect("first publication");

    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    let snapshot = reader.begin_query().expect("long-running query");
    assert_eq!(snapshot.slot(), SlotId::A);

    let loader_done = Arc::new(AtomicBool::new(false));
    let loader = {
        let namespace = scenario.namespace().clone();
        let loader_done = Arc::clone(&loader_done);
        thread::spawn(move || {
            let second = fixtures::small(2);
            let report = Store::new(namespace, second.paths.clone())
                .run()
                .expect("second publication");
            loader_done.store(true, Ordering::SeqCst);
            report
        })
    };

    // The swap becomes visible while the query is still running…
    wait_for_timestamp(&scenario, 2);
    thread::sleep(Duration::from_millis(100));
    // …but reclamation cannot finish, and slot A stays mapped and readable.
    assert!(!loader_done.load(Ordering::SeqCst), "reclaim did not wait");
    assert!(shm_region::exists(
        &scenario.namespace().data_region(SlotId::A)
    ));
    assert_eq!(snapshot.slot(), SlotId::A);
    assert_eq!(snapshot.facade().timestamp_text().expect("stamp"), "load-1");

    drop(snapshot);
    let report = loader.join().expect("loader thread");
    assert_eq!(report.reclaimed, Some(SlotId::A));
    assert!(!shm_region::exists(
        &scenario.namespace().data_region(SlotId::A)
    ));

    let snapshot = reader.begin_query().expect("query after swap");
    assert_eq!(snapshot.slot(), SlotId::B);
}

/// S6: a layout region with an unknown format version is refused and the
/// query counter stays consistent.
#[test]
fn unknown_layout_version_is_refused() {
    let scenario = ScenarioNamespace::new("version");
    let fixture = fixtures::small(1);
    Store::new(scenario.namespace().clone(), fixture.paths.clone())
        .run()
        .expect("publication");

    let mut layout_region = shm_region::attach_write(&scenario.namespace().layout_region(SlotId::A))
        .expect("attach layout");
    layout_region.as_mut_slice()[0] = 0x2A;
    drop(layout_region);

    let reader = SharedDataset::open(scenario.namespace().clone()).expect("open reader");
    match reader.begin_query() {
        Err(FacadeError::Corrupt(LayoutError::IncompatibleVersion { found })) => {
            assert_eq!(found, 0x2A);
        }
        other => panic!("expected version rejection, got {other:?}"),
    }
    assert_eq!(reader.barrier().in_flight_queries().expect("count"), 0);
}

/// Readers hammering queries while a loader republishes never observe a
/// torn dataset: every snapshot is wholly old or wholly new.
#[test]
fn concurrent_queries_see_whole_datasets_across_swaps() {
    let scenario = ScenarioNamespace::new("churn");
    let initial = fixtures::small(1);
    Store::new(scenario.namespace().clone(), initial.paths.clone())
        .run()
        .expect("initial publication");

    let reader = Arc::new(SharedDataset::open(scenario.namespace().clone()).expect("open reader"));
    let stop = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let reader = Arc::clone(&reader);
        let stop = Arc::clone(&stop);
        workers.push(thread::spawn(move || {
            let mut observed = 0u32;
            while !stop.load(Ordering::SeqCst) {
                let snapshot = reader.begin_query().expect("query");
                let stamp = snapshot.facade().timestamp_text().expect("stamp");
                let checksum = snapshot.facade().hsgr_checksum().expect("checksum");
                // The timestamp text and the snapshot's registry timestamp
                // must describe the same publication.
                assert_eq!(stamp, format!("load-{}", snapshot.timestamp()));
                assert_ne!(checksum, 0);
                observed = observed.max(snapshot.timestamp());
                drop(snapshot);
                // Leave gaps so reclamation's drain wait can observe zero.
                thread::sleep(Duration::from_micros(200));
            }
            observed
        }));
    }

    for marker in 2..=4i32 {
        let fixture = fixtures::small(marker);
        Store::new(scenario.namespace().clone(), fixture.paths.clone())
            .run()
            .expect("republication");
    }

    stop.store(true, Ordering::SeqCst);
    for worker in workers {
        let observed = worker.join().expect("worker");
        assert!(observed >= 1);
    }
    assert_eq!(reader.barrier().in_flight_queries().expect("count"), 0);
}
