mod common;

use std::thread;

use common::{container, item, retrieve, service, stow};

use stowage_cargo::overlaps;
use stowage_core::Entity;
use stowage_engine::dto::{LogsRequest, SimulateRequest};
use stowage_ledger::ActionType;

const THREADS: usize = 8;
const PER_THREAD: usize = 6;

fn item_id(t: usize, n: usize) -> String {
    format!("t{t}-{n}")
}

fn loaded_service() -> stowage_engine::CargoService {
    let svc = service();
    for c in ["A", "B", "C", "D"] {
        svc.register_container(container(c, "Lab", 40.0, 40.0, 40.0))
            .unwrap();
    }
    for t in 0..THREADS {
        for n in 0..PER_THREAD {
            let priority = (10 + t * 10 + n) as u8;
            svc.register_item(item(&item_id(t, n), 10.0, 10.0, 10.0, priority, "Lab"))
                .unwrap();
        }
    }
    svc
}

#[test]
fn parallel_stows_never_overlap() {
    let svc = loaded_service();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let svc = &svc;
            scope.spawn(move || {
                for n in 0..PER_THREAD {
                    stow(svc, &item_id(t, n)).unwrap();
                }
            });
        }
    });

    let store = svc.snapshot().unwrap();
    store.verify().unwrap();
    let mut claims = 0;
    for c in store.containers() {
        let boxes: Vec<_> = c.claims().map(|(_, b)| *b).collect();
        claims += boxes.len();
        for (i, a) in boxes.iter().enumerate() {
            assert!(a.within(&c.dimensions()), "claim outside {}", c.id());
            for b in &boxes[i + 1..] {
                assert!(!overlaps(a, b), "overlap in container {}", c.id());
            }
        }
    }
    assert_eq!(claims, THREADS * PER_THREAD);
    let placements = svc
        .logs(LogsRequest {
            action_type: Some(ActionType::Placement),
            ..LogsRequest::default()
        })
        .unwrap()
        .logs;
    assert_eq!(placements.len(), THREADS * PER_THREAD);
    let mut sequences: Vec<u64> = placements.iter().map(|e| e.sequence).collect();
    sequences.dedup();
    assert_eq!(sequences.len(), placements.len());
}

#[test]
fn retrievals_run_alongside_day_advances() {
    let svc = loaded_service();
    for t in 0..THREADS {
        for n in 0..PER_THREAD {
            stow(&svc, &item_id(t, n)).unwrap();
        }
    }

    thread::scope(|scope| {
        for t in 0..THREADS {
            let svc = &svc;
            scope.spawn(move || {
                for n in 0..PER_THREAD {
                    retrieve(svc, &item_id(t, n)).unwrap();
                }
            });
        }
        let svc = &svc;
        scope.spawn(move || {
            for _ in 0..3 {
                svc.simulate(SimulateRequest::days(1)).unwrap();
            }
        });
    });

    let store = svc.snapshot().unwrap();
    store.verify().unwrap();
    assert_eq!(store.today(), common::day(3));
    assert!(store.containers().all(|c| c.claim_count() == 0));
    assert!(store.items().all(|i| !i.is_stowed()));
}

#[test]
fn undocking_completes_while_manifests_are_rebuilt() {
    use stowage_core::{ContainerId, ItemId};
    use stowage_engine::dto::{ReturnPlanRequest, UndockingRequest};

    let svc = service();
    for c in ["A", "B", "C", "D"] {
        svc.register_container(container(c, "Storage", 40.0, 40.0, 40.0))
            .unwrap();
    }
    svc.register_container(container("U", "Airlock", 80.0, 80.0, 80.0))
        .unwrap();
    for n in 0..12 {
        let id = format!("w{n:02}");
        let mut spec = item(&id, 10.0, 10.0, 10.0, 10, "Storage");
        spec.expiry_date = Some(common::day(1));
        svc.register_item(spec).unwrap();
        stow(&svc, &id).unwrap();
    }
    svc.simulate(SimulateRequest::days(1)).unwrap();

    let plan = |budget: f64| ReturnPlanRequest {
        undocking_container_id: ContainerId::from("U"),
        undocking_date: common::day(5),
        max_weight: budget,
        user_id: None,
    };
    svc.return_plan(plan(4.0)).unwrap();

    thread::scope(|scope| {
        for t in 0..4 {
            let svc = &svc;
            scope.spawn(move || {
                for round in 0..10 {
                    svc.return_plan(plan((2 + (t + round) % 10) as f64)).unwrap();
                }
            });
        }
        let svc = &svc;
        scope.spawn(move || {
            let done = svc
                .complete_undocking(UndockingRequest {
                    undocking_container_id: ContainerId::from("U"),
                    timestamp: common::at(),
                    user_id: None,
                })
                .unwrap();
            assert!(done.items_removed > 0);
        });
    });

    let store = svc.snapshot().unwrap();
    store.verify().unwrap();
    let removed = (0..12)
        .map(|n| ItemId::from(format!("w{n:02}")))
        .filter(|id| store.claim_location(id).is_none())
        .count();
    assert!(removed > 0);
    for c in store.containers() {
        for (id, _) in c.claims() {
            assert!(store.item(id).unwrap().waste_reason().is_some());
        }
    }
}
