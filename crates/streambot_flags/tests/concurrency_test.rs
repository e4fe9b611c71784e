//! Concurrent access from many modules on one file.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use streambot_flags::{FeatureFlag, ManagerRegistry, PermissionLevel, StoreSettings};

const THREADS: usize = 8;
const INCREMENTS: usize = 25;

fn registry() -> ManagerRegistry {
    ManagerRegistry::new(StoreSettings::default().with_watch(false).with_debounce_ms(0))
}

fn watched_registry() -> ManagerRegistry {
    ManagerRegistry::new(StoreSettings::default().with_debounce_ms(0))
}

#[test]
fn test_concurrent_increments_stay_consistent() {
    let dir = tempfile::tempdir().expect("Temp dir");
    let path = dir.path().join("flags.json");
    let registry = registry();
    let counter = FeatureFlag::new("counter").expect("Valid flag name");

    registry
        .open(&path, "owner")
        .declare(&counter, PermissionLevel::ReadWrite, 0, "Shared counter")
        .expect("Declare");

    let errors = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for worker in 0..THREADS {
            let manager = registry.open(&path, &format!("worker_{worker}"));
            let counter = &counter;
            let errors = &errors;
            scope.spawn(move || {
                if manager.use_flag(counter).is_err() {
                    errors.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                for _ in 0..INCREMENTS {
                    let next = manager
                        .get_int(counter, 0)
                        .map(|v| v + 1)
                        .and_then(|v| manager.set(counter, v));
                    if next.is_err() {
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    let owner = registry.open(&path, "owner");
    let total = owner.get_int(&counter, 0).expect("Read") as usize;
    assert!(
        (INCREMENTS..=THREADS * INCREMENTS).contains(&total),
        "Counter out of range: {total}"
    );

    // What is on disk matches what is in memory.
    let fresh = ManagerRegistry::new(StoreSettings::default().with_watch(false));
    let reader = fresh.open(&path, "reader");
    reader.use_flag(&counter).expect("Use");
    assert_eq!(reader.get_int(&counter, 0).expect("Read") as usize, total);
}

#[test]
fn test_single_writer_updates_survive_watcher_reloads() {
    const ROUNDS: i64 = 100;

    let dir = tempfile::tempdir().expect("Temp dir");
    let path = dir.path().join("flags.json");
    let registry = watched_registry();

    std::thread::scope(|scope| {
        for worker in 0..THREADS {
            let manager = registry.open(&path, &format!("writer_{worker}"));
            assert!(manager.store().is_watching());
            scope.spawn(move || {
                let flag = FeatureFlag::new(format!("counter_{worker}")).expect("Valid flag name");
                manager
                    .declare(&flag, PermissionLevel::ReadOnly, 0, "Per-writer counter")
                    .expect("Declare");
                for _ in 0..ROUNDS {
                    let next = manager.get_int(&flag, 0).expect("Read") + 1;
                    manager.set(&flag, next).expect("Set");
                }
            });
        }
    });

    let reader = registry.open(&path, "reader");
    for worker in 0..THREADS {
        let flag = FeatureFlag::new(format!("counter_{worker}")).expect("Valid flag name");
        reader.use_flag(&flag).expect("Use");
        assert_eq!(reader.get_int(&flag, 0).expect("Read"), ROUNDS, "{flag} lost updates");
    }

    let fresh = self::registry();
    let on_disk = fresh.open(&path, "reader");
    for worker in 0..THREADS {
        let flag = FeatureFlag::new(format!("counter_{worker}")).expect("Valid flag name");
        on_disk.use_flag(&flag).expect("Use");
        assert_eq!(on_disk.get_int(&flag, 0).expect("Read"), ROUNDS);
    }
}

#[test]
fn test_concurrent_declares_have_one_owner() {
    let dir = tempfile::tempdir().expect("Temp dir");
    let path = dir.path().join("flags.json");
    let registry = registry();
    let contested = FeatureFlag::new("contested").expect("Valid flag name");

    let winners = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for module in 0..THREADS {
            let manager = registry.open(&path, &format!("module_{module}"));
            let contested = &contested;
            let winners = &winners;
            scope.spawn(move || {
                if manager
                    .declare(contested, PermissionLevel::ReadOnly, module as i64, "")
                    .is_ok()
                {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    let ownership = registry.open(&path, "observer").ownership_info();
    assert_eq!(ownership.len(), 1);
}

#[test]
fn test_managers_are_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<streambot_flags::FeatureFlagManager>();
    assert_send_sync::<streambot_flags::SharedFlagStore>();
    assert_send_sync::<ManagerRegistry>();

    let dir = tempfile::tempdir().expect("Temp dir");
    let registry = Arc::new(registry());
    let path = dir.path().join("flags.json");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let path = path.clone();
            std::thread::spawn(move || registry.open(&path, "shared"))
        })
        .collect();
    let managers: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread"))
        .collect();
    assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
    assert_eq!(registry.manager_count(), 1);
}
