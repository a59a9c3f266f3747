//! Running and declaring trees from several threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use spectree::test_support::{declare_isolated, finished, run_recorded, run_tree};
use spectree::{before_all, describe, it};

#[test]
fn before_all_runs_once_when_a_tree_is_run_concurrently() {
    let setups = Arc::new(AtomicUsize::new(0));
    let behaviors = Arc::new(AtomicUsize::new(0));
    let setup_counter = Arc::clone(&setups);
    let behavior_counter = Arc::clone(&behaviors);

    let tree = declare_isolated(move || {
        describe("shared fixture", || {
            before_all(move || {
                setup_counter.fetch_add(1, Ordering::SeqCst);
            });
            for n in 1..=5 {
                let counter = Arc::clone(&behavior_counter);
                it(&format!("uses it {n}"), move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    });

    let logs: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2).map(|_| scope.spawn(|| run_tree(&tree))).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });

    assert_eq!(setups.load(Ordering::SeqCst), 1);
    assert_eq!(behaviors.load(Ordering::SeqCst), 10);
    for log in &logs {
        assert_eq!(finished(log).len(), 5);
    }
}

#[test]
fn sequential_runs_share_the_before_all_outcome() {
    let setups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&setups);
    let tree = declare_isolated(move || {
        before_all(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        for n in 1..=5 {
            it(&format!("spec {n}"), || {});
        }
    });

    let log = run_tree(&tree);
    assert_eq!(finished(&log).len(), 5);
    run_tree(&tree);
    assert_eq!(setups.load(Ordering::SeqCst), 1);
}

#[test]
fn threads_declare_independent_trees() {
    let handles: Vec<_> = (0..4)
        .map(|n| {
            thread::spawn(move || {
                let log = run_recorded(|| {
                    for i in 0..=n {
                        it(&format!("spec {i}"), || {});
                    }
                });
                log.summary().passed
            })
        })
        .collect();

    let passed: Vec<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();
    assert_eq!(passed, vec![1, 2, 3, 4]);
}

#[test]
fn spec_body_can_declare_and_run_its_own_tree() {
    let log = run_recorded(|| {
        it("runs a nested tree", || -> anyhow::Result<()> {
            let nested = run_recorded(|| {
                it("inner", || {});
            });
            anyhow::ensure!(nested.summary().passed == 1, "nested tree did not pass");
            Ok(())
        });
    });
    assert_eq!(finished(&log), vec!["runs a nested tree"]);
}
