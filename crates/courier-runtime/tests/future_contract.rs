//! Cross-thread contract tests for the future/promise cell.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use courier_runtime::error::{failure, Fault};
use courier_runtime::{promise, wait_all, FutureError, Promise};

#[derive(Debug, Clone)]
enum SetAttempt {
    Value(i64),
    Error(String),
}

fn attempt_strategy() -> impl Strategy<Value = SetAttempt> {
    prop_oneof![
        any::<i64>().prop_map(SetAttempt::Value),
        "[a-z]{1,12}".prop_map(SetAttempt::Error),
    ]
}

proptest! {
    // Exactly one of any sequence of set attempts succeeds; all later ones
    // report ValueAlreadySet.
    #[test]
    fn single_assignment_holds_for_any_attempt_sequence(
        attempts in proptest::collection::vec(attempt_strategy(), 1..8)
    ) {
        let p = promise::<i64>();
        let mut successes = 0;
        for attempt in &attempts {
            let outcome = match attempt {
                SetAttempt::Value(v) => p.set_value(*v),
                SetAttempt::Error(msg) => p.set_error(failure(Fault::new().with(msg))),
            };
            match outcome {
                Ok(()) => successes += 1,
                Err(e) => prop_assert_eq!(e, FutureError::ValueAlreadySet),
            }
        }
        prop_assert_eq!(successes, 1);

        // the first attempt is the one that stuck
        match &attempts[0] {
            SetAttempt::Value(v) => {
                prop_assert_eq!(p.future().get(Duration::ZERO).map_err(|e| e.to_string()), Ok(*v));
            }
            SetAttempt::Error(msg) => {
                let err = p.future().try_rethrow().expect_err("error stored");
                prop_assert!(err.to_string().contains(msg.as_str()));
            }
        }
    }

    // try_set_* never reports success twice either.
    #[test]
    fn try_setters_agree_with_setters(first in any::<i64>(), second in any::<i64>()) {
        let p = promise::<i64>();
        prop_assert!(p.try_set_value(first));
        prop_assert!(!p.try_set_value(second));
        prop_assert!(!p.try_set_error(failure(Fault::new().with("late"))));
        prop_assert_eq!(p.future().get(Duration::ZERO).map_err(|e| e.to_string()), Ok(first));
    }
}

// Racing producers: exactly one of N concurrent setters wins.
#[test]
fn concurrent_setters_single_winner() {
    const SETTERS: usize = 8;

    for _ in 0..50 {
        let p = Arc::new(promise::<usize>());
        let barrier = Arc::new(std::sync::Barrier::new(SETTERS));
        let mut handles = Vec::new();
        for i in 0..SETTERS {
            let p = Arc::clone(&p);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                usize::from(p.try_set_value(i))
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().expect("setter panicked"))
            .sum();
        assert_eq!(wins, 1);
        assert!(p.has_value());
    }
}

// wait_all across real threads: one failure plus two successes resolve
// the composite with the failure.
#[test]
fn wait_all_across_threads() {
    let ps: Vec<Promise<()>> = (0..3).map(|_| promise()).collect();
    let composite = wait_all(&ps.iter().map(Promise::future).collect::<Vec<_>>());

    let mut handles = Vec::new();
    for (i, p) in ps.into_iter().enumerate() {
        handles.push(std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10 * (i as u64 + 1)));
            if i == 1 {
                p.set_error(failure(Fault::new().with("worker 1 failed")))
                    .expect("set error");
            } else {
                p.set_value(()).expect("set value");
            }
        }));
    }
    for h in handles {
        h.join().expect("producer panicked");
    }

    assert!(composite.wait_timeout(Duration::from_secs(5)));
    let err = composite.try_rethrow().expect_err("failure propagates");
    assert!(err.to_string().contains("worker 1 failed"));
}
