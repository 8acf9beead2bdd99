use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sync_promise::{BoxError, Promise};

#[test]
fn test_is_complete() {
    let promise = Promise::<String>::new();
    assert!(!promise.is_complete());
    promise.complete(vec![]);
    assert!(promise.is_complete());
    assert!(promise.is_complete());
}

#[test]
fn test_complete_unblocks_waiters() {
    let promise = Promise::<String>::new();
    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let promise = promise.clone();
            thread::spawn(move || promise.wait())
        })
        .collect();

    let completer = {
        let promise = promise.clone();
        thread::spawn(move || promise.complete(vec![]))
    };
    completer.join().expect("The completer thread has panicked");

    for task in tasks {
        let errors = task.join().expect("The waiter thread has panicked");
        assert!(errors.is_empty());
    }
}

#[test]
fn test_and_then_deferred_until_complete() {
    let promise = Promise::<String>::new();
    let ran = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel();

    let flag = ran.clone();
    promise.and_then(move |errors| {
        flag.store(true, Ordering::SeqCst);
        tx.send(errors).expect("receiver dropped");
    });

    thread::sleep(Duration::from_millis(20));
    assert!(!ran.load(Ordering::SeqCst));

    promise.complete(vec!["timeout".into()]);
    let errors = rx.recv().expect("callback never ran");
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(*errors, vec!["timeout".to_string()]);
}

#[test]
fn test_and_then_after_complete() {
    let promise = Promise::<String>::new();
    promise.complete(vec!["a".into(), "b".into()]);

    let (tx, rx) = channel();
    promise.and_then(move |errors| tx.send(errors).expect("receiver dropped"));
    let errors = rx.recv().expect("callback never ran");
    assert!(Arc::ptr_eq(&errors, &promise.wait()));
}

#[test]
fn test_and_then_does_not_block_on_callback() {
    let promise = Promise::<String>::new();
    promise.complete(vec![]);

    let (release_tx, release_rx) = channel::<()>();
    let (done_tx, done_rx) = channel();
    promise.and_then(move |_| {
        release_rx.recv().ok();
        done_tx.send(()).expect("receiver dropped");
    });
    // The callback is still parked on `release_rx`, so we got here without it.
    release_tx.send(()).expect("callback dropped its receiver");
    done_rx.recv().expect("callback never ran");
}

#[test]
fn test_complete_does_not_wait_for_queued_callback() {
    let promise = Promise::<String>::new();
    let (release_tx, release_rx) = channel::<()>();
    let (done_tx, done_rx) = channel();
    promise.and_then(move |errors| {
        release_rx.recv().ok();
        done_tx.send(errors.len()).expect("receiver dropped");
    });

    // The queued callback is parked on `release_rx` until after this returns.
    promise.complete(vec!["late".into()]);
    assert!(promise.is_complete());

    release_tx.send(()).expect("callback dropped its receiver");
    assert_eq!(done_rx.recv().expect("callback never ran"), 1);
}

#[test]
fn test_boxed_errors() {
    let promise: Promise = Promise::builder().name("job").build();
    let err: BoxError = "checksum mismatch".into();
    promise.complete(vec![err]);

    let errors = promise.wait();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "checksum mismatch");
}

proptest! {
    #[test]
    fn prop_every_reader_sees_completed_payload(
        errors in proptest::collection::vec(any::<String>(), 0..8),
        readers in 1usize..4,
    ) {
        let promise = Promise::<String>::new();
        let early: Vec<_> = (0..readers)
            .map(|_| {
                let promise = promise.clone();
                thread::spawn(move || promise.wait())
            })
            .collect();

        promise.complete(errors.clone());

        for task in early {
            let seen = task.join().expect("The waiter thread has panicked");
            prop_assert_eq!(&*seen, &errors);
        }
        prop_assert_eq!(&*promise.wait(), &errors);
        let got = promise.try_get();
        prop_assert_eq!(got.as_deref(), Some(&errors));
    }
}
