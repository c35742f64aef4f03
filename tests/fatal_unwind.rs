//! The abort raised by [`ErrorHandler::fatal`] and the swallowed abort of a
//! caller that loses the race.
//!
//! A losing caller returns from `fatal` and keeps running. The tests below
//! check both halves of that contract: the first caller always unwinds with
//! the fatal payload, and nobody else does.

mod common;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Barrier,
};

use common::{LogCapture, state_ok};
use ferry_fatal::{
    ErrorHandler, FATAL_PANIC_MESSAGE, PanicErrorHandler, dump::MemoryDump, is_fatal_panic,
};
use rootcause::report;

fn handler() -> PanicErrorHandler {
    PanicErrorHandler::builder(state_ok())
        .dump_channel(MemoryDump::new())
        .build()
}

#[test]
fn test_second_fatal_from_another_thread_does_not_unwind() {
    let (logs, dispatch) = LogCapture::dispatch();
    let handler = handler();

    std::thread::scope(|s| {
        let first = s
            .spawn(|| {
                tracing::dispatcher::with_default(&dispatch, || {
                    catch_unwind(AssertUnwindSafe(|| {
                        handler.fatal("copier", report!("deadlock detected"));
                    }))
                })
            })
            .join()
            .unwrap();
        let payload = first.expect_err("first fatal call must unwind");
        assert!(is_fatal_panic(payload.as_ref()));
        assert_eq!(
            payload.downcast_ref::<&'static str>(),
            Some(&FATAL_PANIC_MESSAGE)
        );

        let second = s
            .spawn(|| {
                tracing::dispatcher::with_default(&dispatch, || {
                    catch_unwind(AssertUnwindSafe(|| {
                        handler.fatal("verifier", report!("checksum mismatch on db.users"));
                    }))
                })
            })
            .join()
            .unwrap();
        assert!(second.is_ok(), "second fatal call must return normally");
    });

    let fatal = logs.with_message("fatal error detected, state dump in stdout");
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].field("errfrom"), Some("copier"));

    let suppressed = logs.with_message("multiple fatal errors detected, not reporting again");
    assert_eq!(suppressed.len(), 1);
    assert_eq!(suppressed[0].field("errfrom"), Some("verifier"));
    assert!(
        suppressed[0]
            .field("error")
            .unwrap()
            .contains("checksum mismatch on db.users")
    );
}

#[test]
fn test_racing_fatal_calls_unwind_exactly_once() {
    const CALLERS: usize = 16;
    let handler = handler();
    let barrier = Barrier::new(CALLERS);

    let unwound = std::thread::scope(|s| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let (handler, barrier) = (&handler, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    catch_unwind(AssertUnwindSafe(|| {
                        handler.fatal("copier", report!("table {} vanished", i));
                    }))
                    .is_err()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|unwound| *unwound)
            .count()
    });

    assert_eq!(unwound, 1);
    assert_eq!(handler.report_attempts(), CALLERS as u64);
}
