use std::any::Any;
use std::fmt::{Debug, Display};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::info;

/// Calls `call` and asserts that it fails with an error of type `E`.
///
/// Matches the error itself or any `wrap_err` context layer around it. An
/// error only reachable through another error's `source()` does not match.
/// Returns the matched error for further checks.
#[track_caller]
pub fn expect_error<E, T, R, F>(call: F) -> E
where
    E: Display + Debug + Send + Sync + 'static,
    R: Into<eyre::Report>,
    F: FnOnce() -> Result<T, R>,
{
    let report: eyre::Report = match call() {
        Ok(_) => panic!("No error returned!"),
        Err(e) => e.into(),
    };
    info!("expected error raised: {:?}", report);

    match report.downcast::<E>() {
        Ok(error) => error,
        Err(report) => panic!(
            "expected error of type {}, got: {:?}",
            std::any::type_name::<E>(),
            report
        ),
    }
}

/// Calls `call` and asserts that it panics, returning the panic message
#[track_caller]
pub fn expect_panic<T, F>(call: F) -> String
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(_) => panic!("No panic raised!"),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            info!("expected panic raised: {}", message);
            message
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
