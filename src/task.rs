//! Driver threads.
//!
//! Every asynchronous action and every combinator runs on its own named
//! thread. Panics raised by user code on those threads are captured and turned
//! into [`Error::Panicked`] so a chain never unwinds into its caller.
use crate::{cell::SettlementCell, Error};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

pub(crate) fn spawn<F>(name: &str, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map_err(|err| {
            tracing::error!(driver = name, error = %err, "failed to spawn promise driver");
            err
        })
}

/// Spawns `body` as the driver of `cell`.
///
/// If the thread cannot be started the cell is rejected with
/// [`Error::Spawn`], so observers are never left waiting on a driver that
/// does not exist.
pub(crate) fn drive<T, E, F>(name: &str, cell: &Arc<SettlementCell<T, E>>, body: F)
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(&SettlementCell<T, E>) + Send + 'static,
{
    let driven = cell.clone();
    if let Err(err) = spawn(name, move || body(&driven)) {
        cell.reject(Error::Spawn(err.to_string()));
    }
}

/// Runs a user callback, converting a panic into [`Error::Panicked`].
pub(crate) fn guarded<R, E, F>(callback: F) -> Result<R, Error<E>>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(panic = %message, "promise callback panicked; rejecting");
        Error::Panicked(message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
