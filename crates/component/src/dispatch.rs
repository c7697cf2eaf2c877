use derive_more::{Display, Error};
use std::fmt;

/// Returned when dispatching into a [`Dispatch`] that has already fired or
/// been closed.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[display("dispatch closed")]
pub struct DispatchClosed;

type Callback<T> = Box<dyn FnOnce(&T) + Send>;

/// Single-fire side-effect channel.
///
/// At most one value is ever meaningfully delivered per element, so this is a
/// callback that runs once rather than a general purpose broadcast. After the
/// first dispatch, or after [`close()`](Self::close), every further dispatch
/// is rejected and the callback (with everything it captured) is gone.
pub struct Dispatch<T> {
    callback: Option<Callback<T>>,
}

impl<T> Dispatch<T> {
    pub fn new(callback: impl FnOnce(&T) + Send + 'static) -> Self {
        Self { callback: Some(Box::new(callback)) }
    }

    /// A dispatch that rejects everything.
    pub fn closed() -> Self {
        Self { callback: None }
    }

    /// Run the callback with `value`, closing the dispatch.
    pub fn dispatch(&mut self, value: &T) -> Result<(), DispatchClosed> {
        let callback = self.callback.take().ok_or(DispatchClosed)?;
        callback(value);
        Ok(())
    }

    /// Close without ever running the callback. Idempotent.
    pub fn close(&mut self) {
        self.callback = None;
    }

    pub fn is_closed(&self) -> bool {
        self.callback.is_none()
    }
}

impl<T> fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").field("closed", &self.is_closed()).finish()
    }
}
