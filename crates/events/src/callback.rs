//! User callbacks.

use anyhow::Result;
use core::fmt;
use log::error;
use squirrel_host::Event;
use std::rc::Rc;

/// A shared event callback.
///
/// Identity is the identity of the allocation: clones of one `Callback` are
/// the same callback for de-duplication, two separately built callbacks are
/// not, even if their code is identical. An `Err` is logged by the router and
/// never propagates.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Event) -> Result<()>>);

impl Callback {
    pub fn new(body: impl Fn(&Event) -> Result<()> + 'static) -> Self {
        Self(Rc::new(body))
    }

    /// Wrap a callback that cannot fail.
    pub fn infallible(body: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(move |event: &Event| {
            body(event);
            Ok(())
        }))
    }

    #[inline]
    pub fn call(&self, event: &Event) -> Result<()> {
        (self.0)(event)
    }

    /// Address of the shared allocation.
    #[inline]
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>().addr()
    }

    pub fn same(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Callback({:#x})", self.identity())
    }
}

/// Run `callback`, logging a failure instead of returning it.
pub(crate) fn invoke(callback: &Callback, event: &Event, context: &str) -> bool {
    match callback.call(event) {
        Ok(()) => true,
        Err(err) => {
            error!(
                "{context} callback for {:?} on node {} failed: {err:#}",
                event.kind,
                event.current_target.get()
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use squirrel_host::NodeKey;

    #[test]
    fn clones_share_identity() {
        let callback = Callback::infallible(|_| {});
        let other = Callback::infallible(|_| {});
        assert!(callback.same(&callback.clone()));
        assert!(!callback.same(&other));
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let failing = Callback::new(|_| bail!("boom"));
        let event = Event::new("click", NodeKey(1));
        assert!(!invoke(&failing, &event, "test"));
        assert!(invoke(&Callback::infallible(|_| {}), &event, "test"));
    }
}
