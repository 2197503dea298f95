//! Debug-build hooks into broadphase events.
//!
//! A [`BroadphaseObserver`] sees every pair the broadphase reports to or
//! retracts from its cache, and every staging move of the dynamic tree. The
//! trait, the `set_observer` methods, and every notification exist only in
//! builds with `debug_assertions`; release builds carry a zero-sized slot.

#[cfg(debug_assertions)]
use crate::handle::ProxyHandle;

/// Receiver of broadphase events. All methods default to no-ops.
#[cfg(debug_assertions)]
pub trait BroadphaseObserver {
    /// The broadphase found a new overlap between `a` and `b`.
    fn pair_added(&mut self, a: ProxyHandle, b: ProxyHandle) {
        let _ = (a, b);
    }

    /// The broadphase saw the overlap between `a` and `b` end.
    fn pair_removed(&mut self, a: ProxyHandle, b: ProxyHandle) {
        let _ = (a, b);
    }

    /// A proxy entered staging bucket `stage` (the fixed tree when `stage`
    /// equals the stage count).
    fn proxy_staged(&mut self, proxy: ProxyHandle, stage: usize) {
        let _ = (proxy, stage);
    }
}

/// Holder of an optional observer.
#[derive(Default)]
pub(crate) struct ObserverSlot {
    #[cfg(debug_assertions)]
    inner: Option<Box<dyn BroadphaseObserver>>,
}

impl ObserverSlot {
    #[cfg(debug_assertions)]
    pub(crate) fn set(&mut self, observer: Option<Box<dyn BroadphaseObserver>>) {
        self.inner = observer;
    }

    #[cfg(debug_assertions)]
    pub(crate) fn notify(&mut self, f: impl FnOnce(&mut dyn BroadphaseObserver)) {
        if let Some(observer) = self.inner.as_deref_mut() {
            f(observer);
        }
    }
}

impl std::fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[cfg(debug_assertions)]
        let attached = self.inner.is_some();
        #[cfg(not(debug_assertions))]
        let attached = false;
        f.debug_struct("ObserverSlot")
            .field("attached", &attached)
            .finish()
    }
}

/// Forward an event to an [`ObserverSlot`]; expands to nothing in release.
macro_rules! observe {
    ($slot:expr, $method:ident($($arg:expr),* $(,)?)) => {{
        #[cfg(debug_assertions)]
        $slot.notify(|observer| observer.$method($($arg),*));
    }};
}

pub(crate) use observe;

/// Observer that records every event, for tests and debugging sessions.
#[cfg(debug_assertions)]
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    /// Events in arrival order.
    pub events: std::rc::Rc<std::cell::RefCell<Vec<ObservedEvent>>>,
}

/// One recorded broadphase event.
#[cfg(debug_assertions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedEvent {
    /// See [`BroadphaseObserver::pair_added`].
    PairAdded(ProxyHandle, ProxyHandle),
    /// See [`BroadphaseObserver::pair_removed`].
    PairRemoved(ProxyHandle, ProxyHandle),
    /// See [`BroadphaseObserver::proxy_staged`].
    ProxyStaged(ProxyHandle, usize),
}

#[cfg(debug_assertions)]
impl BroadphaseObserver for RecordingObserver {
    fn pair_added(&mut self, a: ProxyHandle, b: ProxyHandle) {
        self.events.borrow_mut().push(ObservedEvent::PairAdded(a, b));
    }

    fn pair_removed(&mut self, a: ProxyHandle, b: ProxyHandle) {
        self.events
            .borrow_mut()
            .push(ObservedEvent::PairRemoved(a, b));
    }

    fn proxy_staged(&mut self, proxy: ProxyHandle, stage: usize) {
        self.events
            .borrow_mut()
            .push(ObservedEvent::ProxyStaged(proxy, stage));
    }
}

#[cfg(all(test, debug_assertions))]
mod tests {
    use super::*;
    use crate::handle::ArenaKey;

    #[test]
    fn test_slot_forwards_to_observer() {
        let recorder = RecordingObserver::default();
        let mut slot = ObserverSlot::default();
        slot.set(Some(Box::new(recorder.clone())));

        let a = ProxyHandle::from_parts(1, 0);
        let b = ProxyHandle::from_parts(2, 0);
        observe!(slot, pair_added(a, b));
        observe!(slot, proxy_staged(a, 1));

        assert_eq!(
            *recorder.events.borrow(),
            vec![ObservedEvent::PairAdded(a, b), ObservedEvent::ProxyStaged(a, 1)]
        );
    }

    #[test]
    fn test_empty_slot_is_silent() {
        let mut slot = ObserverSlot::default();
        observe!(slot, pair_removed(ProxyHandle::from_parts(0, 0), ProxyHandle::from_parts(1, 0)));
        assert!(format!("{slot:?}").contains("false"));
    }
}
