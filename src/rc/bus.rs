/*
    ABSTRACT: Definition of the single-thread message bus and its supporting datatypes to
    deliver missives (see missive.rs) from publishers (see publish.rs) to listeners
    (see listener.rs and subscribe.rs)
*/
use crate::{
    config::BusConfig,
    error::{BusError, Result},
    rc::{
        types::{ChannelMap, ListenerList},
        Listener,
    },
    types::{execute_listeners, DispatchOutcome},
    Missive,
};
use std::any::TypeId;
use std::cell::RefCell;
use tracing::{debug, trace};

struct Registry {
    open: bool,
    channels: ChannelMap,
}

impl Registry {
    fn list<M: Missive>(&self) -> Option<&ListenerList<M>> {
        self.channels
            .get(&TypeId::of::<M>())
            .and_then(|list| list.downcast_ref::<ListenerList<M>>())
    }

    fn list_mut<M: Missive>(&mut self) -> Option<&mut ListenerList<M>> {
        self.channels
            .get_mut(&TypeId::of::<M>())
            .and_then(|list| list.downcast_mut::<ListenerList<M>>())
    }
}

/// Single-thread datastructure responsible for dispatching missives from publishers to listeners
///
/// This keeps the respective Pub/Sub systems decoupled from each other
///
/// Create one with `MessageBus::open` at startup and share it by reference or `Rc`. No registry borrow is
/// held while a listener runs, so listeners may add, remove, and send on the same bus.
pub struct MessageBus {
    config: BusConfig,
    registry: RefCell<Registry>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::open(BusConfig::default())
    }
}

impl MessageBus {
    pub fn open(config: BusConfig) -> Self {
        debug!(policy = %config.failure_policy, isolate_panics = config.isolate_panics, "message bus opened");
        Self {
            config,
            registry: RefCell::new(Registry {
                open: true,
                channels: ChannelMap::default(),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.registry.borrow().open
    }

    /// Drops every registration and refuses further use of this `MessageBus`
    ///
    /// ### Notes
    /// - Closing an already closed bus does nothing.
    pub fn close(&self) {
        let channels = {
            let mut registry = self.registry.borrow_mut();
            if !registry.open {
                return;
            }
            registry.open = false;
            std::mem::take(&mut registry.channels)
        };
        debug!(channels = channels.len(), "message bus closed");
        // Listeners are dropped outside of the borrow, their captures may touch the bus
        drop(channels);
    }

    /// Adds the given `Listener` to the listener list of its missive type
    ///
    /// ### Returns
    /// - `bool`: `false` if a listener with the same id is already registered for `M`, or if the bus is closed.
    pub fn add_listener<M: Missive>(&self, listener: &Listener<M>) -> bool {
        let mut registry = self.registry.borrow_mut();
        if !registry.open {
            debug!(missive = M::name(), listener = %listener.id(), "bus is closed, listener refused");
            return false;
        }
        let Some(list) = registry
            .channels
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(ListenerList::<M>::new()))
            .downcast_mut::<ListenerList<M>>()
        else {
            return false;
        };
        // A dropped subscriber may have left its id behind
        list.retain(Listener::is_alive);
        if list.iter().any(|registered| registered.id() == listener.id()) {
            trace!(missive = M::name(), listener = %listener.id(), "listener already registered");
            return false;
        }
        list.push(listener.clone());
        debug!(missive = M::name(), listener = %listener.id(), listeners = list.len(), "listener added");
        true
    }

    /// Removes the given `Listener` from the listener list of its missive type
    ///
    /// ### Notes
    /// - Registration order of the remaining listeners is preserved.
    /// - A dispatch already in progress still reaches this listener if its snapshot contains it.
    ///
    /// ### Returns
    /// - `bool`: `true` if the listener was registered and has been removed.
    pub fn remove_listener<M: Missive>(&self, listener: &Listener<M>) -> bool {
        let removed = {
            let mut registry = self.registry.borrow_mut();
            let Some(list) = registry.list_mut::<M>() else {
                return false;
            };
            let Some(idx) = list
                .iter()
                .position(|registered| registered.id() == listener.id())
            else {
                return false;
            };
            let removed = list.remove(idx);
            let remaining = list.len();
            if remaining == 0 {
                registry.channels.remove(&TypeId::of::<M>());
            }
            debug!(missive = M::name(), listener = %listener.id(), listeners = remaining, "listener removed");
            removed
        };
        drop(removed);
        true
    }

    /// Removes every `Listener` registered for `M`, returning how many live ones there were
    pub fn remove_all_listeners<M: Missive>(&self) -> usize {
        let removed = self.registry.borrow_mut().channels.remove(&TypeId::of::<M>());
        let count = removed
            .as_ref()
            .and_then(|list| list.downcast_ref::<ListenerList<M>>())
            .map_or(0, |list| list.iter().filter(|l| l.is_alive()).count());
        if count > 0 {
            debug!(missive = M::name(), listeners = count, "all listeners removed");
        }
        count
    }

    /// Removes all listeners from this `MessageBus`, leaving it open
    pub fn clear(&self) {
        let channels = std::mem::take(&mut self.registry.borrow_mut().channels);
        debug!(channels = channels.len(), "message bus cleared");
        drop(channels);
    }

    /// Number of live listeners registered for `M`
    pub fn listener_count<M: Missive>(&self) -> usize {
        self.registry
            .borrow()
            .list::<M>()
            .map_or(0, |list| list.iter().filter(|l| l.is_alive()).count())
    }

    pub fn has_listeners<M: Missive>(&self) -> bool {
        self.listener_count::<M>() > 0
    }

    /// Dispatches the given missive to every `Listener` registered for its exact type, in registration order
    ///
    /// ### Notes
    /// - The listener list is snapshotted before the first invocation; changes made by listeners apply to later sends.
    /// - Automatically removes any dropped subscribers encountered during the dispatch.
    /// - Failing listeners never stop the rest of the snapshot. How they are reported depends on `BusConfig::failure_policy`.
    pub fn send<M: Missive>(&self, missive: &M) -> Result<DispatchOutcome> {
        let snapshot: ListenerList<M> = {
            let registry = self.registry.borrow();
            if !registry.open {
                return Err(BusError::Closed);
            }
            match registry.list::<M>() {
                Some(list) => list.clone(),
                None => {
                    trace!(missive = M::name(), "no listeners");
                    return Ok(DispatchOutcome::NotNeeded);
                }
            }
        };
        trace!(missive = M::name(), listeners = snapshot.len(), "dispatching");

        let run = execute_listeners(&snapshot, missive, &self.config);
        if run.requires_cleanup() {
            self.prune_dropped::<M>();
        }
        run.finish(self.config.failure_policy)
    }

    fn prune_dropped<M: Missive>(&self) {
        let mut registry = self.registry.borrow_mut();
        let Some(list) = registry.list_mut::<M>() else {
            return;
        };
        let before = list.len();
        list.retain(Listener::is_alive);
        let remaining = list.len();
        if remaining == 0 {
            registry.channels.remove(&TypeId::of::<M>());
        }
        debug!(missive = M::name(), pruned = before - remaining, "dropped subscribers pruned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FailurePolicy,
        messages::*,
        rc::{Publisher, Subscriber},
        test_support::init_tracing,
        ListenerResult,
    };
    use std::cell::Cell;
    use std::rc::Rc;
    use uuid::Uuid;

    fn counter<M: Missive>(calls: &Rc<Cell<usize>>) -> Listener<M> {
        let calls = calls.clone();
        Listener::new(move |_: &M| calls.set(calls.get() + 1))
    }

    fn recorder<M: Missive>(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Listener<M> {
        let log = log.clone();
        Listener::new(move |_: &M| log.borrow_mut().push(tag))
    }

    #[test]
    fn test_send_without_listeners_is_noop() {
        init_tracing();
        let bus = MessageBus::default();
        let outcome = bus.send(&CreditsRequested).unwrap();
        assert_eq!(outcome, DispatchOutcome::NotNeeded);
        assert!(!bus.has_listeners::<CreditsRequested>());
    }

    #[test]
    fn test_duplicate_add_invokes_once() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        let listener = counter::<HelpToggled>(&calls);

        assert!(bus.add_listener(&listener));
        assert!(!bus.add_listener(&listener));
        assert!(!bus.add_listener(&listener.clone()));
        assert_eq!(bus.listener_count::<HelpToggled>(), 1);

        let outcome = bus.send(&HelpToggled { state: true }).unwrap();
        assert_eq!(outcome, DispatchOutcome::Finished(1));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = MessageBus::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["c1", "c2", "c3"] {
            bus.add_listener(&recorder::<AudioCueRequested>(&log, tag));
        }

        bus.send(&AudioCueRequested).unwrap();
        assert_eq!(*log.borrow(), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_order_survives_removal_from_the_middle() {
        let bus = MessageBus::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let listeners: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|tag| recorder::<AudioCueRequested>(&log, tag))
            .collect();
        for listener in &listeners {
            bus.add_listener(listener);
        }

        assert!(bus.remove_listener(&listeners[1]));
        bus.send(&AudioCueRequested).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_dispatch_matches_exact_type_only() {
        let bus = MessageBus::default();
        let credits = Rc::new(Cell::new(0));
        let audio = Rc::new(Cell::new(0));
        bus.add_listener(&counter::<CreditsRequested>(&credits));
        bus.add_listener(&counter::<AudioCueRequested>(&audio));

        assert_eq!(bus.send(&AudioCueRequested).unwrap(), DispatchOutcome::Finished(1));
        assert_eq!(credits.get(), 0);
        assert_eq!(audio.get(), 1);
        assert_eq!(
            bus.send(&WebViewRequested::default()).unwrap(),
            DispatchOutcome::NotNeeded
        );
    }

    #[test]
    fn test_remove_absent_listener_is_noop() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        let listener = counter::<HelpToggled>(&calls);

        assert!(!bus.remove_listener(&listener));
        bus.add_listener(&listener);
        assert!(bus.remove_listener(&listener));
        assert!(!bus.remove_listener(&listener));
        assert_eq!(bus.send(&HelpToggled { state: false }).unwrap(), DispatchOutcome::NotNeeded);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let bus = Rc::new(MessageBus::default());
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Listener<HelpToggled>>>> = Rc::default();
        let listener = {
            let bus = Rc::downgrade(&bus);
            let calls = calls.clone();
            let slot = slot.clone();
            Listener::new(move |_: &HelpToggled| {
                calls.set(calls.get() + 1);
                if let (Some(bus), Some(me)) = (bus.upgrade(), slot.borrow().as_ref()) {
                    assert!(bus.remove_listener(me));
                }
            })
        };
        *slot.borrow_mut() = Some(listener.clone());

        bus.add_listener(&listener);
        bus.send(&HelpToggled { state: true }).unwrap();
        bus.send(&HelpToggled { state: false }).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!bus.has_listeners::<HelpToggled>());
    }

    #[test]
    fn test_removed_mid_dispatch_still_receives_inflight_message() {
        let bus = Rc::new(MessageBus::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let c1 = recorder::<CreditsRequested>(&log, "c1");
        let c3 = recorder::<CreditsRequested>(&log, "c3");
        let c2 = {
            let bus = Rc::downgrade(&bus);
            let log = log.clone();
            let c3 = c3.clone();
            Listener::new(move |_: &CreditsRequested| {
                log.borrow_mut().push("c2");
                if let Some(bus) = bus.upgrade() {
                    bus.remove_listener(&c3);
                }
            })
        };
        bus.add_listener(&c1);
        bus.add_listener(&c2);
        bus.add_listener(&c3);

        bus.send(&CreditsRequested).unwrap();
        assert_eq!(*log.borrow(), vec!["c1", "c2", "c3"]);

        log.borrow_mut().clear();
        bus.send(&CreditsRequested).unwrap();
        assert_eq!(*log.borrow(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_listener_added_mid_dispatch_waits_for_next_send() {
        let bus = Rc::new(MessageBus::default());
        let late_calls = Rc::new(Cell::new(0));
        let late = counter::<AudioCueRequested>(&late_calls);
        let adder = {
            let bus = Rc::downgrade(&bus);
            let late = late.clone();
            Listener::new(move |_: &AudioCueRequested| {
                if let Some(bus) = bus.upgrade() {
                    bus.add_listener(&late);
                }
            })
        };
        bus.add_listener(&adder);

        bus.send(&AudioCueRequested).unwrap();
        assert_eq!(late_calls.get(), 0);
        bus.send(&AudioCueRequested).unwrap();
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_nested_send_from_listener() {
        let bus = Rc::new(MessageBus::default());
        let help_calls = Rc::new(Cell::new(0));
        bus.add_listener(&counter::<HelpToggled>(&help_calls));
        let relay = {
            let bus = Rc::downgrade(&bus);
            Listener::new(move |input: &InputReceived| -> ListenerResult {
                if input.button == ButtonType::StartMenu {
                    if let Some(bus) = bus.upgrade() {
                        bus.send(&HelpToggled { state: true })?;
                    }
                }
                Ok(())
            })
        };
        bus.add_listener(&relay);

        let input = InputReceived {
            controller: ControllerType::Right,
            button: ButtonType::StartMenu,
        };
        assert_eq!(bus.send(&input).unwrap(), DispatchOutcome::Finished(1));
        assert_eq!(help_calls.get(), 1);
    }

    #[test]
    fn test_failures_do_not_stop_dispatch() {
        init_tracing();
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        bus.add_listener(&Listener::new(|_: &HelpToggled| -> std::result::Result<(), String> {
            Err("help panel missing".to_string())
        }));
        bus.add_listener(&Listener::new(|help: &HelpToggled| {
            assert!(!help.state, "kaboom");
        }));
        bus.add_listener(&counter::<HelpToggled>(&calls));

        let outcome = bus.send(&HelpToggled { state: true }).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::FinishedWithFailures {
                delivered: 1,
                failed: 2
            }
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_strict_mode_reports_failed_listeners() {
        let bus = MessageBus::open(BusConfig::strict());
        let calls = Rc::new(Cell::new(0));
        let failing = Listener::new(|web: &WebViewRequested| -> std::result::Result<(), String> {
            Err(format!("cannot open {}", web.url))
        });
        bus.add_listener(&failing);
        bus.add_listener(&counter::<WebViewRequested>(&calls));

        let err = bus
            .send(&WebViewRequested {
                url: "https://example.org".to_string(),
            })
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        match err {
            BusError::Dispatch(failures) => {
                assert_eq!(failures.delivered, 1);
                assert_eq!(failures.failed_listeners().collect::<Vec<_>>(), vec![failing.id()]);
                assert_eq!(failures.failures[0].reason, "cannot open https://example.org");
                assert_eq!(failures.missive, WebViewRequested::name());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_panics_propagate_when_not_isolated() {
        let bus = MessageBus::open(BusConfig::default().with_isolate_panics(false));
        bus.add_listener(&Listener::new(|help: &HelpToggled| {
            assert!(!help.state, "kaboom");
        }));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            bus.send(&HelpToggled { state: true })
        }));
        assert!(result.is_err());
        // The registry borrow was released before the listener ran
        assert_eq!(bus.listener_count::<HelpToggled>(), 1);
    }

    struct HelpPanel {
        id: Uuid,
        shown: Cell<bool>,
    }

    impl Subscriber<HelpToggled> for HelpPanel {
        fn id(&self) -> &Uuid {
            &self.id
        }

        fn on_missive(&self, missive: &HelpToggled) -> ListenerResult {
            self.shown.set(missive.state);
            Ok(())
        }
    }

    #[test]
    fn test_subscriber_objects_and_drop_pruning() {
        let bus = MessageBus::default();
        let panel = Rc::new(HelpPanel {
            id: Uuid::new_v4(),
            shown: Cell::new(false),
        });
        let listener = Listener::<HelpToggled>::from_subscriber(&panel);
        assert_eq!(listener.id().as_uuid(), &panel.id);
        assert!(bus.add_listener(&listener));
        assert!(!bus.add_listener(&Listener::<HelpToggled>::from_subscriber(&panel)));

        bus.send(&HelpToggled { state: true }).unwrap();
        assert!(panel.shown.get());

        drop(panel);
        assert!(!listener.is_alive());
        assert_eq!(bus.listener_count::<HelpToggled>(), 0);
        assert_eq!(bus.send(&HelpToggled { state: false }).unwrap(), DispatchOutcome::NotNeeded);
        assert!(bus.registry.borrow().list::<HelpToggled>().is_none());
    }

    #[test]
    fn test_resubscribe_with_id_of_dropped_subscriber() {
        let bus = MessageBus::default();
        let id = Uuid::new_v4();
        let stale = Rc::new(HelpPanel {
            id,
            shown: Cell::new(false),
        });
        assert!(bus.add_listener(&Listener::<HelpToggled>::from_subscriber(&stale)));
        drop(stale);
        assert_eq!(bus.listener_count::<HelpToggled>(), 0);

        let fresh = Rc::new(HelpPanel {
            id,
            shown: Cell::new(false),
        });
        assert!(bus.add_listener(&Listener::<HelpToggled>::from_subscriber(&fresh)));
        assert_eq!(bus.listener_count::<HelpToggled>(), 1);
        assert_eq!(bus.send(&HelpToggled { state: true }).unwrap(), DispatchOutcome::Finished(1));
        assert!(fresh.shown.get());
    }

    #[test]
    fn test_remove_all_counts_live_listeners_only() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        bus.add_listener(&counter::<HelpToggled>(&calls));
        for _ in 0..2 {
            let panel = Rc::new(HelpPanel {
                id: Uuid::new_v4(),
                shown: Cell::new(false),
            });
            bus.add_listener(&Listener::<HelpToggled>::from_subscriber(&panel));
        }

        assert_eq!(bus.listener_count::<HelpToggled>(), 1);
        assert_eq!(bus.remove_all_listeners::<HelpToggled>(), 1);
    }

    #[test]
    fn test_nested_send_skips_listener_removed_earlier_in_dispatch() {
        let bus = Rc::new(MessageBus::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let c2 = recorder::<CreditsRequested>(&log, "c2");
        let depth = Rc::new(Cell::new(0));
        let c1 = {
            let bus = Rc::downgrade(&bus);
            let log = log.clone();
            let c2 = c2.clone();
            let depth = depth.clone();
            Listener::new(move |missive: &CreditsRequested| -> ListenerResult {
                log.borrow_mut().push("c1");
                if depth.get() == 0 {
                    depth.set(1);
                    if let Some(bus) = bus.upgrade() {
                        bus.remove_listener(&c2);
                        bus.send(missive)?;
                    }
                }
                Ok(())
            })
        };
        bus.add_listener(&c1);
        bus.add_listener(&c2);

        assert_eq!(bus.send(&CreditsRequested).unwrap(), DispatchOutcome::Finished(2));
        assert_eq!(*log.borrow(), vec!["c1", "c1", "c2"]);
    }

    struct CreditsButton;

    impl Publisher<CreditsRequested> for CreditsButton {}

    #[test]
    fn test_publisher_forwards_to_bus() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        bus.add_listener(&counter::<CreditsRequested>(&calls));

        let outcome = CreditsButton.publish(&CreditsRequested, &bus).unwrap();
        assert_eq!(outcome.delivered(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_close_rejects_further_use() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        let listener = counter::<AudioCueRequested>(&calls);
        bus.add_listener(&listener);

        bus.close();
        bus.close();
        assert!(!bus.is_open());
        assert!(!bus.add_listener(&listener));
        assert!(!bus.remove_listener(&listener));
        assert!(matches!(bus.send(&AudioCueRequested), Err(BusError::Closed)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_bulk_removal() {
        let bus = MessageBus::default();
        let calls = Rc::new(Cell::new(0));
        bus.add_listener(&counter::<AudioCueRequested>(&calls));
        bus.add_listener(&counter::<AudioCueRequested>(&calls));
        bus.add_listener(&counter::<CreditsRequested>(&calls));

        assert_eq!(bus.remove_all_listeners::<AudioCueRequested>(), 2);
        assert_eq!(bus.remove_all_listeners::<AudioCueRequested>(), 0);
        assert!(bus.has_listeners::<CreditsRequested>());

        bus.clear();
        assert!(bus.is_open());
        assert!(!bus.has_listeners::<CreditsRequested>());
        assert_eq!(bus.config().failure_policy, FailurePolicy::Lenient);
    }
}
