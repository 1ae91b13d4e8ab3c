use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Resize,
    Key,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Whatever delivers window events to a mounted session (a window, a test harness).
pub trait ListenerHost {
    fn register(&mut self, kind: ListenerKind) -> ListenerId;
    fn deregister(&mut self, id: ListenerId);
}

pub type SharedListenerHost = Rc<RefCell<dyn ListenerHost>>;

/// One registration; dropping it deregisters.
pub struct ListenerScope {
    host: SharedListenerHost,
    id: ListenerId,
    kind: ListenerKind,
}

impl ListenerScope {
    pub fn register(host: &SharedListenerHost, kind: ListenerKind) -> Self {
        let id = host.borrow_mut().register(kind);
        debug!(target: "input", ?kind, id = id.0, "listener registered");
        Self { host: Rc::clone(host), id, kind }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        // A host already borrowed elsewhere is mid-teardown itself.
        if let Ok(mut host) = self.host.try_borrow_mut() {
            host.deregister(self.id);
            debug!(target: "input", kind = ?self.kind, id = self.id.0, "listener deregistered");
        }
    }
}

/// Host with no event source; hands out ids and forgets them.
#[derive(Debug, Default)]
pub struct NullListenerHost {
    next: u64,
    active: usize,
}

impl NullListenerHost {
    pub fn shared() -> SharedListenerHost {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn active(&self) -> usize {
        self.active
    }
}

impl ListenerHost for NullListenerHost {
    fn register(&mut self, _kind: ListenerKind) -> ListenerId {
        self.next += 1;
        self.active += 1;
        ListenerId(self.next)
    }

    fn deregister(&mut self, _id: ListenerId) {
        self.active = self.active.saturating_sub(1);
    }
}
