#![forbid(unsafe_code)]

//! In-memory [`BrowserHost`] for tests and headless runs.
//!
//! Models a single tab: a session-history stack with a cursor, the set of
//! live listeners, and switches to make history writes or hard navigations
//! fail the way a sandboxed iframe or strict CSP would.
//!
//! The host does not dispatch events itself. After [`back`](MemoryHost::back)
//! or [`set_hash`](MemoryHost::set_hash), tests call the router's
//! `handle_popstate` / `handle_hashchange`, exactly as the JS glue would.

use std::cell::RefCell;
use std::collections::BTreeMap;

use url::Url;

use crate::host::{BrowserHost, HostError, HostListenerId};
use crate::listeners::{ListenerKind, ListenerSpec};

#[derive(Debug)]
struct MemoryState {
    entries: Vec<Url>,
    index: usize,
    listeners: BTreeMap<u64, ListenerSpec>,
    next_listener: u64,
    removed_listeners: usize,
    pushes: usize,
    replaces: usize,
    assigned: Vec<Url>,
    reject_history: bool,
    reject_navigation: bool,
}

/// A deterministic, single-tab browser stand-in.
#[derive(Debug)]
pub struct MemoryHost {
    state: RefCell<MemoryState>,
}

impl MemoryHost {
    /// Create a host whose only history entry is `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            state: RefCell::new(MemoryState {
                entries: vec![url],
                index: 0,
                listeners: BTreeMap::new(),
                next_listener: 1,
                removed_listeners: 0,
                pushes: 0,
                replaces: 0,
                assigned: Vec::new(),
                reject_history: false,
                reject_navigation: false,
            }),
        }
    }

    /// Parse `href` and create a host there.
    pub fn at(href: &str) -> Result<Self, url::ParseError> {
        Url::parse(href).map(Self::new)
    }

    /// Current URL.
    #[must_use]
    pub fn current(&self) -> Url {
        let state = self.state.borrow();
        state.entries[state.index].clone()
    }

    /// Current URL as a string.
    #[must_use]
    pub fn href(&self) -> String {
        self.current().into()
    }

    /// Make `pushState`/`replaceState` fail.
    pub fn reject_history_writes(&self, reject: bool) {
        self.state.borrow_mut().reject_history = reject;
    }

    /// Make `location.assign` fail.
    pub fn reject_navigation(&self, reject: bool) {
        self.state.borrow_mut().reject_navigation = reject;
    }

    /// Step back one entry. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// Step forward one entry. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Move the history cursor by `delta`, if the target entry exists.
    pub fn go(&self, delta: isize) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(target) = state.index.checked_add_signed(delta) else {
            return false;
        };
        if target >= state.entries.len() {
            return false;
        }
        state.index = target;
        true
    }

    /// Simulate the user editing the fragment: pushes a new entry with `hash`.
    pub fn set_hash(&self, hash: Option<&str>) {
        let mut url = self.current();
        url.set_fragment(hash);
        self.push_entry(url);
    }

    /// Simulate an external navigation within the same document.
    pub fn set_location(&self, url: Url) {
        self.push_entry(url);
    }

    /// Number of entries in the session history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    #[must_use]
    pub fn push_count(&self) -> usize {
        self.state.borrow().pushes
    }

    #[must_use]
    pub fn replace_count(&self) -> usize {
        self.state.borrow().replaces
    }

    /// URLs passed to `location.assign`, oldest first.
    #[must_use]
    pub fn assigned(&self) -> Vec<Url> {
        self.state.borrow().assigned.clone()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Number of live listeners of `kind`.
    #[must_use]
    pub fn listeners_of(&self, kind: ListenerKind) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|spec| spec.kind == kind)
            .count()
    }

    /// Live listener specs in registration order.
    #[must_use]
    pub fn listeners(&self) -> Vec<ListenerSpec> {
        self.state.borrow().listeners.values().copied().collect()
    }

    /// Successful `remove_listener` calls so far.
    #[must_use]
    pub fn removed_listener_count(&self) -> usize {
        self.state.borrow().removed_listeners
    }

    fn push_entry(&self, url: Url) {
        let mut state = self.state.borrow_mut();
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(url);
        state.index = keep;
    }
}

impl BrowserHost for MemoryHost {
    fn location(&self) -> Result<Url, HostError> {
        Ok(self.current())
    }

    fn push_state(&self, url: &Url) -> Result<(), HostError> {
        if self.state.borrow().reject_history {
            return Err(HostError::HistoryRejected("pushState blocked".into()));
        }
        self.push_entry(url.clone());
        self.state.borrow_mut().pushes += 1;
        Ok(())
    }

    fn replace_state(&self, url: &Url) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        if state.reject_history {
            return Err(HostError::HistoryRejected("replaceState blocked".into()));
        }
        let index = state.index;
        state.entries[index] = url.clone();
        state.replaces += 1;
        Ok(())
    }

    fn assign(&self, url: &Url) -> Result<(), HostError> {
        if self.state.borrow().reject_navigation {
            return Err(HostError::NavigationRejected("location.assign blocked".into()));
        }
        self.state.borrow_mut().assigned.push(url.clone());
        self.push_entry(url.clone());
        Ok(())
    }

    fn add_listener(&self, spec: ListenerSpec) -> HostListenerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, spec);
        HostListenerId(id)
    }

    fn remove_listener(&self, id: HostListenerId) {
        let mut state = self.state.borrow_mut();
        if state.listeners.remove(&id.0).is_some() {
            state.removed_listeners += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_truncates_forward_entries() {
        let host = MemoryHost::at("https://host.example/a").unwrap();
        host.push_state(&Url::parse("https://host.example/b").unwrap())
            .unwrap();
        host.push_state(&Url::parse("https://host.example/c").unwrap())
            .unwrap();
        assert!(host.back());
        assert!(host.back());
        assert!(!host.back());
        host.push_state(&Url::parse("https://host.example/d").unwrap())
            .unwrap();
        assert_eq!(host.history_len(), 2);
        assert!(!host.forward());
        assert_eq!(host.current().path(), "/d");
    }

    #[test]
    fn replace_keeps_length() {
        let host = MemoryHost::at("https://host.example/a").unwrap();
        host.replace_state(&Url::parse("https://host.example/z").unwrap())
            .unwrap();
        assert_eq!(host.history_len(), 1);
        assert_eq!(host.replace_count(), 1);
        assert_eq!(host.current().path(), "/z");
    }

    #[test]
    fn rejected_writes_leave_history_alone() {
        let host = MemoryHost::at("https://host.example/a").unwrap();
        host.reject_history_writes(true);
        let next = Url::parse("https://host.example/b").unwrap();
        assert!(host.push_state(&next).is_err());
        assert!(host.replace_state(&next).is_err());
        assert_eq!(host.href(), "https://host.example/a");
    }

    #[test]
    fn set_hash_pushes_entry() {
        let host = MemoryHost::at("https://host.example/a").unwrap();
        host.set_hash(Some("/events"));
        assert_eq!(host.current().fragment(), Some("/events"));
        assert!(host.back());
        assert_eq!(host.current().fragment(), None);
    }
}
