//! Live client connections.
//!
//! The shard does no networking of its own; whatever front end accepts clients
//! registers them here so admin operations can count, list and kick them.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use log::info;

use crate::services::accounts::account_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct NetState {
    pub id: ConnectionId,
    pub address: IpAddr,
    /// Set once the client has logged in.
    pub account: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl fmt::Display for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{} ({})", self.address, account),
            None => write!(f, "{}", self.address),
        }
    }
}

#[derive(Debug, Default)]
pub struct NetStateRegistry {
    states: BTreeMap<ConnectionId, NetState>,
    next_id: u64,
}

impl NetStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, address: IpAddr) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.states.insert(
            id,
            NetState {
                id,
                address,
                account: None,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Returns false if the connection is gone.
    pub fn attach_account(&mut self, id: ConnectionId, account: &str) -> bool {
        match self.states.get_mut(&id) {
            Some(state) => {
                state.account = Some(account.to_string());
                true
            }
            None => false,
        }
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Option<NetState> {
        self.states.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&NetState> {
        self.states.get(&id)
    }

    pub fn list(&self) -> impl Iterator<Item = &NetState> + '_ {
        self.states.values()
    }

    pub fn count(&self) -> usize {
        self.states.len()
    }

    /// Connections logged in to `account`, matched the way the account
    /// registry matches names.
    pub fn for_account(&self, account: &str) -> Vec<&NetState> {
        let key = account_key(account);
        self.states
            .values()
            .filter(|s| s.account.as_deref().map_or(false, |a| account_key(a) == key))
            .collect()
    }

    /// Drop every connection of `account`; returns them.
    pub fn kick_account(&mut self, account: &str) -> Vec<NetState> {
        let ids: Vec<ConnectionId> = self.for_account(account).iter().map(|s| s.id).collect();
        let kicked = self.remove_all(&ids);
        if !kicked.is_empty() {
            info!("kicked {} connection(s) of account '{}'", kicked.len(), account);
        }
        kicked
    }

    pub fn kick_address(&mut self, address: IpAddr) -> Vec<NetState> {
        let ids: Vec<ConnectionId> = self
            .states
            .values()
            .filter(|s| s.address == address)
            .map(|s| s.id)
            .collect();
        let kicked = self.remove_all(&ids);
        if !kicked.is_empty() {
            info!("kicked {} connection(s) from {}", kicked.len(), address);
        }
        kicked
    }

    fn remove_all(&mut self, ids: &[ConnectionId]) -> Vec<NetState> {
        ids.iter().filter_map(|id| self.states.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn connections_are_tracked_and_kicked() {
        let mut reg = NetStateRegistry::new();
        let a = reg.connect(ip("10.0.0.1"));
        let b = reg.connect(ip("10.0.0.1"));
        let c = reg.connect(ip("10.0.0.2"));
        assert_ne!(a, b);
        assert!(reg.attach_account(a, "Adam"));
        assert!(reg.attach_account(c, "adam"));
        assert_eq!(reg.count(), 3);

        let kicked = reg.kick_account("ADAM");
        assert_eq!(kicked.len(), 2);
        assert_eq!(reg.count(), 1);
        assert!(reg.get(b).is_some());

        assert_eq!(reg.kick_address(ip("10.0.0.1")).len(), 1);
        assert_eq!(reg.count(), 0);
        assert!(!reg.attach_account(b, "adam"));
    }

    #[test]
    fn account_match_is_not_limited_to_ascii() {
        let mut reg = NetStateRegistry::new();
        let a = reg.connect(ip("10.0.0.1"));
        let b = reg.connect(ip("10.0.0.2"));
        assert!(reg.attach_account(a, "Ørjan"));
        assert!(reg.attach_account(b, "Orjan"));

        let found = reg.for_account("øRJAN ");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
    }

    #[test]
    fn disconnect_returns_the_state() {
        let mut reg = NetStateRegistry::new();
        let id = reg.connect(ip("127.0.0.1"));
        let state = reg.disconnect(id).unwrap();
        assert_eq!(state.to_string(), "127.0.0.1");
        assert!(reg.disconnect(id).is_none());
    }
}
