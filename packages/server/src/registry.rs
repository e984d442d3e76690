//! Session and room registries.
//!
//! Two shared collections hold all chat state: accounts (with their online
//! status and connection token) and rooms (with their member lists). Each
//! sits behind its own mutex.
//!
//! Lock-ordering discipline: any operation needing both locks must acquire
//! the session lock before the room lock. Rather than trusting every caller,
//! the both-lock operations live exclusively on [`Directory`], whose methods
//! acquire the guards in that fixed order internally. [`SessionRegistry`]
//! and [`RoomRegistry`] methods each take only their own lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A registered user account.
///
/// Accounts are created offline at sign-up and never deleted; sign-in binds
/// the current connection token, release clears it again.
#[derive(Debug, Clone)]
pub struct Account {
    pub password: String,
    pub token: Option<usize>,
    pub online: bool,
}

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Success,
    UnknownAccount,
    WrongPassword,
}

/// Accounts keyed by user name.
#[derive(Default)]
pub struct SessionRegistry {
    users: Mutex<HashMap<String, Account>>,
}

impl SessionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new offline account. Fails if the name is taken; an existing
    /// account is never mutated by a sign-up attempt.
    pub fn sign_up(&self, name: &str, password: &str) -> bool {
        let mut users = self.lock();
        if users.contains_key(name) {
            return false;
        }
        users.insert(
            name.to_string(),
            Account {
                password: password.to_string(),
                token: None,
                online: false,
            },
        );
        true
    }

    /// Authenticate by plaintext password equality and, on success, bind the
    /// account to the given connection token and mark it online.
    pub fn sign_in(&self, name: &str, password: &str, token: usize) -> SignInOutcome {
        let mut users = self.lock();
        match users.get_mut(name) {
            None => SignInOutcome::UnknownAccount,
            Some(account) if account.password != password => SignInOutcome::WrongPassword,
            Some(account) => {
                account.token = Some(token);
                account.online = true;
                SignInOutcome::Success
            }
        }
    }

    /// Snapshot of all online account names, sorted for stable listings.
    pub fn online_users(&self) -> Vec<String> {
        let users = self.lock();
        let mut names: Vec<String> = users
            .iter()
            .filter(|(_, account)| account.online)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// The connection token of an online account, if any.
    pub fn online_token(&self, name: &str) -> Option<usize> {
        let users = self.lock();
        users
            .get(name)
            .filter(|account| account.online)
            .and_then(|account| account.token)
    }

    /// Resolve the account name signed in on the given connection.
    pub fn name_of(&self, token: usize) -> Option<String> {
        let users = self.lock();
        users
            .iter()
            .find(|(_, account)| account.online && account.token == Some(token))
            .map(|(name, _)| name.clone())
    }

    /// Mark the account bound to `token` offline, if any. The account record
    /// survives, so re-sign-in on a new connection works. A no-op when the
    /// account has already been rebound to another connection.
    pub fn mark_offline(&self, token: usize) {
        let mut users = self.lock();
        if let Some(account) = users
            .values_mut()
            .find(|account| account.token == Some(token))
        {
            account.online = false;
            account.token = None;
        }
    }
}

/// Rooms keyed by name; a `BTreeMap` so listings come out sorted.
///
/// Member lists may reference offline users — membership survives
/// disconnects, and broadcast filters to online members at send time.
/// Rooms, once created, are never deleted.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<BTreeMap<String, Vec<String>>>,
}

impl RoomRegistry {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<String>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty room. Fails if the name is taken.
    pub fn create(&self, name: &str) -> bool {
        let mut rooms = self.lock();
        if rooms.contains_key(name) {
            return false;
        }
        rooms.insert(name.to_string(), Vec::new());
        true
    }

    /// Snapshot of all room names, in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Snapshot of a room's member list.
    pub fn members(&self, name: &str) -> Option<Vec<String>> {
        self.lock().get(name).cloned()
    }
}

/// The combined view over both registries.
///
/// Every operation that must hold both locks lives here and acquires them
/// sessions-first, making the deadlock-avoidance order a property of the API
/// instead of caller discipline.
#[derive(Default)]
pub struct Directory {
    pub sessions: SessionRegistry,
    pub rooms: RoomRegistry,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the caller to a room's member list.
    ///
    /// Fails if the caller is not signed in or the room does not exist.
    /// Duplicate membership entries are allowed by design.
    pub fn enter_room(&self, token: usize, room: &str) -> bool {
        let users = self.sessions.lock();
        let mut rooms = self.rooms.lock();

        let Some(name) = signed_in_name(&users, token) else {
            return false;
        };
        match rooms.get_mut(room) {
            Some(members) => {
                members.push(name);
                true
            }
            None => false,
        }
    }

    /// Remove the caller's first matching membership entry from a room.
    ///
    /// Fails if the caller is not signed in, the room does not exist, or the
    /// caller is not a member.
    pub fn quit_room(&self, token: usize, room: &str) -> bool {
        let users = self.sessions.lock();
        let mut rooms = self.rooms.lock();

        let Some(name) = signed_in_name(&users, token) else {
            return false;
        };
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        match members.iter().position(|member| *member == name) {
            Some(index) => {
                members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Resolve a room broadcast: the sender's name plus the connection
    /// tokens of every currently-online member (the sender included, if a
    /// member). Returns `None` if the sender is not signed in or the room
    /// does not exist.
    pub fn group_targets(&self, sender: usize, room: &str) -> Option<(String, Vec<usize>)> {
        let users = self.sessions.lock();
        let rooms = self.rooms.lock();

        let sender_name = signed_in_name(&users, sender)?;
        let members = rooms.get(room)?;
        let targets = members
            .iter()
            .filter_map(|member| {
                users
                    .get(member)
                    .filter(|account| account.online)
                    .and_then(|account| account.token)
            })
            .collect();
        Some((sender_name, targets))
    }
}

fn signed_in_name(users: &HashMap<String, Account>, token: usize) -> Option<String> {
    users
        .iter()
        .find(|(_, account)| account.online && account.token == Some(token))
        .map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_enforces_name_uniqueness() {
        let sessions = SessionRegistry::default();
        assert!(sessions.sign_up("alice", "pw1"));
        assert!(!sessions.sign_up("alice", "other"));

        // The failed attempt must not have mutated the original account.
        assert_eq!(sessions.sign_in("alice", "pw1", 1), SignInOutcome::Success);
    }

    #[test]
    fn sign_in_is_three_way() {
        let sessions = SessionRegistry::default();
        sessions.sign_up("alice", "pw1");

        assert_eq!(
            sessions.sign_in("nobody", "pw", 1),
            SignInOutcome::UnknownAccount
        );
        assert_eq!(
            sessions.sign_in("alice", "wrong", 1),
            SignInOutcome::WrongPassword
        );
        assert_eq!(sessions.sign_in("alice", "pw1", 1), SignInOutcome::Success);
        assert_eq!(sessions.online_token("alice"), Some(1));
        assert_eq!(sessions.name_of(1).as_deref(), Some("alice"));
    }

    #[test]
    fn mark_offline_keeps_the_account() {
        let sessions = SessionRegistry::default();
        sessions.sign_up("alice", "pw1");
        sessions.sign_in("alice", "pw1", 1);

        sessions.mark_offline(1);
        assert_eq!(sessions.online_token("alice"), None);
        assert!(sessions.online_users().is_empty());

        // Re-sign-in on a new connection works.
        assert_eq!(sessions.sign_in("alice", "pw1", 9), SignInOutcome::Success);
        assert_eq!(sessions.online_token("alice"), Some(9));
    }

    #[test]
    fn mark_offline_ignores_a_rebound_account() {
        let sessions = SessionRegistry::default();
        sessions.sign_up("alice", "pw1");
        sessions.sign_in("alice", "pw1", 1);
        // Same user signs in again from a fresh connection.
        sessions.sign_in("alice", "pw1", 2);

        // Releasing the stale connection must not knock the account offline.
        sessions.mark_offline(1);
        assert_eq!(sessions.online_token("alice"), Some(2));
    }

    #[test]
    fn online_listing_is_sorted() {
        let sessions = SessionRegistry::default();
        for (name, token) in [("carol", 3), ("alice", 1), ("bob", 2)] {
            sessions.sign_up(name, "pw");
            sessions.sign_in(name, "pw", token);
        }
        assert_eq!(sessions.online_users(), ["alice", "bob", "carol"]);
    }

    #[test]
    fn room_creation_enforces_name_uniqueness() {
        let rooms = RoomRegistry::default();
        assert!(rooms.create("lobby"));
        assert!(!rooms.create("lobby"));
        assert_eq!(rooms.names(), ["lobby"]);
    }

    fn directory_with(users: &[(&str, usize)]) -> Directory {
        let directory = Directory::new();
        for (name, token) in users {
            directory.sessions.sign_up(name, "pw");
            directory.sessions.sign_in(name, "pw", *token);
        }
        directory
    }

    #[test]
    fn entering_a_missing_room_fails_without_mutation() {
        let directory = directory_with(&[("alice", 1)]);
        assert!(!directory.enter_room(1, "nowhere"));
        assert_eq!(directory.rooms.names(), Vec::<String>::new());
    }

    #[test]
    fn entering_appends_once_per_call_and_allows_duplicates() {
        let directory = directory_with(&[("alice", 1)]);
        directory.rooms.create("lobby");

        assert!(directory.enter_room(1, "lobby"));
        assert!(directory.enter_room(1, "lobby"));
        assert_eq!(
            directory.rooms.members("lobby").unwrap(),
            ["alice", "alice"]
        );
    }

    #[test]
    fn quitting_removes_at_most_one_entry() {
        let directory = directory_with(&[("alice", 1)]);
        directory.rooms.create("lobby");
        directory.enter_room(1, "lobby");
        directory.enter_room(1, "lobby");

        assert!(directory.quit_room(1, "lobby"));
        assert_eq!(directory.rooms.members("lobby").unwrap(), ["alice"]);

        assert!(directory.quit_room(1, "lobby"));
        assert!(!directory.quit_room(1, "lobby"));
    }

    #[test]
    fn unsigned_callers_cannot_touch_rooms() {
        let directory = Directory::new();
        directory.rooms.create("lobby");
        assert!(!directory.enter_room(42, "lobby"));
        assert!(!directory.quit_room(42, "lobby"));
    }

    #[test]
    fn group_targets_filters_to_online_members() {
        let directory = directory_with(&[("alice", 1), ("bob", 2), ("carol", 3)]);
        directory.rooms.create("lobby");
        directory.enter_room(1, "lobby");
        directory.enter_room(2, "lobby");
        directory.enter_room(3, "lobby");

        directory.sessions.mark_offline(3);

        let (sender, targets) = directory.group_targets(1, "lobby").unwrap();
        assert_eq!(sender, "alice");
        assert_eq!(targets, [1, 2]);
    }

    #[test]
    fn group_targets_requires_an_existing_room() {
        let directory = directory_with(&[("alice", 1)]);
        assert_eq!(directory.group_targets(1, "nowhere"), None);
    }
}
