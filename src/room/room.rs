//! Room aggregate: membership, ownership and the game behind one lock

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use crate::game::{Color, Game, GameStatus, PhaseConfig, Position, Rule};
use crate::store::RoomRecord;
use crate::user::{Role, User, UserId};

use super::auth::{authorize, Action, Caller, Permit};
use super::snapshot::{RoomInfo, RoomSnapshot, RoomView, UserView};
use super::{RoomError, RoomId};

/// A room. Every method locks the room for its whole body; nothing here
/// performs I/O.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    inner: RwLock<RoomInner>,
    /// Serializes mutate-then-publish sequences, see [`Room::publish_lock`]
    publish: Mutex<()>,
}

#[derive(Debug)]
struct RoomInner {
    name: String,
    password: String,
    owner_id: Option<UserId>,
    game: Game,
    members: HashMap<UserId, UserView>,
    /// Join order, oldest first
    order: Vec<UserId>,
    /// Set while the room has no members
    empty_since: Option<Instant>,
    /// Evicted; no one may join anymore
    closed: bool,
    /// Bumped by every write; persisted records carry it
    revision: u64,
}

/// Result of a member leaving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub remaining: usize,
    /// Set when ownership moved to another member
    pub new_owner: Option<UserId>,
}

impl Room {
    /// New, empty room with a waiting normal game
    pub fn new(id: RoomId, name: String, password: String) -> Self {
        Self::with_game(id, name, password, Game::new(Rule::default()))
    }

    /// Rebuild a persisted room. It starts empty and ownerless.
    pub fn restore(record: RoomRecord) -> Self {
        let room = Self::with_game(record.id, record.name, record.password, record.game);
        room.inner.write().revision = record.revision;
        room
    }

    fn with_game(id: RoomId, name: String, password: String, game: Game) -> Self {
        Self {
            id,
            publish: Mutex::new(()),
            inner: RwLock::new(RoomInner {
                name,
                password,
                owner_id: None,
                game,
                members: HashMap::new(),
                order: Vec::new(),
                empty_since: Some(Instant::now()),
                closed: false,
                revision: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Held across a mutation and the fan-out of its snapshot so members
    /// and the store observe states in commit order. Taken before the room
    /// lock; never held while waiting on I/O.
    pub fn publish_lock(&self) -> MutexGuard<'_, ()> {
        self.publish.lock()
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoomInner> {
        let mut inner = self.inner.write();
        inner.revision += 1;
        inner
    }

    /// Check the password and add the user in one step. The user lands as a
    /// spectator, or as owner and referee when the room is empty.
    pub fn join(&self, user: &User, password: &str) -> Result<(), RoomError> {
        let mut inner = self.write();
        if inner.closed {
            return Err(RoomError::RoomClosed);
        }
        if !inner.password_matches(password) {
            return Err(RoomError::WrongPassword);
        }
        inner.add(user);
        Ok(())
    }

    /// Add a user without a password check (room creator)
    pub fn add_user(&self, user: &User) -> Result<(), RoomError> {
        let mut inner = self.write();
        if inner.closed {
            return Err(RoomError::RoomClosed);
        }
        inner.add(user);
        Ok(())
    }

    /// Remove a member, handing ownership to the oldest remaining member
    pub fn remove_user(&self, user_id: &str) -> Option<Departure> {
        let mut inner = self.write();
        inner.members.remove(user_id)?;
        inner.order.retain(|id| id != user_id);

        let mut new_owner = None;
        if inner.order.is_empty() {
            inner.owner_id = None;
            inner.empty_since = Some(Instant::now());
        } else if inner.owner_id.as_deref() == Some(user_id) {
            let next = inner.order[0].clone();
            if let Some(member) = inner.members.get_mut(&next) {
                member.role = Role::Referee;
                member.player_color = Color::None;
            }
            inner.owner_id = Some(next.clone());
            new_owner = Some(next);
        }

        Some(Departure {
            remaining: inner.order.len(),
            new_owner,
        })
    }

    pub fn set_user_role(
        &self,
        caller_id: &str,
        target_id: &str,
        role: Role,
        color: Color,
    ) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::SetRole { target: target_id })?;

        if !inner.members.contains_key(target_id) {
            return Err(RoomError::UserNotFound);
        }
        let color = match role {
            Role::Player if color.is_none() => return Err(RoomError::PlayerNeedsColor),
            Role::Player => color,
            Role::Spectator | Role::Referee => Color::None,
        };
        if !color.is_none()
            && inner
                .members
                .values()
                .any(|m| m.id != target_id && m.player_color == color)
        {
            return Err(RoomError::PlayerAlreadySet);
        }

        if let Some(target) = inner.members.get_mut(target_id) {
            target.role = role;
            target.player_color = color;
        }
        Ok(())
    }

    pub fn set_password(&self, caller_id: &str, password: String) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::ManageRoom)?;
        inner.password = password;
        Ok(())
    }

    pub fn check_password(&self, password: &str) -> bool {
        self.inner.read().password_matches(password)
    }

    /// Replace the game with a fresh one under the new rule
    pub fn set_game_rule(
        &self,
        caller_id: &str,
        rule: Rule,
        config: PhaseConfig,
    ) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::ManageRoom)?;
        if inner.game.status == GameStatus::Playing {
            return Err(RoomError::GameInProgress);
        }
        inner.game = Game::with_config(rule, config);
        Ok(())
    }

    pub fn start_game(&self, caller_id: &str) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::ManageRoom)?;
        inner.game.start()?;
        Ok(())
    }

    pub fn reset_game(&self, caller_id: &str) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::ManageRoom)?;
        inner.game.reset();
        Ok(())
    }

    pub fn set_cell_text(&self, caller_id: &str, pos: Position, text: String) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize_texts(caller_id)?;
        inner.game.set_cell_text(pos, text);
        Ok(())
    }

    pub fn set_all_cell_texts(&self, caller_id: &str, texts: Vec<String>) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize_texts(caller_id)?;
        inner.game.set_all_cell_texts(texts)?;
        Ok(())
    }

    pub fn mark_cell(&self, caller_id: &str, pos: Position, color: Color) -> Result<(), RoomError> {
        let mut inner = self.write();
        match inner.authorize(caller_id, Action::Mark { color })? {
            Permit::ForceMark => inner.game.mark_cell_force(pos, color)?,
            Permit::Granted => inner.game.mark_cell(pos, color)?,
        }
        Ok(())
    }

    pub fn unmark_cell(&self, caller_id: &str, pos: Position) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::Unmark)?;
        inner.game.unmark_cell(pos)?;
        Ok(())
    }

    pub fn clear_cell_mark(&self, caller_id: &str, pos: Position, color: Color) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::ClearMark { color })?;
        inner.game.clear_cell_mark(pos, color)?;
        Ok(())
    }

    pub fn settle(&self, caller_id: &str, color: Color) -> Result<(), RoomError> {
        let mut inner = self.write();
        inner.authorize(caller_id, Action::Settle { color })?;
        inner.game.settle(color)?;
        Ok(())
    }

    /// Consistent state for broadcast
    pub fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.read();
        RoomSnapshot {
            room: RoomView {
                id: self.id.clone(),
                name: inner.name.clone(),
                owner_id: inner.owner_id.clone(),
                has_password: !inner.password.is_empty(),
            },
            game: inner.game.clone(),
            users: inner
                .order
                .iter()
                .filter_map(|id| inner.members.get(id).cloned())
                .collect(),
        }
    }

    /// Persistable part of the room. Members are not included.
    pub fn record(&self) -> RoomRecord {
        let inner = self.inner.read();
        RoomRecord {
            id: self.id.clone(),
            name: inner.name.clone(),
            password: inner.password.clone(),
            game: inner.game.clone(),
            revision: inner.revision,
            saved_at: Utc::now(),
        }
    }

    pub fn info(&self) -> RoomInfo {
        let inner = self.inner.read();
        RoomInfo {
            id: self.id.clone(),
            name: inner.name.clone(),
            has_password: !inner.password.is_empty(),
            player_count: inner.members.len(),
            owner_name: inner
                .owner_id
                .as_ref()
                .and_then(|id| inner.members.get(id))
                .map(|m| m.name.clone()),
            rule: inner.game.rule,
            status: inner.game.status,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the room if it has been empty for at least `ttl`. A closed room
    /// refuses every later join.
    pub fn close_if_idle(&self, ttl: Duration, now: Instant) -> bool {
        let mut inner = self.inner.write();
        let idle = matches!(inner.empty_since, Some(since) if now.saturating_duration_since(since) >= ttl);
        if idle && inner.members.is_empty() {
            inner.closed = true;
        }
        inner.closed
    }
}

impl RoomInner {
    fn add(&mut self, user: &User) {
        if self.members.contains_key(&user.id) {
            return;
        }

        let becomes_owner = self.members.is_empty();
        let role = if becomes_owner { Role::Referee } else { Role::Spectator };
        self.members.insert(
            user.id.clone(),
            UserView {
                id: user.id.clone(),
                name: user.name.clone(),
                role,
                player_color: Color::None,
            },
        );
        self.order.push(user.id.clone());
        if becomes_owner {
            self.owner_id = Some(user.id.clone());
        }
        self.empty_since = None;
    }

    fn password_matches(&self, password: &str) -> bool {
        self.password.is_empty() || self.password == password
    }

    fn authorize(&self, caller_id: &str, action: Action<'_>) -> Result<Permit, RoomError> {
        let member = self.members.get(caller_id).ok_or(RoomError::UserNotFound)?;
        let caller = Caller {
            id: caller_id,
            role: member.role,
            color: member.player_color,
            is_owner: self.owner_id.as_deref() == Some(caller_id),
        };
        authorize(&caller, action, self.game.rule)
    }

    fn authorize_texts(&self, caller_id: &str) -> Result<(), RoomError> {
        self.authorize(caller_id, Action::ManageRoom)?;
        if self.game.status != GameStatus::Waiting {
            return Err(RoomError::TextsLocked);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::game::GameError;
    use crate::user::UserRegistry;

    fn pos(row: usize, col: usize) -> Position {
        Position::new(row as i64, col as i64).unwrap()
    }

    fn room_with(users: &UserRegistry, count: usize) -> (Room, Vec<User>) {
        let room = Room::new("abcd1234".into(), "test".into(), String::new());
        let members: Vec<User> = (0..count).map(|_| users.register()).collect();
        for user in &members {
            room.add_user(user).unwrap();
        }
        (room, members)
    }

    #[test]
    fn first_member_becomes_owner_and_referee() {
        let users = UserRegistry::new();
        let (room, members) = room_with(&users, 2);
        let snapshot = room.snapshot();

        assert_eq!(snapshot.room.owner_id.as_deref(), Some(members[0].id.as_str()));
        assert_eq!(snapshot.users[0].role, Role::Referee);
        assert_eq!(snapshot.users[1].role, Role::Spectator);
    }

    #[test]
    fn owner_departure_promotes_next_oldest() {
        let users = UserRegistry::new();
        let (room, members) = room_with(&users, 3);
        room.set_user_role(&members[0].id, &members[1].id, Role::Player, Color::Red)
            .unwrap();

        let departure = room.remove_user(&members[0].id).unwrap();
        assert_eq!(departure.remaining, 2);
        assert_eq!(departure.new_owner.as_deref(), Some(members[1].id.as_str()));

        let snapshot = room.snapshot();
        let promoted = &snapshot.users[0];
        assert_eq!(promoted.id, members[1].id);
        assert_eq!((promoted.role, promoted.player_color), (Role::Referee, Color::None));
        room.start_game(&members[1].id).unwrap();
    }

    #[test]
    fn last_departure_leaves_room_ownerless() {
        let users = UserRegistry::new();
        let (room, members) = room_with(&users, 1);

        assert_eq!(room.remove_user(&members[0].id).unwrap().remaining, 0);
        assert!(room.is_empty());
        assert_eq!(room.snapshot().room.owner_id, None);
        assert!(room.remove_user(&members[0].id).is_none());
    }

    #[test]
    fn player_colors_are_unique() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 3);

        room.set_user_role(&m[1].id, &m[1].id, Role::Player, Color::Red).unwrap();
        assert_eq!(
            room.set_user_role(&m[2].id, &m[2].id, Role::Player, Color::Red),
            Err(RoomError::PlayerAlreadySet)
        );
        assert_eq!(
            room.set_user_role(&m[2].id, &m[2].id, Role::Player, Color::None),
            Err(RoomError::PlayerNeedsColor)
        );
        // Re-assigning the holder's own color is fine
        room.set_user_role(&m[0].id, &m[1].id, Role::Player, Color::Red).unwrap();
    }

    #[test]
    fn only_owner_sets_others_roles() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 3);

        assert_eq!(
            room.set_user_role(&m[1].id, &m[2].id, Role::Referee, Color::None),
            Err(RoomError::NotOwner)
        );
        assert_eq!(
            room.set_user_role(&m[0].id, "nobody", Role::Referee, Color::None),
            Err(RoomError::UserNotFound)
        );
    }

    #[test]
    fn management_is_owner_only() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 2);

        assert_eq!(room.start_game(&m[1].id), Err(RoomError::NotOwner));
        assert_eq!(room.set_password(&m[1].id, "x".into()), Err(RoomError::NotOwner));
        assert_eq!(
            room.set_game_rule(&m[1].id, Rule::Phase, PhaseConfig::default()),
            Err(RoomError::NotOwner)
        );

        room.set_password(&m[0].id, "secret".into()).unwrap();
        assert!(!room.check_password("nope"));
        assert!(room.check_password("secret"));
    }

    #[test]
    fn rule_change_replaces_game_and_is_blocked_while_playing() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        let owner = &m[0].id;

        room.set_all_cell_texts(owner, vec!["goal".into(); 25]).unwrap();
        room.set_game_rule(owner, Rule::Phase, PhaseConfig::default()).unwrap();
        let game = room.snapshot().game;
        assert_eq!(game.rule, Rule::Phase);
        assert_eq!(game.board.cell(pos(0, 0)).text, "");

        room.start_game(owner).unwrap();
        assert_eq!(
            room.set_game_rule(owner, Rule::Normal, PhaseConfig::default()),
            Err(RoomError::GameInProgress)
        );
        assert_eq!(
            room.set_cell_text(owner, pos(0, 0), "late".into()),
            Err(RoomError::TextsLocked)
        );
    }

    #[test]
    fn referee_overwrites_under_normal_rule() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 2);
        let referee = &m[0].id;
        room.set_user_role(referee, &m[1].id, Role::Player, Color::Red).unwrap();
        room.start_game(referee).unwrap();

        room.mark_cell(&m[1].id, pos(0, 0), Color::Red).unwrap();
        room.mark_cell(referee, pos(0, 0), Color::Blue).unwrap();
        assert_eq!(room.snapshot().game.board.cell(pos(0, 0)).marked_by, Color::Blue);
    }

    #[test]
    fn referee_is_constrained_under_phase_rule() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        let referee = &m[0].id;
        room.set_game_rule(referee, Rule::Phase, PhaseConfig::default()).unwrap();
        room.start_game(referee).unwrap();

        assert_eq!(
            room.mark_cell(referee, pos(1, 0), Color::Red),
            Err(RoomError::Game(GameError::RowLocked))
        );
        room.mark_cell(referee, pos(0, 0), Color::Red).unwrap();
        assert_eq!(
            room.mark_cell(referee, pos(0, 0), Color::Red),
            Err(RoomError::Game(GameError::AlreadyClaimed))
        );
    }

    #[test]
    fn board_permissions_by_role() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 3);
        let referee = &m[0].id;
        room.set_user_role(referee, &m[1].id, Role::Player, Color::Blue).unwrap();
        room.start_game(referee).unwrap();

        assert_eq!(
            room.mark_cell(&m[2].id, pos(0, 0), Color::Red),
            Err(RoomError::SpectatorForbidden)
        );
        assert_eq!(
            room.mark_cell(&m[1].id, pos(0, 0), Color::Red),
            Err(RoomError::WrongColor)
        );
        room.mark_cell(&m[1].id, pos(0, 0), Color::Blue).unwrap();
        assert_eq!(room.unmark_cell(&m[1].id, pos(0, 0)), Err(RoomError::NotReferee));
        room.unmark_cell(referee, pos(0, 0)).unwrap();
        assert_eq!(room.mark_cell("stranger", pos(0, 0), Color::Red), Err(RoomError::UserNotFound));
    }

    #[test]
    fn failed_operation_leaves_state_unchanged() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        room.start_game(&m[0].id).unwrap();
        room.mark_cell(&m[0].id, pos(2, 2), Color::Red).unwrap();
        let before = room.snapshot();

        assert!(room.settle(&m[0].id, Color::Red).is_err());
        assert!(room.start_game(&m[0].id).is_err());
        assert_eq!(room.snapshot(), before);
    }

    #[test]
    fn records_carry_increasing_revisions() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        let before = room.record().revision;

        room.start_game(&m[0].id).unwrap();
        let after = room.record().revision;
        assert!(after > before);
        assert_eq!(room.record().revision, after);
    }

    #[test]
    fn idle_room_closes_and_rejects_joins() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        let ttl = Duration::from_secs(60);

        assert!(!room.close_if_idle(ttl, Instant::now() + ttl));
        room.remove_user(&m[0].id);
        assert!(!room.close_if_idle(ttl, Instant::now()));
        assert!(room.close_if_idle(ttl, Instant::now() + ttl));

        let late = users.register();
        assert_eq!(room.join(&late, ""), Err(RoomError::RoomClosed));
    }

    #[test]
    fn join_checks_password() {
        let users = UserRegistry::new();
        let room = Room::new("abcd1234".into(), "locked".into(), "pw".into());
        let user = users.register();

        assert_eq!(room.join(&user, "wrong"), Err(RoomError::WrongPassword));
        assert!(room.is_empty());
        room.join(&user, "pw").unwrap();
        assert_eq!(room.info().owner_name.as_deref(), Some(user.name.as_str()));
    }

    #[test]
    fn restored_room_keeps_game_and_starts_ownerless() {
        let mut game = Game::new(Rule::Blackout);
        game.start().unwrap();
        let record = RoomRecord {
            id: "00ff00ff".into(),
            name: "saved".into(),
            password: "pw".into(),
            game: game.clone(),
            revision: 41,
            saved_at: Utc::now(),
        };

        let room = Room::restore(record);
        let snapshot = room.snapshot();
        assert_eq!(snapshot.game, game);
        assert_eq!(room.record().revision, 41);
        assert!(snapshot.users.is_empty());
        assert_eq!(snapshot.room.owner_id, None);
        assert!(snapshot.room.has_password);
    }

    #[test]
    fn concurrent_marks_on_distinct_cells_are_all_kept() {
        let users = UserRegistry::new();
        let (room, m) = room_with(&users, 1);
        let referee = m[0].id.clone();
        room.set_game_rule(&referee, Rule::Blackout, PhaseConfig::default()).unwrap();
        room.start_game(&referee).unwrap();
        let room = Arc::new(room);

        let handles: Vec<_> = (0..5)
            .map(|row| {
                let room = room.clone();
                let referee = referee.clone();
                thread::spawn(move || {
                    for col in 0..5 {
                        room.mark_cell(&referee, pos(row, col), Color::Blue).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let game = room.snapshot().game;
        assert_eq!(game.board.claim_counts(), (0, 25));
        assert!(game.is_finished());
    }
}
