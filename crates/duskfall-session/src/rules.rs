//! Game rules: role deck, win condition, vote tally, and the per-phase
//! command collectors.
//!
//! Everything here is synchronous and owned by a single engine task. The
//! engine feeds commands in; the collectors validate them against the
//! current [`GameState`] and report when their quorum is met.

use std::collections::{HashMap, HashSet};

use duskfall_protocol::{Command, Role, Username};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Phase, SessionError};

/// The only session size with a defined role mix.
pub const SESSION_SIZE: usize = 4;

/// Returns the unshuffled role mix for `capacity` participants.
///
/// # Errors
/// Returns [`SessionError::UnsupportedCapacity`] for anything but four.
pub fn role_deck(capacity: usize) -> Result<Vec<Role>, SessionError> {
    if capacity != SESSION_SIZE {
        return Err(SessionError::UnsupportedCapacity(capacity));
    }
    Ok(vec![Role::Mafia, Role::Detective, Role::Civilian, Role::Civilian])
}

/// Decides the game from the alive head count.
///
/// No Mafia left means the Civilians won; Mafia at parity or better means
/// the Mafia won; anything else continues.
pub fn evaluate_win(alive_mafia: usize, alive_others: usize) -> Option<Role> {
    if alive_mafia == 0 {
        Some(Role::Civilian)
    } else if alive_mafia >= alive_others {
        Some(Role::Mafia)
    } else {
        None
    }
}

/// Picks the player to eliminate from `(voter, target)` pairs in cast
/// order.
///
/// The highest count wins. Among tied candidates, the one whose first vote
/// was cast earliest is chosen. Returns `None` when no votes were cast.
pub fn tally_votes(votes: &[(Username, Username)]) -> Option<Username> {
    // target -> (count, index of its first vote)
    let mut counts: HashMap<&Username, (usize, usize)> = HashMap::new();
    for (cast, (_, target)) in votes.iter().enumerate() {
        counts.entry(target).or_insert((0, cast)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
            a_count.cmp(b_count).then(b_first.cmp(a_first))
        })
        .map(|(target, _)| target.clone())
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Roles and the alive set of one session.
///
/// The seat order is fixed at creation; roles are indexed by seat and
/// never change. The alive set only shrinks.
#[derive(Debug, Clone)]
pub struct GameState {
    seats: Vec<Username>,
    roles: Vec<Role>,
    alive: HashSet<Username>,
}

impl GameState {
    /// Shuffles the role deck for `seats` and deals it by position.
    ///
    /// Usernames are assumed unique within a batch. Duplicates share one
    /// alive entry, and only the first of their seats is ever consulted
    /// for a role.
    ///
    /// # Errors
    /// Returns [`SessionError::UnsupportedCapacity`] if there is no role
    /// mix for this many seats.
    pub fn deal<R: Rng + ?Sized>(
        seats: Vec<Username>,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        let mut roles = role_deck(seats.len())?;
        roles.shuffle(rng);
        let alive = seats.iter().cloned().collect();
        Ok(Self {
            seats,
            roles,
            alive,
        })
    }

    /// Participants with their roles, in seat order.
    pub fn seats(&self) -> impl Iterator<Item = (&Username, Role)> {
        self.seats.iter().zip(self.roles.iter().copied())
    }

    /// The role dealt to `username`, if they are seated here.
    pub fn role_of(&self, username: &Username) -> Option<Role> {
        self.seats().find(|(u, _)| *u == username).map(|(_, r)| r)
    }

    /// Returns `true` if `username` was dealt into this session.
    pub fn is_participant(&self, username: &Username) -> bool {
        self.seats.contains(username)
    }

    /// Returns `true` if `username` has not been eliminated.
    pub fn is_alive(&self, username: &Username) -> bool {
        self.alive.contains(username)
    }

    /// Alive participants in seat order.
    pub fn alive_list(&self) -> Vec<Username> {
        self.seats
            .iter()
            .filter(|u| self.alive.contains(*u))
            .cloned()
            .collect()
    }

    /// Removes `username` from the alive set. Returns `false` if they were
    /// already dead or never seated.
    pub fn eliminate(&mut self, username: &Username) -> bool {
        self.alive.remove(username)
    }

    /// `(alive Mafia, alive everyone else)`.
    pub fn alive_counts(&self) -> (usize, usize) {
        self.seats()
            .filter(|(u, _)| self.alive.contains(*u))
            .fold((0, 0), |(mafia, others), (_, role)| match role {
                Role::Mafia => (mafia + 1, others),
                _ => (mafia, others + 1),
            })
    }

    /// The winning side, if the game is decided.
    pub fn winner(&self) -> Option<Role> {
        let (mafia, others) = self.alive_counts();
        evaluate_win(mafia, others)
    }

    fn alive_night_actors(&self) -> HashSet<Username> {
        self.seats()
            .filter(|(u, role)| role.acts_at_night() && self.alive.contains(*u))
            .map(|(u, _)| u.clone())
            .collect()
    }

    fn require_alive_target(&self, target: &Username) -> Result<(), SessionError> {
        if self.is_alive(target) {
            Ok(())
        } else {
            Err(SessionError::InvalidTarget(target.clone()))
        }
    }

    fn require_alive_sender(&self, username: &Username) -> Result<(), SessionError> {
        if self.is_alive(username) {
            Ok(())
        } else {
            Err(SessionError::NotAlive(username.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// A phase's command collector.
///
/// The engine has already checked that the sender is seated and that the
/// command kind matches the phase; collectors check everything that
/// depends on the game state.
pub trait Quorum {
    /// Validates and records one command.
    fn record(
        &mut self,
        game: &GameState,
        username: &Username,
        command: Command,
    ) -> Result<(), SessionError>;

    /// Returns `true` once every expected participant has acted.
    fn is_complete(&self) -> bool;

    /// Expected participants that have not acted yet.
    fn missing(&self) -> Vec<Username>;
}

/// The first day and night: every participant passes once.
#[derive(Debug)]
pub struct PassBarrier {
    expected: HashSet<Username>,
    passed: HashSet<Username>,
}

impl PassBarrier {
    /// A barrier over every seat, dead or alive.
    pub fn new(game: &GameState) -> Self {
        Self {
            expected: game.seats.iter().cloned().collect(),
            passed: HashSet::new(),
        }
    }
}

impl Quorum for PassBarrier {
    fn record(
        &mut self,
        _game: &GameState,
        username: &Username,
        _command: Command,
    ) -> Result<(), SessionError> {
        // repeats are deduplicated, not rejected
        self.passed.insert(username.clone());
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.passed.len() >= self.expected.len()
    }

    fn missing(&self) -> Vec<Username> {
        self.expected.difference(&self.passed).cloned().collect()
    }
}

/// A day vote: one vote from every alive participant.
#[derive(Debug)]
pub struct VoteBallot {
    voters: HashSet<Username>,
    votes: Vec<(Username, Username)>,
}

impl VoteBallot {
    /// A ballot open to everyone alive right now.
    pub fn new(game: &GameState) -> Self {
        Self {
            voters: game.alive.clone(),
            votes: Vec::new(),
        }
    }

    /// The votes in the order they were cast.
    pub fn votes(&self) -> &[(Username, Username)] {
        &self.votes
    }

    /// The player to eliminate. Missing voters abstain.
    pub fn tally(&self) -> Option<Username> {
        tally_votes(&self.votes)
    }
}

impl Quorum for VoteBallot {
    fn record(
        &mut self,
        game: &GameState,
        username: &Username,
        command: Command,
    ) -> Result<(), SessionError> {
        let target = match command {
            Command::Vote { target } => target,
            other => {
                return Err(SessionError::WrongPhase {
                    phase: Phase::DayVote,
                    command: other.kind(),
                });
            }
        };
        game.require_alive_sender(username)?;
        if self.votes.iter().any(|(voter, _)| voter == username) {
            return Err(SessionError::AlreadyActed(username.clone()));
        }
        game.require_alive_target(&target)?;

        self.votes.push((username.clone(), target));
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.votes.len() >= self.voters.len()
    }

    fn missing(&self) -> Vec<Username> {
        self.voters
            .iter()
            .filter(|v| !self.votes.iter().any(|(voter, _)| voter == *v))
            .cloned()
            .collect()
    }
}

/// What the night changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NightOutcome {
    /// The Mafia's victim, now removed from the alive set.
    pub killed: Option<Username>,
    /// Set when the Detective checked the Mafia.
    pub revealed: Option<Username>,
}

/// Night actions after the first night: one from each alive Mafia and
/// Detective, applied together once all are in.
#[derive(Debug)]
pub struct NightActions {
    actors: HashSet<Username>,
    acted: HashSet<Username>,
    kill: Option<Username>,
    check: Option<Username>,
}

impl NightActions {
    /// Collects from the alive Mafia and Detective.
    pub fn new(game: &GameState) -> Self {
        Self {
            actors: game.alive_night_actors(),
            acted: HashSet::new(),
            kill: None,
            check: None,
        }
    }

    /// Applies the collected actions to `game`. Forfeited actions do
    /// nothing.
    pub fn resolve(self, game: &mut GameState) -> NightOutcome {
        let revealed = self
            .check
            .filter(|target| game.role_of(target) == Some(Role::Mafia));
        let killed = self.kill.filter(|target| game.eliminate(target));
        NightOutcome { killed, revealed }
    }
}

impl Quorum for NightActions {
    fn record(
        &mut self,
        game: &GameState,
        username: &Username,
        command: Command,
    ) -> Result<(), SessionError> {
        game.require_alive_sender(username)?;
        let role = game.role_of(username);

        let (required, target) = match command {
            Command::Kill { target } => (Role::Mafia, target),
            Command::Check { target } => (Role::Detective, target),
            other => {
                return Err(SessionError::WrongPhase {
                    phase: Phase::NightActions,
                    command: other.kind(),
                });
            }
        };
        if role != Some(required) {
            return Err(SessionError::WrongRole {
                username: username.clone(),
                required,
            });
        }
        if self.acted.contains(username) {
            return Err(SessionError::AlreadyActed(username.clone()));
        }
        game.require_alive_target(&target)?;

        match required {
            Role::Mafia => self.kill = Some(target),
            _ => self.check = Some(target),
        }
        self.acted.insert(username.clone());
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.acted.len() >= self.actors.len()
    }

    fn missing(&self) -> Vec<Username> {
        self.actors.difference(&self.acted).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn name(s: &str) -> Username {
        Username::from(s)
    }

    fn seats() -> Vec<Username> {
        ["a", "b", "c", "d"].into_iter().map(name).collect()
    }

    /// Deals until seat `mafia` holds the Mafia and `detective` the
    /// Detective.
    fn game_with(mafia: &str, detective: &str) -> GameState {
        for seed in 0.. {
            let game = GameState::deal(seats(), &mut StdRng::seed_from_u64(seed))
                .expect("four seats");
            if game.role_of(&name(mafia)) == Some(Role::Mafia)
                && game.role_of(&name(detective)) == Some(Role::Detective)
            {
                return game;
            }
        }
        unreachable!()
    }

    fn vote(target: &str) -> Command {
        Command::Vote {
            target: name(target),
        }
    }

    // -- deck and deal ----------------------------------------------------

    #[test]
    fn test_role_deck_four_has_one_mafia_one_detective() {
        let deck = role_deck(4).unwrap();
        assert_eq!(deck.iter().filter(|r| **r == Role::Mafia).count(), 1);
        assert_eq!(deck.iter().filter(|r| **r == Role::Detective).count(), 1);
        assert_eq!(deck.iter().filter(|r| **r == Role::Civilian).count(), 2);
    }

    #[test]
    fn test_deal_duplicate_usernames_collapse_to_first_seat() {
        let seats = ["a", "a", "c", "d"].into_iter().map(name).collect();
        let mut game = GameState::deal(seats, &mut StdRng::seed_from_u64(7))
            .expect("four seats");
        let first_role = game.seats().next().map(|(_, r)| r);

        assert_eq!(game.seats().count(), 4);
        assert_eq!(game.role_of(&name("a")), first_role);

        assert!(game.eliminate(&name("a")));
        assert_eq!(game.alive_list(), vec![name("c"), name("d")]);
    }

    #[test]
    fn test_role_deck_other_sizes_unsupported() {
        assert!(matches!(role_deck(3), Err(SessionError::UnsupportedCapacity(3))));
        assert!(matches!(role_deck(5), Err(SessionError::UnsupportedCapacity(5))));
    }

    #[test]
    fn test_deal_every_seat_eventually_gets_mafia() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut mafia_seats = HashSet::new();
        for _ in 0..200 {
            let game = GameState::deal(seats(), &mut rng).unwrap();
            let (mafia, _) = game.seats().find(|(_, r)| *r == Role::Mafia).unwrap();
            mafia_seats.insert(mafia.clone());
            assert_eq!(game.alive_counts(), (1, 3));
        }
        assert_eq!(mafia_seats.len(), 4);
    }

    // -- win condition ----------------------------------------------------

    #[test]
    fn test_evaluate_win_one_mafia_three_others_continues() {
        assert_eq!(evaluate_win(1, 3), None);
    }

    #[test]
    fn test_evaluate_win_no_mafia_civilians_win() {
        assert_eq!(evaluate_win(0, 2), Some(Role::Civilian));
    }

    #[test]
    fn test_evaluate_win_parity_mafia_wins() {
        assert_eq!(evaluate_win(1, 1), Some(Role::Mafia));
    }

    // -- tally ------------------------------------------------------------

    #[test]
    fn test_tally_votes_highest_count_eliminated() {
        let votes = vec![
            (name("a"), name("b")),
            (name("c"), name("b")),
            (name("d"), name("a")),
        ];
        assert_eq!(tally_votes(&votes), Some(name("b")));
    }

    #[test]
    fn test_tally_votes_tie_goes_to_earliest_cast() {
        let votes = vec![
            (name("a"), name("d")),
            (name("b"), name("c")),
            (name("c"), name("c")),
            (name("d"), name("d")),
        ];
        assert_eq!(tally_votes(&votes), Some(name("d")));
    }

    #[test]
    fn test_tally_votes_empty_eliminates_nobody() {
        assert_eq!(tally_votes(&[]), None);
    }

    // -- collectors -------------------------------------------------------

    #[test]
    fn test_pass_barrier_deduplicates_repeats() {
        let game = game_with("a", "b");
        let mut barrier = PassBarrier::new(&game);
        for who in ["a", "a", "b", "c"] {
            barrier.record(&game, &name(who), Command::Pass).unwrap();
        }
        assert!(!barrier.is_complete());
        assert_eq!(barrier.missing(), vec![name("d")]);

        barrier.record(&game, &name("d"), Command::Pass).unwrap();
        assert!(barrier.is_complete());
    }

    #[test]
    fn test_vote_ballot_rejects_dead_voter_and_dead_target() {
        let mut game = game_with("a", "b");
        game.eliminate(&name("d"));
        let mut ballot = VoteBallot::new(&game);

        assert!(matches!(
            ballot.record(&game, &name("d"), vote("a")),
            Err(SessionError::NotAlive(_))
        ));
        assert!(matches!(
            ballot.record(&game, &name("a"), vote("d")),
            Err(SessionError::InvalidTarget(_))
        ));
        assert!(ballot.votes().is_empty());
    }

    #[test]
    fn test_vote_ballot_second_vote_already_acted() {
        let game = game_with("a", "b");
        let mut ballot = VoteBallot::new(&game);
        ballot.record(&game, &name("c"), vote("a")).unwrap();

        let again = ballot.record(&game, &name("c"), vote("b"));

        assert!(matches!(again, Err(SessionError::AlreadyActed(_))));
        assert_eq!(ballot.votes().len(), 1);
    }

    #[test]
    fn test_night_actions_kill_from_civilian_rejected_without_mutation() {
        let game = game_with("a", "b");
        let mut night = NightActions::new(&game);

        let result = night.record(
            &game,
            &name("c"),
            Command::Kill { target: name("d") },
        );

        assert!(matches!(
            result,
            Err(SessionError::WrongRole {
                required: Role::Mafia,
                ..
            })
        ));
        let mut game = game;
        let outcome = night.resolve(&mut game);
        assert_eq!(outcome, NightOutcome::default());
        assert_eq!(game.alive_list().len(), 4);
    }

    #[test]
    fn test_night_actions_resolve_kills_and_reveals() {
        let mut game = game_with("a", "b");
        let mut night = NightActions::new(&game);
        night
            .record(&game, &name("a"), Command::Kill { target: name("c") })
            .unwrap();
        assert!(!night.is_complete());
        night
            .record(&game, &name("b"), Command::Check { target: name("a") })
            .unwrap();
        assert!(night.is_complete());

        let outcome = night.resolve(&mut game);

        assert_eq!(outcome.killed, Some(name("c")));
        assert_eq!(outcome.revealed, Some(name("a")));
        assert_eq!(game.alive_list(), vec![name("a"), name("b"), name("d")]);
    }

    #[test]
    fn test_night_actions_check_on_civilian_reveals_nothing() {
        let mut game = game_with("a", "b");
        let mut night = NightActions::new(&game);
        night
            .record(&game, &name("b"), Command::Check { target: name("d") })
            .unwrap();

        let outcome = night.resolve(&mut game);

        assert_eq!(outcome.revealed, None);
        assert_eq!(outcome.killed, None);
    }

    #[test]
    fn test_night_actions_dead_detective_not_expected() {
        let mut game = game_with("a", "b");
        game.eliminate(&name("b"));
        let night = NightActions::new(&game);
        assert_eq!(night.missing(), vec![name("a")]);
    }
}
