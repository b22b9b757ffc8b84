//! Round lifecycle state machine
//!
//! The server cycles QUEUE -> PLAYING -> ENDED forever. The machine is
//! synchronous and side-effect free: `advance` mutates the world on
//! phase transitions and hands back events for the async runner to
//! broadcast or persist.

use tracing::info;
use uuid::Uuid;

use crate::game::map::Map;
use crate::game::world::World;
use crate::ws::protocol::{Team, Winner};

/// Queue countdown once enough players are present
pub const QUEUE_SECS: f32 = 60.0;
/// Round duration
pub const ROUND_SECS: f32 = 120.0;
/// Results display window before the next queue
pub const ENDED_SECS: f32 = 5.0;
/// Players required for the queue countdown to run
pub const MIN_PLAYERS: usize = 2;
/// Phase status broadcast interval
const STATUS_INTERVAL: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Queue,
    Playing,
    Ended,
}

/// What happened during an `advance` call
#[derive(Debug, Clone)]
pub enum RoundEvent {
    /// Once-per-second queue status
    QueueStatus {
        countdown: f32,
        player_count: u32,
        paused: bool,
    },
    /// Once-per-second mid-round status
    PlayingStatus { countdown: f32 },
    /// A round began with these team assignments
    RoundStarted {
        round_number: u64,
        assignments: Vec<(Uuid, Team)>,
    },
    /// A round finished. The rosters are fixed at this instant; later
    /// joins or leaves do not affect persistence or the payout.
    RoundEnded {
        round_number: u64,
        red_score: u32,
        blue_score: u32,
        winner: Winner,
        winner_ids: Vec<Uuid>,
        participants: Vec<Uuid>,
    },
    /// Everyone is back in the queue
    ReturnedToQueue,
}

pub struct RoundMachine {
    phase: RoundPhase,
    timer: f32,
    round_number: u64,
    paused: bool,
    status_timer: f32,
}

impl Default for RoundMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundMachine {
    pub fn new() -> Self {
        Self {
            phase: RoundPhase::Queue,
            timer: QUEUE_SECS,
            round_number: 0,
            paused: false,
            status_timer: 0.0,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round_number(&self) -> u64 {
        self.round_number
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Toggle the queue pause. Pausing keeps the queue from starting a
    /// round; a running round always plays out.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Whether the world should simulate this tick
    pub fn simulating(&self) -> bool {
        self.phase == RoundPhase::Playing
    }

    /// Advance the lifecycle by one tick
    pub fn advance(&mut self, world: &mut World, map: &Map, dt: f32) -> Vec<RoundEvent> {
        let mut events = Vec::new();
        self.status_timer -= dt;
        let status_due = self.status_timer <= 0.0;
        if status_due {
            self.status_timer = STATUS_INTERVAL;
        }

        match self.phase {
            RoundPhase::Queue => {
                self.timer -= dt;
                let player_count = world.players.len();

                if status_due {
                    events.push(RoundEvent::QueueStatus {
                        countdown: self.timer.max(0.0),
                        player_count: player_count as u32,
                        paused: self.paused,
                    });
                }

                if self.timer <= 0.0 {
                    if self.paused || player_count < MIN_PLAYERS {
                        // Countdown restarts without starting a round
                        self.timer = QUEUE_SECS;
                    } else {
                        events.push(self.start_round(world, map));
                    }
                }
            }
            RoundPhase::Playing => {
                self.timer -= dt;
                if status_due {
                    events.push(RoundEvent::PlayingStatus {
                        countdown: self.timer.max(0.0),
                    });
                }
                if self.timer <= 0.0 {
                    events.push(self.end_round(world));
                }
            }
            RoundPhase::Ended => {
                self.timer -= dt;
                if self.timer <= 0.0 {
                    self.phase = RoundPhase::Queue;
                    self.timer = QUEUE_SECS;
                    self.status_timer = 0.0;
                    world.reset_for_round();
                    events.push(RoundEvent::ReturnedToQueue);
                }
            }
        }

        events
    }

    /// Assign teams alternately in player key order, spawn each team's
    /// players round-robin over its spawn points, and start the clock.
    fn start_round(&mut self, world: &mut World, map: &Map) -> RoundEvent {
        self.round_number += 1;
        self.phase = RoundPhase::Playing;
        self.timer = ROUND_SECS;
        self.status_timer = 0.0;

        world.reset_for_round();

        let ids: Vec<Uuid> = world.players.keys().copied().collect();
        let mut assignments = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let team = if i % 2 == 0 { Team::Red } else { Team::Blue };
            let spawn = map.spawn_point(team, i / 2);
            world.activate_player(*id, team, spawn);
            assignments.push((*id, team));
        }

        info!(
            round = self.round_number,
            players = assignments.len(),
            "Round started"
        );
        RoundEvent::RoundStarted {
            round_number: self.round_number,
            assignments,
        }
    }

    fn end_round(&mut self, world: &mut World) -> RoundEvent {
        self.phase = RoundPhase::Ended;
        self.timer = ENDED_SECS;

        let (red_score, blue_score) = world.colors.score();
        let winner = if red_score > blue_score {
            Winner::Red
        } else if blue_score > red_score {
            Winner::Blue
        } else {
            Winner::Tie
        };

        let winner_ids = match winner {
            Winner::Tie => Vec::new(),
            Winner::Red | Winner::Blue => {
                let winning_team = if winner == Winner::Red {
                    Team::Red
                } else {
                    Team::Blue
                };
                world
                    .players
                    .values()
                    .filter(|p| p.team == Some(winning_team))
                    .map(|p| p.id)
                    .collect()
            }
        };
        let participants: Vec<Uuid> = world
            .players
            .values()
            .filter(|p| p.team.is_some())
            .map(|p| p.id)
            .collect();

        // Teams and bombs clear now; the paint stays up through the
        // results window and resets when the next round starts
        world.clear_round_entities();

        info!(
            round = self.round_number,
            red_score, blue_score, ?winner, "Round ended"
        );
        RoundEvent::RoundEnded {
            round_number: self.round_number,
            red_score,
            blue_score,
            winner,
            winner_ids,
            participants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::test_maps;
    use crate::ws::protocol::BlockColor;

    fn world_with_players(map: &Map, n: u128) -> World {
        let mut world = World::new(map);
        for i in 1..=n {
            world.add_player(Uuid::from_u128(i), map);
        }
        world
    }

    fn advance_secs(
        machine: &mut RoundMachine,
        world: &mut World,
        map: &Map,
        secs: f32,
    ) -> Vec<RoundEvent> {
        let mut events = Vec::new();
        let steps = (secs / 0.1).round() as u32;
        for _ in 0..steps {
            events.extend(machine.advance(world, map, 0.1));
        }
        events
    }

    #[test]
    fn queue_restarts_below_minimum_players() {
        let map = test_maps::arena();
        let mut world = world_with_players(&map, 1);
        let mut machine = RoundMachine::new();

        let events = advance_secs(&mut machine, &mut world, &map, 70.0);
        assert_eq!(machine.phase(), RoundPhase::Queue);
        assert!(events
            .iter()
            .all(|e| !matches!(e, RoundEvent::RoundStarted { .. })));

        // The countdown ran to zero and wrapped back to full
        let countdowns: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                RoundEvent::QueueStatus { countdown, .. } => Some(*countdown),
                _ => None,
            })
            .collect();
        assert!(countdowns.iter().copied().fold(f32::MAX, f32::min) < 2.0);
        assert!(*countdowns.last().unwrap() > 40.0);
    }

    #[test]
    fn pause_blocks_round_start() {
        let map = test_maps::arena();
        let mut world = world_with_players(&map, 2);
        let mut machine = RoundMachine::new();
        machine.set_paused(true);

        let events = advance_secs(&mut machine, &mut world, &map, 70.0);
        assert_eq!(machine.phase(), RoundPhase::Queue);
        assert!(events
            .iter()
            .all(|e| !matches!(e, RoundEvent::RoundStarted { .. })));

        machine.set_paused(false);
        let events = advance_secs(&mut machine, &mut world, &map, 61.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, RoundEvent::RoundStarted { .. })));
    }

    #[test]
    fn full_round_cycle() {
        let map = test_maps::arena();
        let mut world = world_with_players(&map, 2);
        let mut machine = RoundMachine::new();

        // Queue runs down and the round starts with alternating teams
        let events = advance_secs(&mut machine, &mut world, &map, 61.0);
        let started = events
            .iter()
            .find_map(|e| match e {
                RoundEvent::RoundStarted { assignments, .. } => Some(assignments.clone()),
                _ => None,
            })
            .expect("round must start");
        assert_eq!(started.len(), 2);
        assert_ne!(started[0].1, started[1].1);
        assert_eq!(machine.phase(), RoundPhase::Playing);
        assert!(machine.simulating());

        // Give red some paint mid-round
        world
            .colors
            .paint(&map, 9, 2, Team::Red);
        assert_eq!(world.colors.color_at(9, 2), Some(BlockColor::Red));

        // The round plays out and red wins
        let events = advance_secs(&mut machine, &mut world, &map, 121.0);
        let (winner, winner_ids, participants) = events
            .iter()
            .find_map(|e| match e {
                RoundEvent::RoundEnded {
                    winner,
                    winner_ids,
                    participants,
                    ..
                } => Some((*winner, winner_ids.clone(), participants.clone())),
                _ => None,
            })
            .expect("round must end");
        assert_eq!(winner, Winner::Red);
        assert_eq!(winner_ids, vec![Uuid::from_u128(1)]);
        assert_eq!(participants.len(), 2);
        assert_eq!(machine.phase(), RoundPhase::Ended);
        assert!(!machine.simulating());

        // Teams clear as soon as the round ends, the paint stays up
        // for the results window
        assert!(world.players.values().all(|p| p.team.is_none()));
        assert_eq!(world.colors.score(), (1, 0));

        // Results window elapses, everyone returns to the queue
        let events = advance_secs(&mut machine, &mut world, &map, 6.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, RoundEvent::ReturnedToQueue)));
        assert_eq!(machine.phase(), RoundPhase::Queue);
        assert_eq!(world.colors.score(), (0, 0));
        assert!(world.players.values().all(|p| p.team.is_none()));
    }

    #[test]
    fn round_numbers_increment_across_cycles() {
        let map = test_maps::arena();
        let mut world = world_with_players(&map, 2);
        let mut machine = RoundMachine::new();

        advance_secs(&mut machine, &mut world, &map, 61.0);
        assert_eq!(machine.round_number(), 1);
        advance_secs(&mut machine, &mut world, &map, 121.0 + 6.0);
        advance_secs(&mut machine, &mut world, &map, 61.0);
        assert_eq!(machine.round_number(), 2);
    }
}
