//! The authoritative game task
//!
//! One task owns the world, the round machine and the snapshot builder.
//! WebSocket sessions feed it commands over an mpsc channel; it feeds
//! everyone back over a broadcast channel. Persistence and payouts are
//! dispatched fire-and-forget so a slow backend never stalls a tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::game::map::Map;
use crate::game::round::{RoundEvent, RoundMachine};
use crate::game::snapshot::SnapshotBuilder;
use crate::game::world::World;
use crate::game::PlayerInput;
use crate::payments::PayoutService;
use crate::store::{PlayerStore, RoundStore};
use crate::util::time::{FIXED_DT, MAX_FRAME_DELTA, MAX_STEPS_PER_FRAME, TICK_DURATION_MICROS};
use crate::ws::protocol::{ClientMsg, ServerMsg, Winner};

/// Divergence between a client's predicted position and the server's
/// before we log it and force a corrective snapshot
pub const DESYNC_WARN_DISTANCE: f32 = 100.0;

/// Commands consumed by the game task
#[derive(Debug)]
pub enum GameCommand {
    Client(PlayerInput),
    SetPaused(bool),
}

/// Handle to the running game task
#[derive(Clone)]
pub struct GameHandle {
    pub command_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl GameHandle {
    pub async fn send_client(&self, input: PlayerInput) {
        if self.command_tx.send(GameCommand::Client(input)).await.is_err() {
            warn!("Game task is gone, dropping client message");
        }
    }

    pub async fn set_paused(&self, paused: bool) {
        let _ = self.command_tx.send(GameCommand::SetPaused(paused)).await;
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// The authoritative game server
pub struct GameServer {
    map: Arc<Map>,
    map_name: String,
    world: World,
    machine: RoundMachine,
    snapshots: SnapshotBuilder,
    command_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    tick: u64,
    round_store: RoundStore,
    player_store: PlayerStore,
    payout: PayoutService,
    reward_tokens: u64,
    /// Highest round already dispatched for payout
    last_paid_round: u64,
    player_count: Arc<AtomicUsize>,
}

impl GameServer {
    pub fn new(
        map: Arc<Map>,
        map_name: String,
        round_store: RoundStore,
        player_store: PlayerStore,
        payout: PayoutService,
        reward_tokens: u64,
    ) -> (Self, GameHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = GameHandle {
            command_tx,
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
        };

        let world = World::new(&map);
        let server = Self {
            map,
            map_name,
            world,
            machine: RoundMachine::new(),
            snapshots: SnapshotBuilder::new(),
            command_rx,
            broadcast_tx,
            tick: 0,
            round_store,
            player_store,
            payout,
            reward_tokens,
            last_paid_round: 0,
            player_count,
        };

        (server, handle)
    }

    /// Run the authoritative tick loop forever
    pub async fn run(mut self) {
        info!("Game loop started");

        let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last = Instant::now();
        let mut accumulator: f32 = 0.0;

        loop {
            ticker.tick().await;

            self.process_commands();

            let now = Instant::now();
            let frame = now.duration_since(last).as_secs_f32();
            last = now;

            let steps = steps_for_frame(&mut accumulator, frame);
            for _ in 0..steps {
                self.step_once();
            }
        }
    }

    /// One fixed simulation tick
    fn step_once(&mut self) {
        self.tick += 1;

        let events = self.machine.advance(&mut self.world, &self.map, FIXED_DT);
        if self.machine.simulating() {
            self.world.step(&self.map, FIXED_DT);
        }
        self.handle_events(events);

        if self.snapshots.should_send() {
            let snapshot = self.snapshots.build(&mut self.world, self.tick);
            let _ = self.broadcast_tx.send(snapshot);
        }
    }

    /// Drain all pending commands
    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                GameCommand::Client(input) => self.handle_client(input),
                GameCommand::SetPaused(paused) => {
                    info!(paused, "Queue pause toggled");
                    self.machine.set_paused(paused);
                }
            }
        }
    }

    fn handle_client(&mut self, input: PlayerInput) {
        let player_id = input.player_id;
        match input.msg {
            ClientMsg::Join => self.handle_join(player_id),
            ClientMsg::Input {
                sequence, events, ..
            } => {
                self.world.queue_input(player_id, sequence, events);
            }
            ClientMsg::ThrowBomb { dir } => {
                self.world.throw_bomb(player_id, dir);
            }
            ClientMsg::StateSync { x, y, .. } => {
                self.check_desync(player_id, x, y);
            }
            ClientMsg::Ping { .. } => {
                // Answered on the session's own connection, nothing to
                // simulate here
            }
            ClientMsg::Leave => self.handle_leave(player_id),
        }
    }

    fn handle_join(&mut self, player_id: Uuid) {
        if self.world.players.contains_key(&player_id) {
            warn!(player_id = %player_id, "Player already joined");
            return;
        }

        self.world.add_player(player_id, &self.map);
        self.player_count
            .store(self.world.players.len(), Ordering::Relaxed);

        let _ = self.broadcast_tx.send(ServerMsg::PlayerJoined {
            player_id,
            team: None,
        });
        self.snapshots.force_next();

        info!(
            player_id = %player_id,
            player_count = self.world.players.len(),
            "Player joined"
        );
    }

    fn handle_leave(&mut self, player_id: Uuid) {
        if let Some(player) = self.world.remove_player(player_id) {
            self.player_count
                .store(self.world.players.len(), Ordering::Relaxed);

            let _ = self.broadcast_tx.send(ServerMsg::PlayerLeft {
                player_id,
                team: player.team,
            });

            info!(player_id = %player_id, "Player left");
        }
    }

    /// Client prediction reports are advisory: measure the divergence,
    /// never adopt the client's position.
    fn check_desync(&mut self, player_id: Uuid, x: f32, y: f32) {
        let Some(player) = self.world.players.get(&player_id) else {
            return;
        };
        let dx = player.state.x - x;
        let dy = player.state.y - y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance > DESYNC_WARN_DISTANCE {
            warn!(
                player_id = %player_id,
                distance,
                server_x = player.state.x,
                server_y = player.state.y,
                client_x = x,
                client_y = y,
                "Client prediction diverged, forcing snapshot"
            );
            self.snapshots.force_next();
        }
    }

    fn handle_events(&mut self, events: Vec<RoundEvent>) {
        for event in events {
            match event {
                RoundEvent::QueueStatus {
                    countdown,
                    player_count,
                    paused,
                } => {
                    let _ = self.broadcast_tx.send(ServerMsg::QueueState {
                        countdown,
                        player_count,
                        paused,
                    });
                }
                RoundEvent::PlayingStatus { countdown } => {
                    let _ = self.broadcast_tx.send(ServerMsg::GameState { countdown });
                }
                RoundEvent::RoundStarted {
                    round_number,
                    assignments,
                } => {
                    let _ = self
                        .broadcast_tx
                        .send(ServerMsg::RoundStarted { round_number });
                    let player_count = assignments.len();
                    for (player_id, team) in assignments {
                        let _ = self
                            .broadcast_tx
                            .send(ServerMsg::TeamAssigned { player_id, team });
                    }
                    self.snapshots.force_next();

                    let round_store = self.round_store.clone();
                    let map_name = self.map_name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = round_store
                            .start_round(round_number, &map_name, player_count)
                            .await
                        {
                            error!(round = round_number, error = %e, "Failed to open round row");
                        }
                    });
                }
                RoundEvent::RoundEnded {
                    round_number,
                    red_score,
                    blue_score,
                    winner,
                    winner_ids,
                    participants,
                } => {
                    let _ = self.broadcast_tx.send(ServerMsg::GameEnded {
                        red_score,
                        blue_score,
                        winner,
                    });
                    self.finish_round(
                        round_number,
                        red_score,
                        blue_score,
                        winner,
                        winner_ids,
                        participants,
                    );
                }
                RoundEvent::ReturnedToQueue => {
                    self.snapshots.force_next();
                }
            }
        }
    }

    /// Persist the result and dispatch the payout, all off-task. A
    /// failure is logged and forgotten; the game never waits on the
    /// backend and the next round starts on schedule either way.
    fn finish_round(
        &mut self,
        round_number: u64,
        red_score: u32,
        blue_score: u32,
        winner: Winner,
        winner_ids: Vec<Uuid>,
        participants: Vec<Uuid>,
    ) {
        let round_store = self.round_store.clone();
        let player_count = participants.len();
        tokio::spawn(async move {
            if let Err(e) = round_store
                .finish_round(round_number, red_score, blue_score, winner, player_count)
                .await
            {
                error!(round = round_number, error = %e, "Failed to record round result");
            }
        });

        let player_store = self.player_store.clone();
        let winners: HashSet<Uuid> = winner_ids.iter().copied().collect();
        let reward = self.reward_tokens;
        tokio::spawn(async move {
            for id in participants {
                let won = winners.contains(&id);
                let tokens = if won { reward } else { 0 };
                if let Err(e) = player_store.record_result(id, won, tokens).await {
                    error!(player_id = %id, error = %e, "Failed to update player stats");
                }
            }
        });

        // One payout per round, ever. Dispatches for different rounds
        // may still be in flight at the same time.
        if winner_ids.is_empty() || round_number <= self.last_paid_round {
            return;
        }
        self.last_paid_round = round_number;

        let player_store = self.player_store.clone();
        let payout = self.payout.clone();
        tokio::spawn(async move {
            match player_store.wallet_addresses(&winner_ids).await {
                Ok(wallets) => {
                    if let Err(e) = payout
                        .distribute_to_winners(round_number, &wallets, reward)
                        .await
                    {
                        error!(round = round_number, error = %e, "Payout failed");
                    }
                }
                Err(e) => {
                    error!(round = round_number, error = %e, "Wallet lookup failed");
                }
            }
        });
    }
}

/// Clamp a frame delta and convert the time backlog into a bounded
/// number of fixed steps. When the step cap is hit the remaining
/// backlog is shed so a long stall cannot snowball.
fn steps_for_frame(accumulator: &mut f32, frame_delta: f32) -> u32 {
    *accumulator += frame_delta.min(MAX_FRAME_DELTA);

    let mut steps = 0;
    while *accumulator >= FIXED_DT && steps < MAX_STEPS_PER_FRAME {
        *accumulator -= FIXED_DT;
        steps += 1;
    }
    if steps == MAX_STEPS_PER_FRAME {
        *accumulator = 0.0;
    }
    steps
}
