//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::game::{GameHandle, GameServer};
use crate::game::map::Map;
use crate::payments::PayoutService;
use crate::store::{PlayerStore, RoundStore, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supabase: SupabaseClient,
    pub round_store: RoundStore,
    pub player_store: PlayerStore,
    pub game: GameHandle,
    /// Live WebSocket sessions by player ID (value is connect time in
    /// Unix millis). One session per player; a second connection for
    /// the same ID is rejected.
    pub sessions: Arc<DashMap<Uuid, u64>>,
}

impl AppState {
    /// Build the state and the game task. The caller spawns the
    /// returned server.
    pub fn new(config: Config, map: Arc<Map>) -> (Self, GameServer) {
        let config = Arc::new(config);

        let supabase = SupabaseClient::new(&config);
        let round_store = RoundStore::new(supabase.clone());
        let player_store = PlayerStore::new(supabase.clone());
        let payout = PayoutService::new(&config);

        let (server, game) = GameServer::new(
            map,
            config.map_name.clone(),
            round_store.clone(),
            player_store.clone(),
            payout,
            config.round_reward_tokens,
        );

        let state = Self {
            config,
            supabase,
            round_store,
            player_store,
            game,
            sessions: Arc::new(DashMap::new()),
        };

        (state, server)
    }
}
