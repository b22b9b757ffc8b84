//! Player lifetime stats and wallet lookup

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Lifetime stats row, one per player
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerStats {
    pub id: Uuid,
    pub games_played: i64,
    pub games_won: i64,
    pub tokens_won: i64,
    pub wallet_address: Option<String>,
}

/// New stats row for first-seen players
#[derive(Debug, Clone, Serialize)]
struct NewPlayerStats {
    id: Uuid,
    games_played: i64,
    games_won: i64,
    tokens_won: i64,
}

/// Stats update after a round
#[derive(Debug, Clone, Serialize)]
struct StatsUpdate {
    games_played: i64,
    games_won: i64,
    tokens_won: i64,
}

/// Wallet projection for payout lookups
#[derive(Debug, Clone, Deserialize)]
struct WalletRow {
    wallet_address: Option<String>,
}

/// Player store operations
#[derive(Clone)]
pub struct PlayerStore {
    client: SupabaseClient,
}

impl PlayerStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get a player's stats row by ID
    pub async fn get_stats(&self, player_id: Uuid) -> Result<Option<PlayerStats>, SupabaseError> {
        let query = format!("id=eq.{}", player_id);
        self.client.get_one("player_stats", &query).await
    }

    /// Get or create stats (ensures the row exists)
    pub async fn ensure_stats(&self, player_id: Uuid) -> Result<PlayerStats, SupabaseError> {
        match self.get_stats(player_id).await? {
            Some(stats) => Ok(stats),
            None => {
                let row = NewPlayerStats {
                    id: player_id,
                    games_played: 0,
                    games_won: 0,
                    tokens_won: 0,
                };
                self.client.insert("player_stats", &row).await
            }
        }
    }

    /// Apply one round's outcome to a player's lifetime stats
    pub async fn record_result(
        &self,
        player_id: Uuid,
        won: bool,
        tokens: u64,
    ) -> Result<(), SupabaseError> {
        let stats = self.ensure_stats(player_id).await?;
        let update = StatsUpdate {
            games_played: stats.games_played + 1,
            games_won: stats.games_won + if won { 1 } else { 0 },
            tokens_won: stats.tokens_won + tokens as i64,
        };
        let query = format!("id=eq.{}", player_id);
        self.client.update("player_stats", &query, &update).await
    }

    /// Wallet addresses on file for the given players, in no particular
    /// order. Players without a linked wallet are skipped.
    pub async fn wallet_addresses(&self, ids: &[Uuid]) -> Result<Vec<String>, SupabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let query = format!("id=in.({})&select=wallet_address", id_list);
        let rows: Vec<WalletRow> = self.client.get("player_stats", &query).await?;
        Ok(rows.into_iter().filter_map(|r| r.wallet_address).collect())
    }
}
