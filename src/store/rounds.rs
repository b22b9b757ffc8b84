//! Round lifecycle persistence
//!
//! A round row is upserted when play starts and updated with the final
//! scores when it ends, so a row exists (status `playing`) even for a
//! round the server never finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::supabase::{SupabaseClient, SupabaseError};
use crate::ws::protocol::Winner;

/// Persisted round row
#[derive(Debug, Clone, Deserialize)]
pub struct RoundRecord {
    pub id: i64,
    pub round_number: i64,
    pub map_name: String,
    pub status: String,
    pub red_score: i32,
    pub blue_score: i32,
    pub winner: Option<String>,
    pub player_count: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Row written when a round starts
#[derive(Debug, Clone, Serialize)]
struct NewRound<'a> {
    round_number: i64,
    map_name: &'a str,
    status: &'static str,
    red_score: i32,
    blue_score: i32,
    player_count: i32,
    started_at: DateTime<Utc>,
}

/// Fields patched onto the row when the round ends
#[derive(Debug, Clone, Serialize)]
struct RoundFinish {
    status: &'static str,
    red_score: i32,
    blue_score: i32,
    winner: &'static str,
    player_count: i32,
    finished_at: DateTime<Utc>,
}

fn winner_label(winner: Winner) -> &'static str {
    match winner {
        Winner::Red => "red",
        Winner::Blue => "blue",
        Winner::Tie => "tie",
    }
}

/// Round store operations
#[derive(Clone)]
pub struct RoundStore {
    client: SupabaseClient,
}

impl RoundStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Upsert the round row at round start, keyed on `round_number`
    pub async fn start_round(
        &self,
        round_number: u64,
        map_name: &str,
        player_count: usize,
    ) -> Result<(), SupabaseError> {
        let row = NewRound {
            round_number: round_number as i64,
            map_name,
            status: "playing",
            red_score: 0,
            blue_score: 0,
            player_count: player_count as i32,
            started_at: Utc::now(),
        };
        self.client
            .upsert::<_, serde_json::Value>("rounds", "round_number", &row)
            .await?;
        Ok(())
    }

    /// Write the final scores and winner onto the round's row
    pub async fn finish_round(
        &self,
        round_number: u64,
        red_score: u32,
        blue_score: u32,
        winner: Winner,
        player_count: usize,
    ) -> Result<(), SupabaseError> {
        let patch = RoundFinish {
            status: "ended",
            red_score: red_score as i32,
            blue_score: blue_score as i32,
            winner: winner_label(winner),
            player_count: player_count as i32,
            finished_at: Utc::now(),
        };
        let query = format!("round_number=eq.{}", round_number);
        self.client.update("rounds", &query, &patch).await
    }

    /// Most recent finished rounds, newest first
    pub async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundRecord>, SupabaseError> {
        let query = format!("status=eq.ended&order=finished_at.desc&limit={}", limit);
        self.client.get("rounds", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_row_carries_lifecycle_fields() {
        let row = NewRound {
            round_number: 7,
            map_name: "classic",
            status: "playing",
            red_score: 0,
            blue_score: 0,
            player_count: 4,
            started_at: Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["round_number"], 7);
        assert_eq!(json["map_name"], "classic");
        assert_eq!(json["status"], "playing");
        assert!(json["started_at"].is_string());
        assert!(json.get("finished_at").is_none());
    }

    #[test]
    fn finish_patch_closes_the_row() {
        let patch = RoundFinish {
            status: "ended",
            red_score: 12,
            blue_score: 9,
            winner: winner_label(Winner::Red),
            player_count: 4,
            finished_at: Utc::now(),
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["status"], "ended");
        assert_eq!(json["winner"], "red");
        assert_eq!(json["red_score"], 12);
        assert!(json["finished_at"].is_string());
    }

    #[test]
    fn tie_rounds_are_labeled() {
        assert_eq!(winner_label(Winner::Tie), "tie");
        assert_eq!(winner_label(Winner::Blue), "blue");
    }
}
