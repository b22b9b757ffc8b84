//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 simulation ticks per second
pub const SNAPSHOT_TPS: u32 = 12; // 12 snapshots per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Fixed physics timestep in seconds
pub const FIXED_DT: f32 = 1.0 / SIMULATION_TPS as f32;

/// Largest wall-clock delta fed into the accumulator (spiral-of-death guard)
pub const MAX_FRAME_DELTA: f32 = 0.1;

/// Hard cap on fixed steps drained per loop iteration
pub const MAX_STEPS_PER_FRAME: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_rate_divides_tick_rate() {
        assert_eq!(SIMULATION_TPS % SNAPSHOT_TPS, 0);
        assert_eq!(SIMULATION_TPS / SNAPSHOT_TPS, 5);
    }

    #[test]
    fn fixed_dt_matches_tick_duration() {
        let micros = (FIXED_DT * 1_000_000.0) as u64;
        assert!(micros.abs_diff(TICK_DURATION_MICROS) <= 1);
    }
}
