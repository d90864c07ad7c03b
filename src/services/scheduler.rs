//! Timer-driven swaps.
//!
//! One long-lived loop. While the session is stopped or scheduling is disabled it
//! parks on the wake signal; otherwise it draws a delay, publishes the next swap
//! time, and sleeps until the delay elapses or something wakes it (config change,
//! pause, manual trigger), in which case it starts over.

use std::time::Duration;

use rand::{Rng, rng};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    services::{background::spawn_detached, game_mode::GameModeHandler},
    state::{SharedState, store::unix_millis},
};

/// Drive scheduled swaps forever.
pub async fn run(state: SharedState) {
    loop {
        let (active, min, max) = state
            .store()
            .read(|s| {
                (
                    s.running && s.swap_enabled,
                    s.min_interval_secs,
                    s.max_interval_secs,
                )
            })
            .await;

        if !active {
            clear_next_swap(&state).await;
            state.scheduler_wake().notified().await;
            continue;
        }

        let delay = pick_delay(min, max, state.config().default_interval_secs);
        let next_swap_at = unix_millis() + delay.as_millis() as i64;
        state
            .store()
            .update(|s| s.next_swap_at = next_swap_at)
            .await;
        debug!(delay_secs = delay.as_secs(), "next swap scheduled");

        tokio::select! {
            _ = sleep(delay) => {}
            _ = state.scheduler_wake().notified() => {
                debug!("scheduler woken; rescheduling");
                continue;
            }
        }

        // The session may have been paused while we slept.
        let still_active = state
            .store()
            .read(|s| s.running && s.swap_enabled)
            .await;
        if !still_active {
            continue;
        }

        info!("scheduled swap firing");
        let handler = GameModeHandler::active(&state).await;
        let swap_state = state.clone();
        spawn_detached("scheduled swap", async move {
            handler.handle_swap(&swap_state).await.map(|_| ())
        });
    }
}

/// Uniform delay in `[min, max]` seconds, or `default` when the bounds are unusable.
pub fn pick_delay(min_secs: u64, max_secs: u64, default_secs: u64) -> Duration {
    if min_secs == 0 || max_secs == 0 || min_secs > max_secs {
        return Duration::from_secs(default_secs.max(1));
    }
    Duration::from_secs(rng().random_range(min_secs..=max_secs))
}

async fn clear_next_swap(state: &SharedState) {
    let scheduled = state.store().read(|s| s.next_swap_at != 0).await;
    if scheduled {
        state.store().update(|s| s.next_swap_at = 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            model::{Player, SessionState},
        },
    };

    #[test]
    fn delay_stays_within_bounds() {
        for _ in 0..200 {
            let delay = pick_delay(5, 9, 300);
            assert!((5..=9).contains(&delay.as_secs()));
        }
        assert_eq!(pick_delay(7, 7, 300), Duration::from_secs(7));
    }

    #[test]
    fn unusable_bounds_fall_back_to_default() {
        assert_eq!(pick_delay(0, 0, 120), Duration::from_secs(120));
        assert_eq!(pick_delay(60, 30, 120), Duration::from_secs(120));
        assert_eq!(pick_delay(0, 30, 0), Duration::from_secs(1));
    }

    fn scheduled_state(running: bool) -> SharedState {
        let mut session = SessionState {
            running,
            swap_enabled: true,
            min_interval_secs: 1,
            max_interval_secs: 1,
            games: vec!["a".into(), "b".into()],
            ..SessionState::default()
        };
        session.players.insert("p1".into(), Player::new("p1"));
        AppState::new(AppConfig::default(), session)
    }

    #[tokio::test]
    async fn active_scheduler_publishes_and_swaps() {
        let state = scheduled_state(true);
        let task = tokio::spawn(run(state.clone()));

        sleep(Duration::from_millis(200)).await;
        let next = state.store().read(|s| s.next_swap_at).await;
        assert!(next > 0);

        sleep(Duration::from_millis(1_300)).await;
        let game = state.store().read(|s| s.players["p1"].game.clone()).await;
        assert!(game == "a" || game == "b");
        task.abort();
    }

    #[tokio::test]
    async fn stopped_scheduler_waits_for_a_wake() {
        let state = scheduled_state(false);
        let task = tokio::spawn(run(state.clone()));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(state.store().read(|s| s.next_swap_at).await, 0);

        state.store().update(|s| s.running = true).await;
        state.wake_scheduler();
        sleep(Duration::from_millis(100)).await;
        assert!(state.store().read(|s| s.next_swap_at).await > 0);

        state.store().update(|s| s.running = false).await;
        state.wake_scheduler();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(state.store().read(|s| s.next_swap_at).await, 0);
        task.abort();
    }
}
