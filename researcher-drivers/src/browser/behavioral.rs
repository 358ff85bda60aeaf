use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
/// Produces human-like pauses and scrolling between browser actions.
pub struct BehavioralEngine {
    pub delay_range_ms: (u64, u64),
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {
            delay_range_ms: (300, 1200),
        }
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        let ms = if max > min {
            OsRng.gen_range(min..=max)
        } else {
            min
        };
        sleep(Duration::from_millis(ms)).await;
    }

    /// The pre-navigation pause.
    pub async fn settle(&self) {
        let (min, max) = self.delay_range_ms;
        self.random_delay(min, max).await;
    }

    /// A `window.scrollBy` call with a jittered distance.
    pub fn scroll_script(&self) -> String {
        let dy: i32 = OsRng.gen_range(180..=720);
        let dx: i32 = OsRng.gen_range(-4..=4);
        format!("window.scrollBy({dx}, {dy});")
    }
}
