use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Snapshot of user agent, viewport, and locale characteristics.
pub struct FingerprintProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
    pub timezone: String,
}

impl FingerprintProfile {
    fn desktop(
        user_agent: &str,
        viewport: (u32, u32),
        platform: &str,
        languages: &[&str],
        timezone: &str,
    ) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            viewport,
            platform: platform.to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            timezone: timezone.to_string(),
        }
    }
}

impl Default for FingerprintProfile {
    fn default() -> Self {
        Self::desktop(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            (1920, 1080),
            "Win32",
            &["en-US", "en"],
            "America/New_York",
        )
    }
}

#[derive(Debug, Clone)]
/// Pool of plausible desktop fingerprints; a fresh one is drawn per navigation.
pub struct FingerprintPool {
    desktop_profiles: Vec<FingerprintProfile>,
}

impl Default for FingerprintPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintPool {
    /// Create a pool with the built-in desktop profiles.
    pub fn new() -> Self {
        Self {
            desktop_profiles: vec![
                FingerprintProfile::default(),
                FingerprintProfile::desktop(
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                    (1440, 900),
                    "MacIntel",
                    &["en-US", "en"],
                    "America/Los_Angeles",
                ),
                FingerprintProfile::desktop(
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
                    (1536, 864),
                    "Win32",
                    &["en-US", "en"],
                    "America/Chicago",
                ),
                FingerprintProfile::desktop(
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                    (1366, 768),
                    "Linux x86_64",
                    &["en-GB", "en"],
                    "Europe/London",
                ),
                FingerprintProfile::desktop(
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
                    (1680, 1050),
                    "MacIntel",
                    &["en-US", "en"],
                    "America/Denver",
                ),
            ],
        }
    }

    /// Use exactly these profiles; an empty list falls back to the default profile.
    pub fn with_profiles(profiles: Vec<FingerprintProfile>) -> Self {
        Self {
            desktop_profiles: profiles,
        }
    }

    /// Draw a random profile.
    pub fn rotate(&self) -> FingerprintProfile {
        self.desktop_profiles
            .choose(&mut OsRng)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.desktop_profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desktop_profiles.is_empty()
    }
}
