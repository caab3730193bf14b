// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BOSS_NAME: &str = "The Overlord";
pub const DEFAULT_BOSS_KEYWORD: &str = "conquest";
pub const DEFAULT_BOSS_MAX_HEALTH: i64 = 1000;
pub const DEFAULT_PLAYER_MAX_HP: i64 = 100;

/// Header carrying the caller identity resolved by the session layer.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

pub type PlayerId = String;

/// Difficulty selected on the player's profile. Serialized as the bare
/// integer the profile store uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum DifficultyTier {
    #[default]
    Easy,
    Medium,
    Hard,
    Inferno,
}

impl DifficultyTier {
    pub fn level(self) -> u8 {
        match self {
            DifficultyTier::Easy => 1,
            DifficultyTier::Medium => 2,
            DifficultyTier::Hard => 5,
            DifficultyTier::Inferno => 10,
        }
    }
}

impl TryFrom<u8> for DifficultyTier {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(DifficultyTier::Easy),
            2 => Ok(DifficultyTier::Medium),
            5 => Ok(DifficultyTier::Hard),
            10 => Ok(DifficultyTier::Inferno),
            other => Err(format!(
                "unknown difficulty {other}, expected one of 1, 2, 5, 10"
            )),
        }
    }
}

impl From<DifficultyTier> for u8 {
    fn from(tier: DifficultyTier) -> Self {
        tier.level()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BossView {
    pub name: String,
    pub health: i64,
    pub max_health: i64,
    pub key_word: String,
    pub world_boss: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub hp: i64,
    pub difficulty: DifficultyTier,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartEncounterRequest {
    #[serde(default)]
    pub difficulty: Option<DifficultyTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartEncounterResponse {
    pub started: bool,
    pub player_id: PlayerId,
    pub difficulty: DifficultyTier,
    pub hp: i64,
    pub boss: BossView,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DamageRequest {
    #[serde(default)]
    pub damage: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BossDamageResponse {
    pub health: i64,
    pub defeated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerHpResponse {
    pub hp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DifficultyResponse {
    pub difficulty: DifficultyTier,
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is a valid regex")
});

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_serializes_as_profile_level() {
        let encoded = serde_json::to_string(&DifficultyResponse {
            difficulty: DifficultyTier::Hard,
        })
        .unwrap();
        assert_eq!(encoded, r#"{"difficulty":5}"#);
    }

    #[test]
    fn difficulty_rejects_unknown_levels() {
        let parsed = serde_json::from_str::<StartEncounterRequest>(r#"{"difficulty":3}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn start_request_without_difficulty_leaves_it_unset() {
        let parsed = serde_json::from_str::<StartEncounterRequest>("{}").unwrap();
        assert_eq!(parsed.difficulty, None);
        assert_eq!(parsed.difficulty.unwrap_or_default(), DifficultyTier::Easy);
    }

    #[test]
    fn damage_request_defaults_to_zero() {
        let parsed = serde_json::from_str::<DamageRequest>("{}").unwrap();
        assert_eq!(parsed.damage, 0);
    }

    #[test]
    fn expand_env_vars_substitutes_known_and_blanks_unknown() {
        // SAFETY: test-local variable name not read elsewhere.
        unsafe { std::env::set_var("ENCOUNTER_COMMON_TEST_BOSS", "Gravewarden") };
        let expanded = expand_env_vars("name: ${ENCOUNTER_COMMON_TEST_BOSS} ${ENCOUNTER_COMMON_UNSET_VAR}!");
        assert_eq!(expanded, "name: Gravewarden !");
    }
}
