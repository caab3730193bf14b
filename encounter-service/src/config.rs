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

use encounter_common::{
    DEFAULT_BOSS_KEYWORD, DEFAULT_BOSS_MAX_HEALTH, DEFAULT_BOSS_NAME, DEFAULT_PLAYER_MAX_HP,
    expand_env_vars,
};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossConfig {
    pub name: String,
    pub key_word: String,
    pub max_health: i64,
    pub world_boss: bool,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BOSS_NAME.to_string(),
            key_word: DEFAULT_BOSS_KEYWORD.to_string(),
            max_health: DEFAULT_BOSS_MAX_HEALTH,
            world_boss: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BossConfigFile {
    name: Option<String>,
    key_word: Option<String>,
    max_health: Option<i64>,
    world_boss: Option<bool>,
}

impl BossConfigFile {
    fn into_config(self) -> BossConfig {
        let defaults = BossConfig::default();
        BossConfig {
            name: normalize_optional_string(self.name).unwrap_or(defaults.name),
            key_word: normalize_optional_string(self.key_word).unwrap_or(defaults.key_word),
            max_health: self.max_health.unwrap_or(defaults.max_health).max(1),
            world_boss: self.world_boss.unwrap_or(defaults.world_boss),
        }
    }
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn load_boss_config() -> BossConfig {
    let Some(path) = std::env::var("BOSS_CONFIG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return BossConfig::default();
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path, error = %error, "failed to read boss config file");
            return BossConfig::default();
        }
    };

    match parse_boss_config(&raw) {
        Some(config) => {
            info!(
                path = %path,
                boss = %config.name,
                max_health = config.max_health,
                world_boss = config.world_boss,
                "loaded boss from YAML config"
            );
            config
        }
        None => {
            warn!(path = %path, "falling back to built-in boss");
            BossConfig::default()
        }
    }
}

fn parse_boss_config(raw: &str) -> Option<BossConfig> {
    if raw.trim().is_empty() {
        warn!("boss config file is empty");
        return None;
    }

    let expanded = expand_env_vars(raw);
    match serde_yaml::from_str::<BossConfigFile>(&expanded) {
        Ok(parsed) => Some(parsed.into_config()),
        Err(error) => {
            warn!(error = %error, "failed to parse boss config yaml");
            None
        }
    }
}

pub fn player_max_hp() -> i64 {
    let Ok(raw) = std::env::var("PLAYER_MAX_HP") else {
        return DEFAULT_PLAYER_MAX_HP;
    };

    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(value = %raw, "invalid PLAYER_MAX_HP; using default");
            DEFAULT_PLAYER_MAX_HP
        }
    }
}
