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

//! Encounter state shared by every request handler: one boss record and the
//! live player records. Mutation goes through the engine in `engine.rs`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use encounter_common::{BossView, DifficultyTier, PlayerId, PlayerView};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::BossConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncounterError {
    #[error("no live encounter for player {player_id}")]
    NotFound { player_id: PlayerId },
    #[error("damage must not be negative, got {0}")]
    NegativeDamage(i64),
    #[error("missing caller identity")]
    MissingIdentity,
}

/// A validated, non-negative damage amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage(i64);

impl Damage {
    pub fn new(amount: i64) -> Result<Self, EncounterError> {
        if amount < 0 {
            return Err(EncounterError::NegativeDamage(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> i64 {
        self.0
    }
}

#[derive(Debug)]
pub(crate) struct Boss {
    pub(crate) name: String,
    pub(crate) health: i64,
    pub(crate) max_health: i64,
    pub(crate) key_word: String,
    pub(crate) world_boss: bool,
}

impl Boss {
    fn from_config(config: BossConfig) -> Self {
        let max_health = config.max_health.max(1);
        Self {
            name: config.name,
            health: max_health,
            max_health,
            key_word: config.key_word,
            world_boss: config.world_boss,
        }
    }

    pub(crate) fn view(&self) -> BossView {
        BossView {
            name: self.name.clone(),
            health: self.health,
            max_health: self.max_health,
            key_word: self.key_word.clone(),
            world_boss: self.world_boss,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PlayerCombatRecord {
    pub(crate) hp: i64,
    pub(crate) difficulty: DifficultyTier,
    pub(crate) started_at: DateTime<Utc>,
}

impl PlayerCombatRecord {
    pub(crate) fn view(&self, player_id: &str) -> PlayerView {
        PlayerView {
            player_id: player_id.to_string(),
            hp: self.hp,
            difficulty: self.difficulty,
            started_at: self.started_at,
        }
    }
}

/// Process-wide encounter authority.
///
/// The boss is deliberately a single record shared by every player on the
/// server: one player's defeat resets everyone's progress. Player records are
/// keyed by identity and sharded so that damage against different players
/// never contends on one lock.
pub struct EncounterState {
    pub(crate) boss: Mutex<Boss>,
    pub(crate) players: DashMap<PlayerId, PlayerCombatRecord>,
    pub(crate) player_max_hp: i64,
}

impl EncounterState {
    pub fn new(boss: BossConfig, player_max_hp: i64) -> Self {
        Self {
            boss: Mutex::new(Boss::from_config(boss)),
            players: DashMap::new(),
            player_max_hp: player_max_hp.max(1),
        }
    }

    pub(crate) fn fresh_record(&self, difficulty: DifficultyTier) -> PlayerCombatRecord {
        PlayerCombatRecord {
            hp: self.player_max_hp,
            difficulty,
            started_at: Utc::now(),
        }
    }

    /// Reset the shared boss to full health and (re)start the player's record.
    pub async fn start_encounter(
        &self,
        player_id: &str,
        difficulty: DifficultyTier,
    ) -> (PlayerView, BossView) {
        let boss = {
            let mut boss = self.boss.lock().await;
            boss.health = boss.max_health;
            boss.view()
        };

        let record = self.fresh_record(difficulty);
        let player = record.view(player_id);
        self.players.insert(player_id.to_string(), record);

        info!(
            player_id = %player_id,
            difficulty = difficulty.level(),
            boss = %boss.name,
            "encounter started"
        );
        (player, boss)
    }

    pub async fn boss_view(&self) -> BossView {
        self.boss.lock().await.view()
    }

    pub fn player_view(&self, player_id: &str) -> Result<PlayerView, EncounterError> {
        self.players
            .get(player_id)
            .map(|record| record.view(player_id))
            .ok_or_else(|| EncounterError::NotFound {
                player_id: player_id.to_string(),
            })
    }

    /// Lenient read: a player without a live record is started on a fresh
    /// default record instead of failing.
    pub fn player_view_or_start(&self, player_id: &str) -> PlayerView {
        self.players
            .entry(player_id.to_string())
            .or_insert_with(|| self.fresh_record(DifficultyTier::default()))
            .view(player_id)
    }

    pub fn live_players(&self) -> usize {
        self.players.len()
    }
}
