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

//! Damage application and the one-time transitions it triggers: boss defeat
//! with immediate reset, and player elimination.

use dashmap::mapref::entry::{Entry, OccupiedEntry};
use encounter_common::{BossDamageResponse, DifficultyTier, PlayerId};
use tracing::{debug, info};

use crate::state::{Damage, EncounterError, EncounterState, PlayerCombatRecord};

impl EncounterState {
    /// Decrement, threshold check and reset happen under one lock, so
    /// concurrent callers see a serial sequence of health values and exactly
    /// one of them observes each defeat.
    pub async fn apply_boss_damage(&self, damage: Damage) -> BossDamageResponse {
        let mut boss = self.boss.lock().await;
        boss.health = boss.health.saturating_sub(damage.amount());

        let defeated = boss.health <= 0;
        if defeated {
            boss.health = boss.max_health;
            info!(
                boss = %boss.name,
                damage = damage.amount(),
                max_health = boss.max_health,
                "boss defeated; health reset"
            );
        } else {
            debug!(boss = %boss.name, damage = damage.amount(), health = boss.health, "boss damaged");
        }

        BossDamageResponse {
            health: boss.health,
            defeated,
        }
    }

    /// Damage a live player. Fails with `NotFound` when the player has no
    /// live record; an eliminated player is removed in the same step.
    pub fn apply_player_damage(
        &self,
        player_id: &str,
        damage: Damage,
    ) -> Result<i64, EncounterError> {
        match self.players.entry(player_id.to_string()) {
            Entry::Occupied(entry) => Ok(strike(entry, damage)),
            Entry::Vacant(_) => Err(EncounterError::NotFound {
                player_id: player_id.to_string(),
            }),
        }
    }

    /// Like `apply_player_damage`, but a player without a live record is
    /// started on a fresh default record which then takes the hit.
    pub fn apply_player_damage_or_start(&self, player_id: &str, damage: Damage) -> i64 {
        let entry = match self.players.entry(player_id.to_string()) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => {
                debug!(player_id = %player_id, "no live record; starting fresh before damage");
                entry.insert_entry(self.fresh_record(DifficultyTier::default()))
            }
        };
        strike(entry, damage)
    }

    pub fn difficulty(&self, player_id: &str) -> Result<DifficultyTier, EncounterError> {
        self.players
            .get(player_id)
            .map(|record| record.difficulty)
            .ok_or_else(|| EncounterError::NotFound {
                player_id: player_id.to_string(),
            })
    }
}

fn strike(mut entry: OccupiedEntry<'_, PlayerId, PlayerCombatRecord>, damage: Damage) -> i64 {
    let record = entry.get_mut();
    record.hp = record.hp.saturating_sub(damage.amount()).max(0);
    let hp = record.hp;

    if hp == 0 {
        let (player_id, _) = entry.remove_entry();
        info!(player_id = %player_id, "player eliminated; record removed");
    }
    hp
}
