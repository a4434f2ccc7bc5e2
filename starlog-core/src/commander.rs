//! In-memory commander state.
//!
//! The state machine owns one [`CommanderState`]; it is never persisted.
//! Rank, reputation, and powerplay events apply partial updates; absent
//! fields leave current values untouched. Backfill resets the whole thing
//! before replaying history.

use serde::{Deserialize, Serialize};

use crate::journal::{GameStart, PowerplayUpdate, RankUpdate, ReputationUpdate};

/// Ranks (or rank progress) across the eight career categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranks {
    /// Combat.
    pub combat: u8,
    /// Trade.
    pub trade: u8,
    /// Exploration.
    pub explore: u8,
    /// Mercenary.
    pub soldier: u8,
    /// Exobiologist.
    pub exobiologist: u8,
    /// Empire navy.
    pub empire: u8,
    /// Federation navy.
    pub federation: u8,
    /// Arena.
    pub cqc: u8,
}

impl Ranks {
    fn apply(&mut self, update: &RankUpdate) {
        if let Some(v) = update.combat {
            self.combat = v;
        }
        if let Some(v) = update.trade {
            self.trade = v;
        }
        if let Some(v) = update.explore {
            self.explore = v;
        }
        if let Some(v) = update.soldier {
            self.soldier = v;
        }
        if let Some(v) = update.exobiologist {
            self.exobiologist = v;
        }
        if let Some(v) = update.empire {
            self.empire = v;
        }
        if let Some(v) = update.federation {
            self.federation = v;
        }
        if let Some(v) = update.cqc {
            self.cqc = v;
        }
    }
}

/// Reputation with the four major factions, each clamped to -100..100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    /// Empire axis.
    pub empire: f64,
    /// Federation axis.
    pub federation: f64,
    /// Alliance axis.
    pub alliance: f64,
    /// Independent axis.
    pub independent: f64,
}

impl Reputation {
    fn apply(&mut self, update: &ReputationUpdate) {
        if let Some(v) = update.empire {
            self.empire = v.clamp(-100.0, 100.0);
        }
        if let Some(v) = update.federation {
            self.federation = v.clamp(-100.0, 100.0);
        }
        if let Some(v) = update.alliance {
            self.alliance = v.clamp(-100.0, 100.0);
        }
        if let Some(v) = update.independent {
            self.independent = v.clamp(-100.0, 100.0);
        }
    }
}

/// Standing with a pledged power.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerplayStanding {
    /// Power name.
    pub power: String,
    /// Rank with that power.
    pub rank: u32,
    /// Accumulated merits.
    pub merits: i64,
}

/// Process-wide commander snapshot, derived purely from journal events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommanderState {
    /// Commander name.
    pub name: Option<String>,
    /// Credit balance.
    pub credits: i64,
    /// Outstanding loan.
    pub loan: i64,
    /// Current ship type.
    pub ship: Option<String>,
    /// Absolute ranks.
    pub ranks: Ranks,
    /// Progress (percent) towards the next rank per category.
    pub progress: Ranks,
    /// Faction reputation.
    pub reputation: Reputation,
    /// Powerplay standing, when pledged.
    pub powerplay: Option<PowerplayStanding>,
}

impl CommanderState {
    /// Reset to a blank state (backfill start, new commander).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply a session-start payload.
    pub fn apply_game_start(&mut self, start: &GameStart) {
        if let Some(name) = &start.commander {
            self.name = Some(name.clone());
        }
        if let Some(ship) = &start.ship {
            self.ship = Some(ship.clone());
        }
        if let Some(credits) = start.credits {
            self.credits = credits;
        }
        if let Some(loan) = start.loan {
            self.loan = loan;
        }
    }

    /// Apply an absolute rank update.
    pub fn apply_rank(&mut self, update: &RankUpdate) {
        self.ranks.apply(update);
    }

    /// Apply a rank-progress update.
    pub fn apply_progress(&mut self, update: &RankUpdate) {
        self.progress.apply(update);
    }

    /// Apply a reputation update.
    pub fn apply_reputation(&mut self, update: &ReputationUpdate) {
        self.reputation.apply(update);
    }

    /// Apply a powerplay update.
    pub fn apply_powerplay(&mut self, update: &PowerplayUpdate) {
        let standing = self.powerplay.get_or_insert_with(PowerplayStanding::default);
        standing.power.clone_from(&update.power);
        if let Some(rank) = update.rank {
            standing.rank = rank;
        }
        if let Some(merits) = update.merits {
            standing.merits = merits;
        }
    }
}
