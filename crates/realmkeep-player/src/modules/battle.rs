//! Battle record.

use realmkeep_store::collections;
use serde::{Deserialize, Serialize};

use crate::{Module, ModuleKind, PlayerBase, PlayerModule};

const START_RATING: i32 = 1000;
const RATING_STEP: i32 = 16;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BattleModule {
    #[serde(default)]
    wins: u32,
    #[serde(default)]
    losses: u32,
    #[serde(default)]
    rating: i32,
    /// Battles fought since the last login.
    #[serde(skip)]
    session_battles: u32,
}

impl BattleModule {
    pub fn record(&mut self, won: bool) {
        if won {
            self.wins += 1;
            self.rating += RATING_STEP;
        } else {
            self.losses += 1;
            self.rating = (self.rating - RATING_STEP).max(0);
        }
        self.session_battles += 1;
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn rating(&self) -> i32 {
        self.rating
    }

    pub fn session_battles(&self) -> u32 {
        self.session_battles
    }
}

impl PlayerModule for BattleModule {
    const KIND: ModuleKind = ModuleKind::Battle;
    const COLLECTION: &'static str = collections::BATTLE;

    fn init(&mut self, _owner: &PlayerBase) {
        self.rating = START_RATING;
    }

    fn on_login(&mut self, _owner: &PlayerBase) {
        self.session_battles = 0;
    }

    fn project(module: &Module) -> Option<&Self> {
        match module {
            Module::Battle(m) => Some(m),
            _ => None,
        }
    }

    fn project_mut(module: &mut Module) -> Option<&mut Self> {
        match module {
            Module::Battle(m) => Some(m),
            _ => None,
        }
    }
}
