//! Private chat history.

use std::collections::VecDeque;

use realmkeep_protocol::PlayerId;
use realmkeep_store::collections;
use serde::{Deserialize, Serialize};

use crate::{Module, ModuleKind, PlayerBase, PlayerModule};

/// Lines kept per player.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub from: PlayerId,
    pub text: String,
    pub at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatModule {
    #[serde(default)]
    history: VecDeque<ChatLine>,
    #[serde(default)]
    sent: u64,
    /// Lines received this session.
    #[serde(skip)]
    unread: u32,
}

impl ChatModule {
    pub fn receive(&mut self, from: PlayerId, text: impl Into<String>) {
        self.history.push_back(ChatLine {
            from,
            text: text.into(),
            at: chrono::Utc::now().timestamp(),
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.unread += 1;
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatLine> {
        self.history.iter()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }
}

impl PlayerModule for ChatModule {
    const KIND: ModuleKind = ModuleKind::Chat;
    const COLLECTION: &'static str = collections::CHAT;

    fn on_login(&mut self, _owner: &PlayerBase) {
        self.unread = 0;
    }

    fn project(module: &Module) -> Option<&Self> {
        match module {
            Module::Chat(m) => Some(m),
            _ => None,
        }
    }

    fn project_mut(module: &mut Module) -> Option<&mut Self> {
        match module {
            Module::Chat(m) => Some(m),
            _ => None,
        }
    }
}
