//! The four player modules.

mod battle;
mod chat;
mod friend;
mod mail;

pub use battle::BattleModule;
pub use chat::{ChatLine, ChatModule};
pub use friend::{FriendApplication, FriendModule, FriendRecord};
pub use mail::{Mail, MailModule};
