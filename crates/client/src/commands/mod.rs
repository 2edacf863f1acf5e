pub mod chat;
pub mod chats;
pub mod history;
