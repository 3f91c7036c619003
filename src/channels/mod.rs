//! Channel abstraction for message I/O.

pub mod channel;
pub mod telegram;
pub mod update;

pub use channel::Messenger;
pub use telegram::TelegramChannel;
pub use update::Update;
