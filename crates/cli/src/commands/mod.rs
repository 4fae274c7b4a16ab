pub mod chat;
pub mod onboard;
pub mod providers;
pub mod serve;
