//! streamchat-bot: joins one live-stream chat channel, says hello, answers
//! a few chat commands, and keeps reconnecting until stopped.

pub mod config;
pub mod controller;
pub mod logging;
