//! Multi-step login conversation that feeds the session store.

pub mod flow;

pub use flow::{LoginFlow, LoginPolicy, LoginReply, LoginState};
