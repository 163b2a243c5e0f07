//! Client runtime: reconnection, local view reconciliation and the session
//! that ties them to a transport.
//!
//! ```text
//! Connector ──► ClientSession ──► LocalView ◄── SessionHandle
//!                   │    ▲
//!        PollReader ┘    └ ReconnectMachine (Clock)
//! ```

mod clock;
mod reconciler;
mod reconnect;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use reconciler::{LocalView, ViewChange};
pub use reconnect::{Backoff, NextStep, ReconnectMachine, ReconnectPolicy, ReconnectState};
pub use session::{ClientSession, SessionHandle, SessionSettings, SessionStatus};
