pub mod controller;
pub mod driver;
pub mod opponent;

pub use controller::{Directive, MoveTicket, Outcome, Phase, SessionController, SessionSnapshot};
pub use driver::{run_session, DriverSettings, SessionCommand, SessionEvent};
pub use opponent::Opponent;
