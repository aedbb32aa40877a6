mod handler;

pub use handler::{ActionError, ActionOutcome, UserActionHandler};
