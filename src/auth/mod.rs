mod session;

pub use session::{AuthError, Profile, Session, SessionManager};
