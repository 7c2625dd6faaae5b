//! Session-ended collaborator port

/// Receives the "session ended" signal when a credential cannot be renewed.
///
/// The surrounding UI layer owns navigation; this port only tells it that
/// the user must sign in again.
pub trait SessionListener: Send + Sync {
    /// Called once per unrecoverable refresh failure.
    fn session_ended(&self);

    /// Returns true if the user is already looking at the login surface,
    /// in which case `session_ended` is not called.
    fn is_on_login_surface(&self) -> bool {
        false
    }
}

impl<F> SessionListener for F
where
    F: Fn() + Send + Sync,
{
    fn session_ended(&self) {
        self();
    }
}
