/// What the login session layer needs from an account.
///
/// The session cookie stores only [`get_id`](AuthenticatedPrincipal::get_id);
/// the principal is reloaded from that id on every request.
pub trait AuthenticatedPrincipal {
    /// Stable identifier, stored in the session.
    fn get_id(&self) -> String;

    fn is_active(&self) -> bool;

    fn is_authenticated(&self) -> bool {
        true
    }

    fn is_anonymous(&self) -> bool {
        false
    }
}
