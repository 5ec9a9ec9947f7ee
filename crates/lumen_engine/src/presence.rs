//! Rich presence collaborator, for example a chat client status integration

/// Publishes what the user is doing to an external service
pub trait RichPresence {
    /// Whether the connection is up
    fn initialized(&self) -> bool;

    /// Push the current status; called once per frame while initialized
    fn update_presence(&mut self);

    /// Close the connection
    fn shutdown(&mut self);
}
