/// Agent input problems caught before anything goes over the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a phone number")]
    EmptyPhoneNumber,
    #[error("Please select a call disposition")]
    MissingDisposition,
    #[error("Unknown disposition: {0}")]
    UnknownDisposition(String),
    #[error("Please enter call notes")]
    EmptyNotes,
    #[error("{0} needs some content")]
    EmptyCommandContent(&'static str),
}
