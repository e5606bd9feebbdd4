use meshtask_messages::BaseId;
use thiserror::Error;

/// Errors surfaced by the core, per the error-kinds table: most variants
/// are fatal to the owning rank's process, `NotInitialized` and
/// `UserTaskFailure` are reported back to the caller.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("received an unsupported wire operation from rank {from}")]
    UnsupportedOperation { from: meshtask_messages::Rank },

    #[error("transport does not offer the required threading level")]
    ThreadLevelUnavailable,

    #[error("controller API called before init()")]
    NotInitialized,

    #[error("task raised while producing id {id}: {message}")]
    UserTaskFailure { id: BaseId, message: String },

    #[error("transport failure: {0}")]
    Transport(#[from] meshtask_transport::TransportError),

    #[error("wait() requested {requested} returns over only {available} ids")]
    WaitOverflow { requested: usize, available: usize },
}
