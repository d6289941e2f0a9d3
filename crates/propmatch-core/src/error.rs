use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PropMatchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Listing {0} not found")]
    ListingNotFound(Uuid),

    #[error("Group {0} not found")]
    GroupNotFound(Uuid),

    /// A listing's group reference points at a group that does not exist.
    /// This indicates an invariant violation elsewhere in the system and is
    /// fatal for that listing's processing.
    #[error("Listing {listing_id} references missing group {group_id}")]
    DanglingGroupRef { listing_id: Uuid, group_id: Uuid },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
