//! # media-attach
//!
//! Associates media with owner entities in named groups.
//!
//! Owners compose an [`AttachmentCoordinator`] holding their identity and the shared
//! [`MediaContext`]. Attaching media dispatches the conversions declared for the
//! target group; syncing only dispatches for media new to the group.

pub mod association;
pub mod coordinator;
pub mod error;

pub use association::{
    Association, AssociationStore, GroupDiff, MemoryAssociationStore, Owner,
};
pub use coordinator::{AttachmentCoordinator, MediaContext, MediaRef, DEFAULT_GROUP};
pub use error::{AttachError, AttachResult};
