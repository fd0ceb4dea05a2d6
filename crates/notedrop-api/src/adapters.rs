//! Adapter bridging the storage backend to the domain policy seam.

use std::sync::Arc;

use async_trait::async_trait;

use notedrop_domain::model::{
    Comment, CommentId, Group, GroupId, Invitation, InvitationId, Note, NoteId, UserId,
};
use notedrop_domain::{AccessReader, DomainError, DomainResult};
use notedrop_storage::{DataStore, StorageError, StorageResult};

/// [`AccessReader`] implementation over any [`DataStore`].
///
/// Policies treat a missing row as a denial, so storage `NotFound` becomes
/// `Ok(None)` here; every other storage failure surfaces as `ReadFailed`.
pub struct StoreAccessReader<S> {
    storage: Arc<S>,
}

impl<S> StoreAccessReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

impl<S> Clone for StoreAccessReader<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

fn optional<T>(result: StorageResult<T>) -> DomainResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StorageError::NotFound { .. }) => Ok(None),
        Err(err) => Err(DomainError::ReadFailed {
            message: err.to_string(),
        }),
    }
}

fn reading<T>(result: StorageResult<T>) -> DomainResult<T> {
    result.map_err(|err| DomainError::ReadFailed {
        message: err.to_string(),
    })
}

#[async_trait]
impl<S: DataStore> AccessReader for StoreAccessReader<S> {
    async fn note(&self, id: NoteId) -> DomainResult<Option<Note>> {
        optional(self.storage.get_note(id).await)
    }

    async fn group(&self, id: GroupId) -> DomainResult<Option<Group>> {
        optional(self.storage.get_group(id).await)
    }

    async fn comment(&self, id: CommentId) -> DomainResult<Option<Comment>> {
        optional(self.storage.get_comment(id).await)
    }

    async fn invitation(&self, id: InvitationId) -> DomainResult<Option<Invitation>> {
        optional(self.storage.get_invitation(id).await)
    }

    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool> {
        reading(self.storage.membership_exists(group_id, user_id).await)
    }

    async fn has_invitation(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool> {
        reading(self.storage.invitation_exists(group_id, user_id).await)
    }

    async fn has_rating(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
        reading(self.storage.rating_exists(user_id, note_id).await)
    }

    async fn has_favorite(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
        reading(self.storage.favorite_exists(user_id, note_id).await)
    }

    async fn has_note_report(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
        reading(self.storage.note_report_exists(user_id, note_id).await)
    }

    async fn has_comment_report(
        &self,
        user_id: UserId,
        comment_id: CommentId,
    ) -> DomainResult<bool> {
        reading(self.storage.comment_report_exists(user_id, comment_id).await)
    }
}
