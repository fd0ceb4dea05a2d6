//! DataStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use notedrop_domain::model::{
    Comment, CommentId, CommentReport, Favorite, FavoriteId, Group, GroupId, Invitation,
    InvitationId, Membership, MembershipId, Note, NoteFile, NoteId, NoteReport, Rating, RatingId,
    Subscription, University, UniversityId, User, UserId,
};

use crate::error::StorageResult;

/// Insert payload for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Insert payload for a new note.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub author_id: UserId,
    pub title: String,
    pub university_id: Option<UniversityId>,
    pub course: String,
    pub group_id: Option<GroupId>,
}

/// Partial update for a note. `university_id` is doubly optional so the
/// caller can distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub course: Option<String>,
    pub university_id: Option<Option<UniversityId>>,
}

/// Insert payload for a new note file.
#[derive(Debug, Clone)]
pub struct NewNoteFile {
    pub note_id: NoteId,
    pub index: i64,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Insert payload for a new rating.
#[derive(Debug, Clone)]
pub struct NewRating {
    pub author_id: UserId,
    pub note_id: NoteId,
    pub score: f64,
}

/// Filter for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Exact username match.
    pub username: Option<String>,
}

/// Filter for listing notes.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    /// Exact author username match.
    pub username: Option<String>,
    /// Case-insensitive title substring.
    pub title: Option<String>,
    /// Exact university reference.
    pub university_id: Option<UniversityId>,
    /// Exact course match.
    pub course: Option<String>,
    /// Group scope: `None` = any, `Some(None)` = personal/public notes
    /// only, `Some(Some(g))` = notes of group g.
    pub group: Option<Option<GroupId>>,
    /// Field-name sort; `-` prefix for descending. Allowed: title, course,
    /// created_at, updated_at.
    pub order_by: Option<String>,
}

/// Filter for listing universities.
#[derive(Debug, Clone, Default)]
pub struct UniversityFilter {
    pub starts_with: Option<String>,
    pub contains: Option<String>,
    /// Only `name` (or `-name`) is sortable.
    pub order_by: Option<String>,
}

/// Abstract storage interface for notedrop entities.
///
/// Implementations must be thread-safe (Send + Sync) and support async
/// operations. Methods that combine a read with a dependent write
/// (`create_group`, `accept_invitation`, `add_note_file`,
/// `create_invitation`) must execute atomically: they carry the system's
/// cross-row invariants.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // User operations

    /// Creates a user. Fails with `Duplicate` when the username is taken.
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;

    async fn get_user(&self, id: UserId) -> StorageResult<User>;

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;

    async fn list_users(&self, filter: &UserFilter) -> StorageResult<Vec<User>>;

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> StorageResult<()>;

    /// Replaces the avatar reference; an empty string clears it.
    async fn set_avatar(&self, id: UserId, avatar: &str) -> StorageResult<()>;

    /// Deletes a user and cascades to every dependent row, including
    /// groups the user moderates.
    async fn delete_user(&self, id: UserId) -> StorageResult<()>;

    // Bearer token operations

    async fn insert_token(&self, token: &str, user_id: UserId) -> StorageResult<()>;

    async fn user_for_token(&self, token: &str) -> StorageResult<Option<User>>;

    /// Revokes every token held by the user.
    async fn revoke_tokens(&self, user_id: UserId) -> StorageResult<()>;

    // University operations

    async fn create_university(&self, name: &str) -> StorageResult<University>;

    async fn get_university(&self, id: UniversityId) -> StorageResult<University>;

    async fn list_universities(&self, filter: &UniversityFilter) -> StorageResult<Vec<University>>;

    /// Deletes a university; referencing notes keep a null university.
    async fn delete_university(&self, id: UniversityId) -> StorageResult<()>;

    // Note operations

    async fn create_note(&self, note: NewNote) -> StorageResult<Note>;

    async fn get_note(&self, id: NoteId) -> StorageResult<Note>;

    async fn list_notes(&self, filter: &NoteFilter) -> StorageResult<Vec<Note>>;

    async fn update_note(&self, id: NoteId, changes: NoteChanges) -> StorageResult<Note>;

    async fn delete_note(&self, id: NoteId) -> StorageResult<()>;

    // Note file operations

    /// Adds a file to a note, atomically checking the cumulative size of
    /// the note's files plus the incoming payload against
    /// `max_total_bytes`, and bumps the parent note's `updated_at`.
    async fn add_note_file(
        &self,
        file: NewNoteFile,
        max_total_bytes: u64,
    ) -> StorageResult<NoteFile>;

    /// Replaces the file at an existing slot. The quota check counts the
    /// incoming payload against the note total minus the outgoing file,
    /// and the parent note's `updated_at` is bumped like on add.
    async fn replace_note_file(
        &self,
        file: NewNoteFile,
        max_total_bytes: u64,
    ) -> StorageResult<NoteFile>;

    async fn get_note_file(&self, note_id: NoteId, index: i64) -> StorageResult<NoteFile>;

    /// Lists a note's files ordered by index.
    async fn list_note_files(&self, note_id: NoteId) -> StorageResult<Vec<NoteFile>>;

    async fn delete_note_file(&self, note_id: NoteId, index: i64) -> StorageResult<()>;

    // Rating operations

    /// Creates a rating. Fails with `Duplicate` on a second (author, note)
    /// pair.
    async fn create_rating(&self, rating: NewRating) -> StorageResult<Rating>;

    async fn get_rating(&self, id: RatingId) -> StorageResult<Rating>;

    async fn list_ratings(&self, note_id: NoteId) -> StorageResult<Vec<Rating>>;

    async fn update_rating(&self, id: RatingId, score: f64) -> StorageResult<Rating>;

    async fn delete_rating(&self, id: RatingId) -> StorageResult<()>;

    async fn rating_exists(&self, author_id: UserId, note_id: NoteId) -> StorageResult<bool>;

    // Comment operations

    async fn create_comment(
        &self,
        author_id: UserId,
        note_id: NoteId,
        text: &str,
    ) -> StorageResult<Comment>;

    async fn get_comment(&self, id: CommentId) -> StorageResult<Comment>;

    async fn list_comments(&self, note_id: NoteId) -> StorageResult<Vec<Comment>>;

    async fn update_comment(&self, id: CommentId, text: &str) -> StorageResult<Comment>;

    async fn delete_comment(&self, id: CommentId) -> StorageResult<()>;

    // Favorite operations

    async fn create_favorite(&self, user_id: UserId, note_id: NoteId) -> StorageResult<Favorite>;

    async fn get_favorite(&self, id: FavoriteId) -> StorageResult<Favorite>;

    async fn list_favorites(&self, note_id: NoteId) -> StorageResult<Vec<Favorite>>;

    async fn delete_favorite(&self, id: FavoriteId) -> StorageResult<()>;

    async fn favorite_exists(&self, user_id: UserId, note_id: NoteId) -> StorageResult<bool>;

    // Report operations

    async fn create_note_report(&self, user_id: UserId, note_id: NoteId)
        -> StorageResult<NoteReport>;

    async fn note_report_exists(&self, user_id: UserId, note_id: NoteId) -> StorageResult<bool>;

    async fn create_comment_report(
        &self,
        user_id: UserId,
        comment_id: CommentId,
    ) -> StorageResult<CommentReport>;

    async fn comment_report_exists(
        &self,
        user_id: UserId,
        comment_id: CommentId,
    ) -> StorageResult<bool>;

    // Group operations

    /// Creates a group and the moderator's own membership in one step.
    /// When `max_memberships` is set, the moderator's membership count is
    /// checked against it first.
    async fn create_group(
        &self,
        name: &str,
        moderator_id: UserId,
        max_memberships: Option<usize>,
    ) -> StorageResult<(Group, Membership)>;

    async fn get_group(&self, id: GroupId) -> StorageResult<Group>;

    /// Groups the user belongs to, via memberships.
    async fn list_groups_for_user(&self, user_id: UserId) -> StorageResult<Vec<Group>>;

    async fn update_group(&self, id: GroupId, name: &str) -> StorageResult<Group>;

    async fn delete_group(&self, id: GroupId) -> StorageResult<()>;

    // Membership operations

    async fn get_membership(&self, id: MembershipId) -> StorageResult<Membership>;

    async fn list_memberships(&self, group_id: GroupId) -> StorageResult<Vec<Membership>>;

    async fn membership_exists(&self, group_id: GroupId, user_id: UserId) -> StorageResult<bool>;

    async fn count_memberships_for_user(&self, user_id: UserId) -> StorageResult<usize>;

    /// Consumes a pending invitation in one atomic step: checks it
    /// exists, checks the membership ceiling, creates the membership,
    /// and deletes the invitation.
    async fn accept_invitation(
        &self,
        group_id: GroupId,
        user_id: UserId,
        max_memberships: Option<usize>,
    ) -> StorageResult<Membership>;

    async fn delete_membership(&self, id: MembershipId) -> StorageResult<()>;

    // Invitation operations

    /// Creates an invitation. Fails with `AlreadyMember` when the target
    /// user already holds a membership, `Duplicate` on a repeated pair.
    async fn create_invitation(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> StorageResult<Invitation>;

    async fn get_invitation(&self, id: InvitationId) -> StorageResult<Invitation>;

    async fn list_invitations(&self, group_id: GroupId) -> StorageResult<Vec<Invitation>>;

    async fn invitation_exists(&self, group_id: GroupId, user_id: UserId) -> StorageResult<bool>;

    async fn delete_invitation(&self, id: InvitationId) -> StorageResult<()>;

    // Subscription operations

    async fn create_subscription(
        &self,
        user_id: UserId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<Subscription>;

    async fn list_subscriptions(&self, user_id: UserId) -> StorageResult<Vec<Subscription>>;
}
