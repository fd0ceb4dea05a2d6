//! Entity types shared across the workspace.
//!
//! Every entity carries an opaque `i64` key assigned by the store. Field
//! names and the unique-together pairs follow the relational model:
//! (group, user) on memberships and invitations, (author, note) on ratings,
//! (user, note) on favorites and note reports, (user, comment) on comment
//! reports, (note, index) on files.

use chrono::{DateTime, Utc};

pub type UserId = i64;
pub type UniversityId = i64;
pub type GroupId = i64;
pub type MembershipId = i64;
pub type InvitationId = i64;
pub type NoteId = i64;
pub type NoteFileId = i64;
pub type RatingId = i64;
pub type CommentId = i64;
pub type FavoriteId = i64;
pub type ReportId = i64;
pub type SubscriptionId = i64;

/// Maximum length of a note title or course name.
pub const MAX_TITLE_LEN: usize = 50;
/// Maximum length of a comment body.
pub const MAX_COMMENT_LEN: usize = 500;
/// File extensions accepted for note uploads.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "png", "jpg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// PHC-format password hash. Never serialized to clients.
    pub password_hash: String,
    /// Avatar reference; empty string means no avatar.
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct University {
    pub id: UniversityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// The creating user. Immutable: there is no transfer operation.
    pub moderator_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

/// A pending offer to join a group. Consumed atomically when the invited
/// user joins; never expires on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: InvitationId,
    pub group_id: GroupId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub author_id: UserId,
    pub title: String,
    pub university_id: Option<UniversityId>,
    pub course: String,
    /// None means a personal/public note; Some scopes visibility and edit
    /// rights to the group.
    pub group_id: Option<GroupId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFile {
    pub id: NoteFileId,
    pub note_id: NoteId,
    /// Caller-assigned ordinal, unique per note. Not auto-incremented.
    pub index: i64,
    pub filename: String,
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub id: RatingId,
    pub author_id: UserId,
    pub note_id: NoteId,
    /// Constrained to [0, 5] inclusive.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: UserId,
    pub note_id: NoteId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorite {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub note_id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteReport {
    pub id: ReportId,
    pub user_id: UserId,
    pub note_id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentReport {
    pub id: ReportId,
    pub user_id: UserId,
    pub comment_id: CommentId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether this subscription covers the given instant.
    /// The interval is half-open: `[starts_at, expires_at)`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.expires_at
    }
}

/// Ownership seam for object-level policies.
///
/// Each entity that can be the target of an author/user check exposes the
/// user it belongs to, so policies never probe field names.
pub trait Owned {
    fn owner(&self) -> UserId;
}

impl Owned for Note {
    fn owner(&self) -> UserId {
        self.author_id
    }
}

impl Owned for Rating {
    fn owner(&self) -> UserId {
        self.author_id
    }
}

impl Owned for Comment {
    fn owner(&self) -> UserId {
        self.author_id
    }
}

impl Owned for Favorite {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for NoteReport {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for CommentReport {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for Membership {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for Invitation {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for Subscription {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

/// Arithmetic mean of rating scores, or 0 when the note has none.
pub fn average_rating(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: f64 = ratings.iter().map(|r| r.score).sum();
    total / ratings.len() as f64
}

/// Checks an upload filename against the extension whitelist.
pub fn extension_allowed(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
