//! In-memory storage implementation.
//!
//! All relational tables live behind a single `parking_lot::RwLock`, so
//! every composite operation (quota-checked file insert, invitation
//! accept, cascade delete) runs as one critical section, the in-process
//! analogue of a database transaction. Bearer tokens sit in a `DashMap`
//! outside the lock since token operations never touch other tables'
//! invariants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use notedrop_domain::model::{
    Comment, CommentId, CommentReport, Favorite, FavoriteId, Group, GroupId, Invitation,
    InvitationId, Membership, MembershipId, Note, NoteFile, NoteId, NoteReport, Rating, RatingId,
    Subscription, University, UniversityId, User, UserId,
};
use notedrop_domain::{quota, DomainError};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    DataStore, NewNote, NewNoteFile, NewRating, NewUser, NoteChanges, NoteFilter, UniversityFilter,
    UserFilter,
};

/// Maps a quota-guard denial to the storage error the caller sees.
fn quota_denied(err: DomainError) -> StorageError {
    match err {
        DomainError::StorageQuotaExceeded { limit } => StorageError::QuotaExceeded { limit },
        DomainError::MembershipLimitReached { limit } => StorageError::MembershipLimitReached { limit },
        other => StorageError::Internal {
            message: other.to_string(),
        },
    }
}

/// Relational tables. Keyed by id; unique-together pairs are checked by
/// scan under the write lock, which is the backstop the policy layer's
/// pre-flight checks rely on.
#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    universities: HashMap<UniversityId, University>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<MembershipId, Membership>,
    invitations: HashMap<InvitationId, Invitation>,
    notes: HashMap<NoteId, Note>,
    note_files: HashMap<i64, NoteFile>,
    ratings: HashMap<RatingId, Rating>,
    comments: HashMap<CommentId, Comment>,
    favorites: HashMap<FavoriteId, Favorite>,
    note_reports: HashMap<i64, NoteReport>,
    comment_reports: HashMap<i64, CommentReport>,
    subscriptions: HashMap<i64, Subscription>,
}

impl Tables {
    /// Removes a note and every row hanging off it.
    fn cascade_note(&mut self, note_id: NoteId) {
        self.notes.remove(&note_id);
        self.note_files.retain(|_, f| f.note_id != note_id);
        self.ratings.retain(|_, r| r.note_id != note_id);
        self.favorites.retain(|_, f| f.note_id != note_id);
        self.note_reports.retain(|_, r| r.note_id != note_id);
        let comment_ids: Vec<CommentId> = self
            .comments
            .values()
            .filter(|c| c.note_id == note_id)
            .map(|c| c.id)
            .collect();
        for id in comment_ids {
            self.cascade_comment(id);
        }
    }

    fn cascade_comment(&mut self, comment_id: CommentId) {
        self.comments.remove(&comment_id);
        self.comment_reports.retain(|_, r| r.comment_id != comment_id);
    }

    /// Removes a group, its memberships and invitations, and its
    /// group-scoped notes.
    fn cascade_group(&mut self, group_id: GroupId) {
        self.groups.remove(&group_id);
        self.memberships.retain(|_, m| m.group_id != group_id);
        self.invitations.retain(|_, i| i.group_id != group_id);
        let note_ids: Vec<NoteId> = self
            .notes
            .values()
            .filter(|n| n.group_id == Some(group_id))
            .map(|n| n.id)
            .collect();
        for id in note_ids {
            self.cascade_note(id);
        }
    }

    fn cascade_user(&mut self, user_id: UserId) {
        self.users.remove(&user_id);
        // Groups moderated by the user go first; their cascade may remove
        // notes and comments the later scans would otherwise walk.
        let group_ids: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| g.moderator_id == user_id)
            .map(|g| g.id)
            .collect();
        for id in group_ids {
            self.cascade_group(id);
        }
        let note_ids: Vec<NoteId> = self
            .notes
            .values()
            .filter(|n| n.author_id == user_id)
            .map(|n| n.id)
            .collect();
        for id in note_ids {
            self.cascade_note(id);
        }
        let comment_ids: Vec<CommentId> = self
            .comments
            .values()
            .filter(|c| c.author_id == user_id)
            .map(|c| c.id)
            .collect();
        for id in comment_ids {
            self.cascade_comment(id);
        }
        self.ratings.retain(|_, r| r.author_id != user_id);
        self.memberships.retain(|_, m| m.user_id != user_id);
        self.invitations.retain(|_, i| i.user_id != user_id);
        self.favorites.retain(|_, f| f.user_id != user_id);
        self.note_reports.retain(|_, r| r.user_id != user_id);
        self.comment_reports.retain(|_, r| r.user_id != user_id);
        self.subscriptions.retain(|_, s| s.user_id != user_id);
    }

    fn note_file_total(&self, note_id: NoteId) -> u64 {
        self.note_files
            .values()
            .filter(|f| f.note_id == note_id)
            .map(|f| f.content.len() as u64)
            .sum()
    }

    fn membership_count(&self, user_id: UserId) -> usize {
        self.memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .count()
    }

    fn is_member(&self, group_id: GroupId, user_id: UserId) -> bool {
        self.memberships
            .values()
            .any(|m| m.group_id == group_id && m.user_id == user_id)
    }

    fn insert_membership(&mut self, id: MembershipId, group_id: GroupId, user_id: UserId) -> Membership {
        let membership = Membership {
            id,
            group_id,
            user_id,
            joined_at: Utc::now(),
        };
        self.memberships.insert(id, membership.clone());
        membership
    }
}

/// In-memory implementation of [`DataStore`].
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    next_id: AtomicI64,
    tables: RwLock<Tables>,
    tokens: DashMap<String, UserId>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Parses an `order_by` value into (field, descending).
fn parse_order_by<'a>(value: &'a str, allowed: &[&str]) -> StorageResult<(&'a str, bool)> {
    let (field, desc) = match value.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (value, false),
    };
    if !allowed.contains(&field) {
        return Err(StorageError::InvalidFilter {
            message: format!("cannot order by '{field}'"),
        });
    }
    Ok((field, desc))
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::duplicate("user", &user.username));
        }
        let user = User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            avatar: String::new(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StorageResult<User> {
        self.tables
            .read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("user", id))
    }

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> StorageResult<Vec<User>> {
        let tables = self.tables.read();
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| {
                filter
                    .username
                    .as_ref()
                    .map_or(true, |name| &u.username == name)
            })
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("user", id))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_avatar(&self, id: UserId, avatar: &str) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("user", id))?;
        user.avatar = avatar.to_string();
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> StorageResult<()> {
        {
            let mut tables = self.tables.write();
            if !tables.users.contains_key(&id) {
                return Err(StorageError::not_found("user", id));
            }
            tables.cascade_user(id);
        }
        self.tokens.retain(|_, user_id| *user_id != id);
        debug!(user_id = id, "user deleted with owned rows and sessions");
        Ok(())
    }

    async fn insert_token(&self, token: &str, user_id: UserId) -> StorageResult<()> {
        self.tokens.insert(token.to_string(), user_id);
        Ok(())
    }

    async fn user_for_token(&self, token: &str) -> StorageResult<Option<User>> {
        let Some(user_id) = self.tokens.get(token).map(|t| *t.value()) else {
            return Ok(None);
        };
        Ok(self.tables.read().users.get(&user_id).cloned())
    }

    async fn revoke_tokens(&self, user_id: UserId) -> StorageResult<()> {
        self.tokens.retain(|_, id| *id != user_id);
        Ok(())
    }

    async fn create_university(&self, name: &str) -> StorageResult<University> {
        let id = self.next_id();
        let university = University {
            id,
            name: name.to_string(),
        };
        self.tables.write().universities.insert(id, university.clone());
        Ok(university)
    }

    async fn get_university(&self, id: UniversityId) -> StorageResult<University> {
        self.tables
            .read()
            .universities
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("university", id))
    }

    async fn list_universities(&self, filter: &UniversityFilter) -> StorageResult<Vec<University>> {
        let mut universities: Vec<University> = {
            let tables = self.tables.read();
            tables
                .universities
                .values()
                .filter(|u| {
                    let name = u.name.to_lowercase();
                    filter
                        .starts_with
                        .as_ref()
                        .map_or(true, |p| name.starts_with(&p.to_lowercase()))
                        && filter
                            .contains
                            .as_ref()
                            .map_or(true, |p| name.contains(&p.to_lowercase()))
                })
                .cloned()
                .collect()
        };
        match &filter.order_by {
            Some(order) => {
                let (_, desc) = parse_order_by(order, &["name"])?;
                universities.sort_by(|a, b| a.name.cmp(&b.name));
                if desc {
                    universities.reverse();
                }
            }
            None => universities.sort_by_key(|u| u.id),
        }
        Ok(universities)
    }

    async fn delete_university(&self, id: UniversityId) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.universities.remove(&id).is_none() {
            return Err(StorageError::not_found("university", id));
        }
        // SET NULL semantics: notes keep living without the reference.
        for note in tables.notes.values_mut() {
            if note.university_id == Some(id) {
                note.university_id = None;
            }
        }
        Ok(())
    }

    async fn create_note(&self, note: NewNote) -> StorageResult<Note> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&note.author_id) {
            return Err(StorageError::missing_reference("user", note.author_id));
        }
        if let Some(university_id) = note.university_id {
            if !tables.universities.contains_key(&university_id) {
                return Err(StorageError::missing_reference("university", university_id));
            }
        }
        if let Some(group_id) = note.group_id {
            if !tables.groups.contains_key(&group_id) {
                return Err(StorageError::missing_reference("group", group_id));
            }
        }
        let now = Utc::now();
        let note = Note {
            id,
            author_id: note.author_id,
            title: note.title,
            university_id: note.university_id,
            course: note.course,
            group_id: note.group_id,
            created_at: now,
            updated_at: now,
        };
        tables.notes.insert(id, note.clone());
        Ok(note)
    }

    async fn get_note(&self, id: NoteId) -> StorageResult<Note> {
        self.tables
            .read()
            .notes
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("note", id))
    }

    async fn list_notes(&self, filter: &NoteFilter) -> StorageResult<Vec<Note>> {
        let tables = self.tables.read();
        // Username filters against the author row, the store-side
        // equivalent of a join.
        let author_id = match &filter.username {
            Some(name) => {
                let Some(user) = tables.users.values().find(|u| &u.username == name) else {
                    return Ok(Vec::new());
                };
                Some(user.id)
            }
            None => None,
        };
        let title_needle = filter.title.as_ref().map(|t| t.to_lowercase());
        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| {
                author_id.map_or(true, |id| n.author_id == id)
                    && title_needle
                        .as_ref()
                        .map_or(true, |t| n.title.to_lowercase().contains(t))
                    && filter
                        .university_id
                        .map_or(true, |u| n.university_id == Some(u))
                    && filter.course.as_ref().map_or(true, |c| &n.course == c)
                    && filter.group.map_or(true, |g| n.group_id == g)
            })
            .cloned()
            .collect();
        match &filter.order_by {
            Some(order) => {
                let (field, desc) =
                    parse_order_by(order, &["title", "course", "created_at", "updated_at"])?;
                match field {
                    "title" => notes.sort_by(|a, b| a.title.cmp(&b.title)),
                    "course" => notes.sort_by(|a, b| a.course.cmp(&b.course)),
                    "created_at" => notes.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
                    _ => notes.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
                }
                if desc {
                    notes.reverse();
                }
            }
            None => notes.sort_by_key(|n| n.id),
        }
        Ok(notes)
    }

    async fn update_note(&self, id: NoteId, changes: NoteChanges) -> StorageResult<Note> {
        let mut tables = self.tables.write();
        if let Some(Some(university_id)) = changes.university_id {
            if !tables.universities.contains_key(&university_id) {
                return Err(StorageError::missing_reference("university", university_id));
            }
        }
        let note = tables
            .notes
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("note", id))?;
        if let Some(title) = changes.title {
            note.title = title;
        }
        if let Some(course) = changes.course {
            note.course = course;
        }
        if let Some(university_id) = changes.university_id {
            note.university_id = university_id;
        }
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn delete_note(&self, id: NoteId) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&id) {
            return Err(StorageError::not_found("note", id));
        }
        tables.cascade_note(id);
        Ok(())
    }

    async fn add_note_file(
        &self,
        file: NewNoteFile,
        max_total_bytes: u64,
    ) -> StorageResult<NoteFile> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&file.note_id) {
            return Err(StorageError::missing_reference("note", file.note_id));
        }
        if tables
            .note_files
            .values()
            .any(|f| f.note_id == file.note_id && f.index == file.index)
        {
            return Err(StorageError::duplicate(
                "note file",
                format!("{}/{}", file.note_id, file.index),
            ));
        }
        // Quota sum and insert in the same critical section: concurrent
        // uploads to one note cannot both slip under the ceiling.
        let existing = tables.note_file_total(file.note_id);
        quota::check_storage_quota(existing, file.content.len() as u64, max_total_bytes)
            .map_err(quota_denied)?;
        let note_file = NoteFile {
            id,
            note_id: file.note_id,
            index: file.index,
            filename: file.filename,
            content: file.content,
            created_at: Utc::now(),
        };
        tables.note_files.insert(id, note_file.clone());
        // Observable side effect of a successful upload.
        if let Some(note) = tables.notes.get_mut(&file.note_id) {
            note.updated_at = Utc::now();
        }
        Ok(note_file)
    }

    async fn replace_note_file(
        &self,
        file: NewNoteFile,
        max_total_bytes: u64,
    ) -> StorageResult<NoteFile> {
        let mut tables = self.tables.write();
        // The outgoing file's bytes free up before the incoming ones count.
        let existing: u64 = tables
            .note_files
            .values()
            .filter(|f| f.note_id == file.note_id && f.index != file.index)
            .map(|f| f.content.len() as u64)
            .sum();
        let slot = tables
            .note_files
            .values_mut()
            .find(|f| f.note_id == file.note_id && f.index == file.index)
            .ok_or_else(|| {
                StorageError::not_found("note file", format!("{}/{}", file.note_id, file.index))
            })?;
        quota::check_storage_quota(existing, file.content.len() as u64, max_total_bytes)
            .map_err(quota_denied)?;
        slot.filename = file.filename;
        slot.content = file.content;
        let replaced = slot.clone();
        if let Some(note) = tables.notes.get_mut(&file.note_id) {
            note.updated_at = Utc::now();
        }
        Ok(replaced)
    }

    async fn get_note_file(&self, note_id: NoteId, index: i64) -> StorageResult<NoteFile> {
        self.tables
            .read()
            .note_files
            .values()
            .find(|f| f.note_id == note_id && f.index == index)
            .cloned()
            .ok_or_else(|| StorageError::not_found("note file", format!("{note_id}/{index}")))
    }

    async fn list_note_files(&self, note_id: NoteId) -> StorageResult<Vec<NoteFile>> {
        let mut files: Vec<NoteFile> = self
            .tables
            .read()
            .note_files
            .values()
            .filter(|f| f.note_id == note_id)
            .cloned()
            .collect();
        files.sort_by_key(|f| f.index);
        Ok(files)
    }

    async fn delete_note_file(&self, note_id: NoteId, index: i64) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let id = tables
            .note_files
            .values()
            .find(|f| f.note_id == note_id && f.index == index)
            .map(|f| f.id)
            .ok_or_else(|| StorageError::not_found("note file", format!("{note_id}/{index}")))?;
        tables.note_files.remove(&id);
        Ok(())
    }

    async fn create_rating(&self, rating: NewRating) -> StorageResult<Rating> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&rating.note_id) {
            return Err(StorageError::missing_reference("note", rating.note_id));
        }
        if tables
            .ratings
            .values()
            .any(|r| r.author_id == rating.author_id && r.note_id == rating.note_id)
        {
            return Err(StorageError::duplicate(
                "rating",
                format!("{}/{}", rating.author_id, rating.note_id),
            ));
        }
        let rating = Rating {
            id,
            author_id: rating.author_id,
            note_id: rating.note_id,
            score: rating.score,
        };
        tables.ratings.insert(id, rating.clone());
        Ok(rating)
    }

    async fn get_rating(&self, id: RatingId) -> StorageResult<Rating> {
        self.tables
            .read()
            .ratings
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("rating", id))
    }

    async fn list_ratings(&self, note_id: NoteId) -> StorageResult<Vec<Rating>> {
        let mut ratings: Vec<Rating> = self
            .tables
            .read()
            .ratings
            .values()
            .filter(|r| r.note_id == note_id)
            .cloned()
            .collect();
        ratings.sort_by_key(|r| r.id);
        Ok(ratings)
    }

    async fn update_rating(&self, id: RatingId, score: f64) -> StorageResult<Rating> {
        let mut tables = self.tables.write();
        let rating = tables
            .ratings
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("rating", id))?;
        rating.score = score;
        Ok(rating.clone())
    }

    async fn delete_rating(&self, id: RatingId) -> StorageResult<()> {
        if self.tables.write().ratings.remove(&id).is_none() {
            return Err(StorageError::not_found("rating", id));
        }
        Ok(())
    }

    async fn rating_exists(&self, author_id: UserId, note_id: NoteId) -> StorageResult<bool> {
        Ok(self
            .tables
            .read()
            .ratings
            .values()
            .any(|r| r.author_id == author_id && r.note_id == note_id))
    }

    async fn create_comment(
        &self,
        author_id: UserId,
        note_id: NoteId,
        text: &str,
    ) -> StorageResult<Comment> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&note_id) {
            return Err(StorageError::missing_reference("note", note_id));
        }
        let now = Utc::now();
        let comment = Comment {
            id,
            author_id,
            note_id,
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: CommentId) -> StorageResult<Comment> {
        self.tables
            .read()
            .comments
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("comment", id))
    }

    async fn list_comments(&self, note_id: NoteId) -> StorageResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .tables
            .read()
            .comments
            .values()
            .filter(|c| c.note_id == note_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    async fn update_comment(&self, id: CommentId, text: &str) -> StorageResult<Comment> {
        let mut tables = self.tables.write();
        let comment = tables
            .comments
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("comment", id))?;
        comment.text = text.to_string();
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: CommentId) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if !tables.comments.contains_key(&id) {
            return Err(StorageError::not_found("comment", id));
        }
        tables.cascade_comment(id);
        Ok(())
    }

    async fn create_favorite(&self, user_id: UserId, note_id: NoteId) -> StorageResult<Favorite> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&note_id) {
            return Err(StorageError::missing_reference("note", note_id));
        }
        if tables
            .favorites
            .values()
            .any(|f| f.user_id == user_id && f.note_id == note_id)
        {
            return Err(StorageError::duplicate(
                "favorite",
                format!("{user_id}/{note_id}"),
            ));
        }
        let favorite = Favorite {
            id,
            user_id,
            note_id,
        };
        tables.favorites.insert(id, favorite.clone());
        Ok(favorite)
    }

    async fn get_favorite(&self, id: FavoriteId) -> StorageResult<Favorite> {
        self.tables
            .read()
            .favorites
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("favorite", id))
    }

    async fn list_favorites(&self, note_id: NoteId) -> StorageResult<Vec<Favorite>> {
        let mut favorites: Vec<Favorite> = self
            .tables
            .read()
            .favorites
            .values()
            .filter(|f| f.note_id == note_id)
            .cloned()
            .collect();
        favorites.sort_by_key(|f| f.id);
        Ok(favorites)
    }

    async fn delete_favorite(&self, id: FavoriteId) -> StorageResult<()> {
        if self.tables.write().favorites.remove(&id).is_none() {
            return Err(StorageError::not_found("favorite", id));
        }
        Ok(())
    }

    async fn favorite_exists(&self, user_id: UserId, note_id: NoteId) -> StorageResult<bool> {
        Ok(self
            .tables
            .read()
            .favorites
            .values()
            .any(|f| f.user_id == user_id && f.note_id == note_id))
    }

    async fn create_note_report(
        &self,
        user_id: UserId,
        note_id: NoteId,
    ) -> StorageResult<NoteReport> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.notes.contains_key(&note_id) {
            return Err(StorageError::missing_reference("note", note_id));
        }
        if tables
            .note_reports
            .values()
            .any(|r| r.user_id == user_id && r.note_id == note_id)
        {
            return Err(StorageError::duplicate(
                "note report",
                format!("{user_id}/{note_id}"),
            ));
        }
        let report = NoteReport {
            id,
            user_id,
            note_id,
        };
        tables.note_reports.insert(id, report.clone());
        Ok(report)
    }

    async fn note_report_exists(&self, user_id: UserId, note_id: NoteId) -> StorageResult<bool> {
        Ok(self
            .tables
            .read()
            .note_reports
            .values()
            .any(|r| r.user_id == user_id && r.note_id == note_id))
    }

    async fn create_comment_report(
        &self,
        user_id: UserId,
        comment_id: CommentId,
    ) -> StorageResult<CommentReport> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.comments.contains_key(&comment_id) {
            return Err(StorageError::missing_reference("comment", comment_id));
        }
        if tables
            .comment_reports
            .values()
            .any(|r| r.user_id == user_id && r.comment_id == comment_id)
        {
            return Err(StorageError::duplicate(
                "comment report",
                format!("{user_id}/{comment_id}"),
            ));
        }
        let report = CommentReport {
            id,
            user_id,
            comment_id,
        };
        tables.comment_reports.insert(id, report.clone());
        Ok(report)
    }

    async fn comment_report_exists(
        &self,
        user_id: UserId,
        comment_id: CommentId,
    ) -> StorageResult<bool> {
        Ok(self
            .tables
            .read()
            .comment_reports
            .values()
            .any(|r| r.user_id == user_id && r.comment_id == comment_id))
    }

    async fn create_group(
        &self,
        name: &str,
        moderator_id: UserId,
        max_memberships: Option<usize>,
    ) -> StorageResult<(Group, Membership)> {
        let group_id = self.next_id();
        let membership_id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&moderator_id) {
            return Err(StorageError::missing_reference("user", moderator_id));
        }
        quota::check_membership_quota(tables.membership_count(moderator_id), max_memberships)
            .map_err(quota_denied)?;
        let group = Group {
            id: group_id,
            name: name.to_string(),
            moderator_id,
        };
        tables.groups.insert(group_id, group.clone());
        // The moderator is always also a member.
        let membership = tables.insert_membership(membership_id, group_id, moderator_id);
        Ok((group, membership))
    }

    async fn get_group(&self, id: GroupId) -> StorageResult<Group> {
        self.tables
            .read()
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("group", id))
    }

    async fn list_groups_for_user(&self, user_id: UserId) -> StorageResult<Vec<Group>> {
        let tables = self.tables.read();
        let mut groups: Vec<Group> = tables
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.groups.get(&m.group_id).cloned())
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn update_group(&self, id: GroupId, name: &str) -> StorageResult<Group> {
        let mut tables = self.tables.write();
        let group = tables
            .groups
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("group", id))?;
        group.name = name.to_string();
        Ok(group.clone())
    }

    async fn delete_group(&self, id: GroupId) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if !tables.groups.contains_key(&id) {
            return Err(StorageError::not_found("group", id));
        }
        tables.cascade_group(id);
        debug!(group_id = id, "group deleted with notes and memberships");
        Ok(())
    }

    async fn get_membership(&self, id: MembershipId) -> StorageResult<Membership> {
        self.tables
            .read()
            .memberships
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("membership", id))
    }

    async fn list_memberships(&self, group_id: GroupId) -> StorageResult<Vec<Membership>> {
        let mut memberships: Vec<Membership> = self
            .tables
            .read()
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.id);
        Ok(memberships)
    }

    async fn membership_exists(&self, group_id: GroupId, user_id: UserId) -> StorageResult<bool> {
        Ok(self.tables.read().is_member(group_id, user_id))
    }

    async fn count_memberships_for_user(&self, user_id: UserId) -> StorageResult<usize> {
        Ok(self.tables.read().membership_count(user_id))
    }

    async fn accept_invitation(
        &self,
        group_id: GroupId,
        user_id: UserId,
        max_memberships: Option<usize>,
    ) -> StorageResult<Membership> {
        let membership_id = self.next_id();
        let mut tables = self.tables.write();
        let invitation_id = tables
            .invitations
            .values()
            .find(|i| i.group_id == group_id && i.user_id == user_id)
            .map(|i| i.id)
            .ok_or(StorageError::InvitationMissing { group_id, user_id })?;
        if tables.is_member(group_id, user_id) {
            return Err(StorageError::AlreadyMember { group_id, user_id });
        }
        quota::check_membership_quota(tables.membership_count(user_id), max_memberships)
            .map_err(quota_denied)?;
        let membership = tables.insert_membership(membership_id, group_id, user_id);
        // The invitation is consumed by the join.
        tables.invitations.remove(&invitation_id);
        Ok(membership)
    }

    async fn delete_membership(&self, id: MembershipId) -> StorageResult<()> {
        if self.tables.write().memberships.remove(&id).is_none() {
            return Err(StorageError::not_found("membership", id));
        }
        Ok(())
    }

    async fn create_invitation(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> StorageResult<Invitation> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.groups.contains_key(&group_id) {
            return Err(StorageError::missing_reference("group", group_id));
        }
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::missing_reference("user", user_id));
        }
        if tables.is_member(group_id, user_id) {
            return Err(StorageError::AlreadyMember { group_id, user_id });
        }
        if tables
            .invitations
            .values()
            .any(|i| i.group_id == group_id && i.user_id == user_id)
        {
            return Err(StorageError::duplicate(
                "invitation",
                format!("{group_id}/{user_id}"),
            ));
        }
        let invitation = Invitation {
            id,
            group_id,
            user_id,
        };
        tables.invitations.insert(id, invitation.clone());
        Ok(invitation)
    }

    async fn get_invitation(&self, id: InvitationId) -> StorageResult<Invitation> {
        self.tables
            .read()
            .invitations
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("invitation", id))
    }

    async fn list_invitations(&self, group_id: GroupId) -> StorageResult<Vec<Invitation>> {
        let mut invitations: Vec<Invitation> = self
            .tables
            .read()
            .invitations
            .values()
            .filter(|i| i.group_id == group_id)
            .cloned()
            .collect();
        invitations.sort_by_key(|i| i.id);
        Ok(invitations)
    }

    async fn invitation_exists(&self, group_id: GroupId, user_id: UserId) -> StorageResult<bool> {
        Ok(self
            .tables
            .read()
            .invitations
            .values()
            .any(|i| i.group_id == group_id && i.user_id == user_id))
    }

    async fn delete_invitation(&self, id: InvitationId) -> StorageResult<()> {
        if self.tables.write().invitations.remove(&id).is_none() {
            return Err(StorageError::not_found("invitation", id));
        }
        Ok(())
    }

    async fn create_subscription(
        &self,
        user_id: UserId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<Subscription> {
        let id = self.next_id();
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::missing_reference("user", user_id));
        }
        let subscription = Subscription {
            id,
            user_id,
            starts_at,
            expires_at,
        };
        tables.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(&self, user_id: UserId) -> StorageResult<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .tables
            .read()
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }
}
