//! Access policy engine.
//!
//! Every mutating endpoint declares an ordered slice of [`Policy`]
//! descriptors; [`evaluate`] ANDs them together with short-circuit on the
//! first failure. Predicates are pure: they read entity state through the
//! [`AccessReader`] seam and never mutate anything, so evaluation order is
//! not observable beyond efficiency.
//!
//! Two predicate shapes exist, matching the route-level / object-level
//! split: route-level checks resolve their target from the request's route
//! ids, object-level checks look at the already-resolved [`Target`].
//! A missing target always evaluates to deny, never to an error, so probing
//! ids does not leak existence.

use async_trait::async_trait;

use crate::error::{DomainError, DomainResult};
use crate::model::{
    Comment, CommentId, Favorite, Group, GroupId, Invitation, InvitationId, Membership, Note,
    NoteId, Owned, Rating, UserId,
};

/// HTTP verb, reduced to what policies care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Safe (read-only) verbs always pass the *OrReadOnly predicates.
    pub fn is_safe(self) -> bool {
        matches!(self, Verb::Get | Verb::Head | Verb::Options)
    }
}

/// The already-resolved object a request targets, for object-level checks.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Note(&'a Note),
    Rating(&'a Rating),
    Comment(&'a Comment),
    Favorite(&'a Favorite),
    Group(&'a Group),
    Membership(&'a Membership),
    Invitation(&'a Invitation),
}

impl Target<'_> {
    /// The user this object belongs to, where ownership is defined.
    fn owner(&self) -> Option<UserId> {
        match self {
            Target::Note(n) => Some(n.owner()),
            Target::Rating(r) => Some(r.owner()),
            Target::Comment(c) => Some(c.owner()),
            Target::Favorite(f) => Some(f.owner()),
            Target::Membership(m) => Some(m.owner()),
            Target::Invitation(i) => Some(i.owner()),
            Target::Group(_) => None,
        }
    }
}

/// Route parameters plus the resolved target for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub verb: Verb,
    pub note_id: Option<NoteId>,
    pub group_id: Option<GroupId>,
    pub comment_id: Option<CommentId>,
    pub invitation_id: Option<InvitationId>,
    pub target: Option<Target<'a>>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            note_id: None,
            group_id: None,
            comment_id: None,
            invitation_id: None,
            target: None,
        }
    }

    pub fn note(mut self, id: NoteId) -> Self {
        self.note_id = Some(id);
        self
    }

    pub fn group(mut self, id: GroupId) -> Self {
        self.group_id = Some(id);
        self
    }

    pub fn comment(mut self, id: CommentId) -> Self {
        self.comment_id = Some(id);
        self
    }

    pub fn invitation(mut self, id: InvitationId) -> Self {
        self.invitation_id = Some(id);
        self
    }

    pub fn target(mut self, target: Target<'a>) -> Self {
        self.target = Some(target);
        self
    }
}

/// Read-only view of entity state, as narrow as the policies need.
///
/// The HTTP layer adapts the storage backend to this trait; tests supply
/// an in-memory mock.
#[async_trait]
pub trait AccessReader: Send + Sync {
    async fn note(&self, id: NoteId) -> DomainResult<Option<Note>>;
    async fn group(&self, id: GroupId) -> DomainResult<Option<Group>>;
    async fn comment(&self, id: CommentId) -> DomainResult<Option<Comment>>;
    async fn invitation(&self, id: InvitationId) -> DomainResult<Option<Invitation>>;
    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool>;
    async fn has_invitation(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool>;
    async fn has_rating(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool>;
    async fn has_favorite(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool>;
    async fn has_note_report(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool>;
    async fn has_comment_report(&self, user_id: UserId, comment_id: CommentId)
        -> DomainResult<bool>;
}

/// Enum-tagged policy descriptors.
///
/// Endpoints compose these as `&[Policy]` slices; there is no precedence,
/// a single false denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Read passes; write requires actor == object owner.
    IsAuthorOrReadOnly,
    /// Read passes; write requires actor == moderator of the route group.
    IsModeratorOrReadOnly,
    /// Read passes; write requires actor == owner, or actor moderates the
    /// object's (non-null) group.
    IsAuthorOrModeratorOrReadOnly,
    /// Author, public note, or group member. Missing note denies.
    CanAccessNote,
    /// Like CanAccessNote, but safe verbs pass for non-members too.
    CanAccessFavorite,
    /// Actor holds a membership in the route group.
    CanAccessGroup,
    /// POST requires a pending invitation; other verbs require membership.
    HasInvitation,
    /// Actor is the route group's moderator.
    IsModerator,
    /// Actor is the group's moderator or the invitation's target user.
    IsModeratorOrInvitee,
    /// Route-level: actor authored the route note (file write path).
    IsNoteAuthor,
    /// POST denied when the (actor, note) rating already exists.
    NotAlreadyRated,
    /// POST denied when the (actor, note) favorite already exists.
    NotAlreadyFavorited,
    /// POST denied when the (actor, note) report already exists.
    NotAlreadyReportedNote,
    /// POST denied when the (actor, comment) report already exists.
    NotAlreadyReportedComment,
}

impl Policy {
    pub fn name(&self) -> &'static str {
        match self {
            Policy::IsAuthorOrReadOnly => "IsAuthorOrReadOnly",
            Policy::IsModeratorOrReadOnly => "IsModeratorOrReadOnly",
            Policy::IsAuthorOrModeratorOrReadOnly => "IsAuthorOrModeratorOrReadOnly",
            Policy::CanAccessNote => "CanAccessNote",
            Policy::CanAccessFavorite => "CanAccessFavorite",
            Policy::CanAccessGroup => "CanAccessGroup",
            Policy::HasInvitation => "HasInvitation",
            Policy::IsModerator => "IsModerator",
            Policy::IsModeratorOrInvitee => "IsModeratorOrInvitee",
            Policy::IsNoteAuthor => "IsNoteAuthor",
            Policy::NotAlreadyRated => "NotAlreadyRated",
            Policy::NotAlreadyFavorited => "NotAlreadyFavorited",
            Policy::NotAlreadyReportedNote => "NotAlreadyReportedNote",
            Policy::NotAlreadyReportedComment => "NotAlreadyReportedComment",
        }
    }

    /// Evaluates this predicate. `Ok(false)` is an ordinary denial;
    /// `Err` is reserved for reader failures.
    pub async fn allows<R: AccessReader>(
        &self,
        actor: Option<UserId>,
        req: &AccessRequest<'_>,
        reader: &R,
    ) -> DomainResult<bool> {
        match self {
            Policy::IsAuthorOrReadOnly => {
                if req.verb.is_safe() {
                    return Ok(true);
                }
                let (Some(actor), Some(target)) = (actor, req.target) else {
                    return Ok(false);
                };
                Ok(target.owner() == Some(actor))
            }

            Policy::IsModeratorOrReadOnly => {
                if req.verb.is_safe() {
                    return Ok(true);
                }
                let Some(actor) = actor else { return Ok(false) };
                let group = match req.target {
                    Some(Target::Group(g)) => Some((*g).clone()),
                    _ => match req.group_id {
                        Some(id) => reader.group(id).await?,
                        None => None,
                    },
                };
                Ok(group.is_some_and(|g| g.moderator_id == actor))
            }

            Policy::IsAuthorOrModeratorOrReadOnly => {
                if req.verb.is_safe() {
                    return Ok(true);
                }
                let (Some(actor), Some(target)) = (actor, req.target) else {
                    return Ok(false);
                };
                if target.owner() == Some(actor) {
                    return Ok(true);
                }
                // Fall through to the moderator branch: the object's group,
                // if any, grants its moderator write access.
                let group_id = match target {
                    Target::Note(n) => n.group_id,
                    Target::Comment(c) => match reader.note(c.note_id).await? {
                        Some(note) => note.group_id,
                        None => None,
                    },
                    _ => None,
                };
                let Some(group_id) = group_id else {
                    return Ok(false);
                };
                Ok(reader
                    .group(group_id)
                    .await?
                    .is_some_and(|g| g.moderator_id == actor))
            }

            Policy::CanAccessNote => {
                let Some(note) = resolve_note(req, reader).await? else {
                    return Ok(false);
                };
                can_access_note(actor, &note, reader).await
            }

            Policy::CanAccessFavorite => {
                let Some(note) = resolve_note(req, reader).await? else {
                    return Ok(false);
                };
                if can_access_note(actor, &note, reader).await? {
                    return Ok(true);
                }
                // Read-only relaxation: a non-member may still GET.
                Ok(req.verb.is_safe())
            }

            Policy::CanAccessGroup => {
                let (Some(actor), Some(group_id)) = (actor, req.group_id) else {
                    return Ok(false);
                };
                if reader.group(group_id).await?.is_none() {
                    return Ok(false);
                }
                reader.is_member(group_id, actor).await
            }

            Policy::HasInvitation => {
                let (Some(actor), Some(group_id)) = (actor, req.group_id) else {
                    return Ok(false);
                };
                if req.verb == Verb::Post {
                    reader.has_invitation(group_id, actor).await
                } else {
                    reader.is_member(group_id, actor).await
                }
            }

            Policy::IsModerator => {
                let (Some(actor), Some(group_id)) = (actor, req.group_id) else {
                    return Ok(false);
                };
                Ok(reader
                    .group(group_id)
                    .await?
                    .is_some_and(|g| g.moderator_id == actor))
            }

            Policy::IsModeratorOrInvitee => {
                let Some(actor) = actor else { return Ok(false) };
                let invitation = match req.target {
                    Some(Target::Invitation(i)) => Some((*i).clone()),
                    _ => match req.invitation_id {
                        Some(id) => reader.invitation(id).await?,
                        None => None,
                    },
                };
                let Some(invitation) = invitation else {
                    return Ok(false);
                };
                if invitation.user_id == actor {
                    return Ok(true);
                }
                Ok(reader
                    .group(invitation.group_id)
                    .await?
                    .is_some_and(|g| g.moderator_id == actor))
            }

            Policy::IsNoteAuthor => {
                let (Some(actor), Some(note_id)) = (actor, req.note_id) else {
                    return Ok(false);
                };
                Ok(reader
                    .note(note_id)
                    .await?
                    .is_some_and(|n| n.author_id == actor))
            }

            Policy::NotAlreadyRated => {
                already_posted(actor, req, |actor| async move {
                    match req.note_id {
                        Some(note_id) => reader.has_rating(actor, note_id).await,
                        None => Ok(true),
                    }
                })
                .await
            }

            Policy::NotAlreadyFavorited => {
                already_posted(actor, req, |actor| async move {
                    match req.note_id {
                        Some(note_id) => reader.has_favorite(actor, note_id).await,
                        None => Ok(true),
                    }
                })
                .await
            }

            Policy::NotAlreadyReportedNote => {
                already_posted(actor, req, |actor| async move {
                    match req.note_id {
                        Some(note_id) => reader.has_note_report(actor, note_id).await,
                        None => Ok(true),
                    }
                })
                .await
            }

            Policy::NotAlreadyReportedComment => {
                already_posted(actor, req, |actor| async move {
                    match req.comment_id {
                        Some(comment_id) => reader.has_comment_report(actor, comment_id).await,
                        None => Ok(true),
                    }
                })
                .await
            }
        }
    }
}

/// Resolves the note for the route-level note predicates, preferring the
/// already-fetched target over a second read.
async fn resolve_note<R: AccessReader>(
    req: &AccessRequest<'_>,
    reader: &R,
) -> DomainResult<Option<Note>> {
    if let Some(Target::Note(n)) = req.target {
        return Ok(Some(n.clone()));
    }
    match req.note_id {
        Some(id) => reader.note(id).await,
        None => Ok(None),
    }
}

/// Shared note-visibility rule: author, public note, or group member.
async fn can_access_note<R: AccessReader>(
    actor: Option<UserId>,
    note: &Note,
    reader: &R,
) -> DomainResult<bool> {
    if actor == Some(note.author_id) {
        return Ok(true);
    }
    let Some(group_id) = note.group_id else {
        return Ok(true);
    };
    match actor {
        Some(actor) => reader.is_member(group_id, actor).await,
        None => Ok(false),
    }
}

/// Shared shape of the AlreadyPosted* family: only POST is guarded, and an
/// existing (actor, target) row denies.
async fn already_posted<F, Fut>(
    actor: Option<UserId>,
    req: &AccessRequest<'_>,
    exists: F,
) -> DomainResult<bool>
where
    F: FnOnce(UserId) -> Fut,
    Fut: std::future::Future<Output = DomainResult<bool>>,
{
    if req.verb != Verb::Post {
        return Ok(true);
    }
    let Some(actor) = actor else { return Ok(false) };
    Ok(!exists(actor).await?)
}

/// Evaluates an ordered predicate conjunction, short-circuiting on the
/// first failure. The failing predicate is named in the denial.
pub async fn evaluate<R: AccessReader>(
    policies: &[Policy],
    actor: Option<UserId>,
    req: &AccessRequest<'_>,
    reader: &R,
) -> DomainResult<()> {
    for policy in policies {
        if !policy.allows(actor, req, reader).await? {
            return Err(DomainError::Denied {
                policy: policy.name(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};

    /// In-memory AccessReader mock for policy truth tables.
    #[derive(Default)]
    struct MockReader {
        notes: HashMap<NoteId, Note>,
        groups: HashMap<GroupId, Group>,
        comments: HashMap<CommentId, Comment>,
        invitations: HashMap<InvitationId, Invitation>,
        members: HashSet<(GroupId, UserId)>,
        invited: HashSet<(GroupId, UserId)>,
        ratings: HashSet<(UserId, NoteId)>,
        favorites: HashSet<(UserId, NoteId)>,
        note_reports: HashSet<(UserId, NoteId)>,
        comment_reports: HashSet<(UserId, CommentId)>,
    }

    #[async_trait]
    impl AccessReader for MockReader {
        async fn note(&self, id: NoteId) -> DomainResult<Option<Note>> {
            Ok(self.notes.get(&id).cloned())
        }
        async fn group(&self, id: GroupId) -> DomainResult<Option<Group>> {
            Ok(self.groups.get(&id).cloned())
        }
        async fn comment(&self, id: CommentId) -> DomainResult<Option<Comment>> {
            Ok(self.comments.get(&id).cloned())
        }
        async fn invitation(&self, id: InvitationId) -> DomainResult<Option<Invitation>> {
            Ok(self.invitations.get(&id).cloned())
        }
        async fn is_member(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool> {
            Ok(self.members.contains(&(group_id, user_id)))
        }
        async fn has_invitation(&self, group_id: GroupId, user_id: UserId) -> DomainResult<bool> {
            Ok(self.invited.contains(&(group_id, user_id)))
        }
        async fn has_rating(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
            Ok(self.ratings.contains(&(user_id, note_id)))
        }
        async fn has_favorite(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
            Ok(self.favorites.contains(&(user_id, note_id)))
        }
        async fn has_note_report(&self, user_id: UserId, note_id: NoteId) -> DomainResult<bool> {
            Ok(self.note_reports.contains(&(user_id, note_id)))
        }
        async fn has_comment_report(
            &self,
            user_id: UserId,
            comment_id: CommentId,
        ) -> DomainResult<bool> {
            Ok(self.comment_reports.contains(&(user_id, comment_id)))
        }
    }

    fn note(id: NoteId, author: UserId, group: Option<GroupId>) -> Note {
        let now = Utc::now();
        Note {
            id,
            author_id: author,
            title: "algebra".into(),
            university_id: None,
            course: "MATH101".into(),
            group_id: group,
            created_at: now,
            updated_at: now,
        }
    }

    fn group(id: GroupId, moderator: UserId) -> Group {
        Group {
            id,
            name: "study group".into(),
            moderator_id: moderator,
        }
    }

    // CanAccessNote matrix from the visibility rules: author always,
    // public notes always, group notes only for members.

    #[tokio::test]
    async fn can_access_note_anonymous_public_note_allowed() {
        let mut reader = MockReader::default();
        reader.notes.insert(1, note(1, 10, None));
        let req = AccessRequest::new(Verb::Get).note(1);
        assert!(Policy::CanAccessNote.allows(None, &req, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn can_access_note_anonymous_group_note_denied() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.notes.insert(1, note(1, 10, Some(5)));
        let req = AccessRequest::new(Verb::Get).note(1);
        assert!(!Policy::CanAccessNote.allows(None, &req, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn can_access_note_member_group_note_allowed() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.notes.insert(1, note(1, 10, Some(5)));
        reader.members.insert((5, 20));
        let req = AccessRequest::new(Verb::Get).note(1);
        assert!(Policy::CanAccessNote
            .allows(Some(20), &req, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn can_access_note_author_bypasses_membership() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.notes.insert(1, note(1, 7, Some(5)));
        let req = AccessRequest::new(Verb::Patch).note(1);
        assert!(Policy::CanAccessNote
            .allows(Some(7), &req, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn can_access_note_missing_note_denies_instead_of_erroring() {
        let reader = MockReader::default();
        let req = AccessRequest::new(Verb::Get).note(404);
        assert!(!Policy::CanAccessNote
            .allows(Some(1), &req, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn can_access_favorite_relaxes_get_for_non_members() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.notes.insert(1, note(1, 10, Some(5)));

        let get = AccessRequest::new(Verb::Get).note(1);
        assert!(Policy::CanAccessFavorite
            .allows(Some(99), &get, &reader)
            .await
            .unwrap());

        let post = AccessRequest::new(Verb::Post).note(1);
        assert!(!Policy::CanAccessFavorite
            .allows(Some(99), &post, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn is_author_or_read_only() {
        let reader = MockReader::default();
        let n = note(1, 7, None);

        let read = AccessRequest::new(Verb::Get).target(Target::Note(&n));
        assert!(Policy::IsAuthorOrReadOnly
            .allows(None, &read, &reader)
            .await
            .unwrap());

        let write = AccessRequest::new(Verb::Delete).target(Target::Note(&n));
        assert!(Policy::IsAuthorOrReadOnly
            .allows(Some(7), &write, &reader)
            .await
            .unwrap());
        assert!(!Policy::IsAuthorOrReadOnly
            .allows(Some(8), &write, &reader)
            .await
            .unwrap());
        assert!(!Policy::IsAuthorOrReadOnly
            .allows(None, &write, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn moderator_may_edit_group_scoped_notes() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        let n = note(1, 7, Some(5));

        let write = AccessRequest::new(Verb::Patch).target(Target::Note(&n));
        // Moderator of the note's group passes.
        assert!(Policy::IsAuthorOrModeratorOrReadOnly
            .allows(Some(10), &write, &reader)
            .await
            .unwrap());
        // A third user does not.
        assert!(!Policy::IsAuthorOrModeratorOrReadOnly
            .allows(Some(99), &write, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn moderator_check_ignores_personal_notes() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        let n = note(1, 7, None);
        let write = AccessRequest::new(Verb::Patch).target(Target::Note(&n));
        assert!(!Policy::IsAuthorOrModeratorOrReadOnly
            .allows(Some(10), &write, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn has_invitation_post_requires_invitation() {
        let mut reader = MockReader::default();
        reader.invited.insert((5, 20));
        reader.members.insert((5, 30));

        let post = AccessRequest::new(Verb::Post).group(5);
        assert!(Policy::HasInvitation
            .allows(Some(20), &post, &reader)
            .await
            .unwrap());
        assert!(!Policy::HasInvitation
            .allows(Some(30), &post, &reader)
            .await
            .unwrap());

        // Non-POST verbs require membership instead.
        let get = AccessRequest::new(Verb::Get).group(5);
        assert!(Policy::HasInvitation
            .allows(Some(30), &get, &reader)
            .await
            .unwrap());
        assert!(!Policy::HasInvitation
            .allows(Some(20), &get, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn is_moderator_or_invitee() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.invitations.insert(
            3,
            Invitation {
                id: 3,
                group_id: 5,
                user_id: 20,
            },
        );

        let req = AccessRequest::new(Verb::Delete).invitation(3);
        assert!(Policy::IsModeratorOrInvitee
            .allows(Some(10), &req, &reader)
            .await
            .unwrap());
        assert!(Policy::IsModeratorOrInvitee
            .allows(Some(20), &req, &reader)
            .await
            .unwrap());
        assert!(!Policy::IsModeratorOrInvitee
            .allows(Some(99), &req, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn already_posted_guard_denies_second_post_only() {
        let mut reader = MockReader::default();
        reader.notes.insert(1, note(1, 10, None));
        reader.ratings.insert((7, 1));

        let post = AccessRequest::new(Verb::Post).note(1);
        assert!(!Policy::NotAlreadyRated
            .allows(Some(7), &post, &reader)
            .await
            .unwrap());
        assert!(Policy::NotAlreadyRated
            .allows(Some(8), &post, &reader)
            .await
            .unwrap());

        // Non-POST verbs are out of the guard's scope.
        let get = AccessRequest::new(Verb::Get).note(1);
        assert!(Policy::NotAlreadyRated
            .allows(Some(7), &get, &reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn evaluate_short_circuits_and_names_failing_policy() {
        let mut reader = MockReader::default();
        reader.groups.insert(5, group(5, 10));
        reader.notes.insert(1, note(1, 10, Some(5)));

        let req = AccessRequest::new(Verb::Post).note(1);
        let err = evaluate(
            &[Policy::CanAccessNote, Policy::NotAlreadyRated],
            Some(99),
            &req,
            &reader,
        )
        .await
        .unwrap_err();
        match err {
            DomainError::Denied { policy } => assert_eq!(policy, "CanAccessNote"),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn evaluate_passes_when_all_predicates_hold() {
        let mut reader = MockReader::default();
        reader.notes.insert(1, note(1, 10, None));

        let req = AccessRequest::new(Verb::Post).note(1);
        evaluate(
            &[Policy::CanAccessNote, Policy::NotAlreadyRated],
            Some(7),
            &req,
            &reader,
        )
        .await
        .unwrap();
    }
}
