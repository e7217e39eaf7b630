//! Local thread state for one content target at a time.
//!
//! All state sits behind one `parking_lot::Mutex` that is only ever held
//! between awaits, never across one. Network calls run unlocked and their
//! results are committed afterwards, after checking they still apply.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::ClientConfig;
use crate::client::api::CommentsApi;
use crate::client::optimistic::{OptimisticLedger, Ticket};
use crate::engine::ledger::toggle_state;
use crate::engine::target::TargetHandle;
use crate::engine::thread::assemble;
use crate::error::EngineError;
use crate::models::{
    Comment, CommentAuthor, CommentStatus, CommentThread, CountDelta, CreateComment,
    InteractionKind, InteractionOutcome, InteractionState, InteractionType, PageRequest,
};

pub type LoadResult = Result<Arc<Vec<CommentThread>>, EngineError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

enum LoadMarker {
    Loading {
        generation: u64,
        cancel: CancellationToken,
        future: LoadFuture,
    },
    /// Last known threads for a target that is not on screen right now.
    Loaded(Arc<Vec<CommentThread>>),
}

/// Threads for the current target. Each comment carries the viewer's own
/// like/dislike state as the server reported it, adjusted by local toggles.
#[derive(Debug, Default)]
pub struct ThreadView {
    pub target: Option<TargetHandle>,
    pub threads: Vec<CommentThread>,
}

impl ThreadView {
    pub fn comment(&self, comment_id: i64) -> Option<&Comment> {
        self.threads.iter().find_map(|thread| {
            if thread.root.id == comment_id {
                Some(&thread.root)
            } else {
                thread.replies.iter().find(|c| c.id == comment_id)
            }
        })
    }

    fn comment_mut(&mut self, comment_id: i64) -> Option<&mut Comment> {
        self.threads.iter_mut().find_map(|thread| {
            if thread.root.id == comment_id {
                Some(&mut thread.root)
            } else {
                thread.replies.iter_mut().find(|c| c.id == comment_id)
            }
        })
    }

    fn thread_mut(&mut self, root_id: i64) -> Option<&mut CommentThread> {
        self.threads.iter_mut().find(|t| t.root.id == root_id)
    }

    /// Swaps in the server copy. Write responses omit the viewer's
    /// interaction, so the local one is kept.
    fn replace(&mut self, old_id: i64, mut comment: Comment) {
        if let Some(slot) = self.comment_mut(old_id) {
            if comment.viewer_interaction.is_none() {
                comment.viewer_interaction = slot.viewer_interaction;
            }
            *slot = comment;
        }
    }
}

struct State {
    view: ThreadView,
    markers: HashMap<TargetHandle, LoadMarker>,
    ledger: OptimisticLedger<ThreadView>,
    generation: u64,
    next_temp_id: i64,
}

struct Inner<A> {
    api: Arc<A>,
    config: ClientConfig,
    viewer: CommentAuthor,
    state: Mutex<State>,
}

/// A local write, applied before the server has confirmed it.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Toggle { comment_id: i64, kind: InteractionKind },
    Post { text: String, parent: Option<i64> },
    Edit { comment_id: i64, text: String },
    Delete { comment_id: i64 },
}

/// Authoritative answer for a [`Mutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    Toggled(InteractionOutcome),
    Posted(Comment),
    Edited(Comment),
    Deleted,
}

pub struct Reconciler<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Reconciler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: CommentsApi> Reconciler<A> {
    pub fn new(api: Arc<A>, config: ClientConfig, viewer: CommentAuthor) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                viewer,
                state: Mutex::new(State {
                    view: ThreadView::default(),
                    markers: HashMap::new(),
                    ledger: OptimisticLedger::new(),
                    generation: 0,
                    next_temp_id: -1,
                }),
            }),
        }
    }

    pub fn current_target(&self) -> Option<TargetHandle> {
        self.inner.state.lock().view.target.clone()
    }

    pub fn current_threads(&self) -> Vec<CommentThread> {
        self.inner.state.lock().view.threads.clone()
    }

    pub fn comment(&self, comment_id: i64) -> Option<Comment> {
        self.inner.state.lock().view.comment(comment_id).cloned()
    }

    pub fn interaction_state(&self, comment_id: i64) -> InteractionState {
        self.inner
            .state
            .lock()
            .view
            .comment(comment_id)
            .and_then(|c| c.viewer_interaction)
            .unwrap_or_default()
    }

    pub fn pending_mutations(&self) -> usize {
        self.inner.state.lock().ledger.pending_count()
    }

    // ============================
    // Loading
    // ============================

    /// Makes `target` current and returns its threads.
    ///
    /// A load already in flight for the same target is joined rather than
    /// repeated, and a loaded target is served from memory. Switching to a
    /// different target cancels the previous target's in-flight load; a load
    /// that finishes after being superseded returns `Cancelled` and leaves
    /// state untouched.
    pub async fn load_thread_for(&self, target: &TargetHandle) -> LoadResult {
        let (generation, future) = {
            let mut state = self.inner.state.lock();
            self.switch_to(&mut state, target);

            let joined = match state.markers.get(target) {
                Some(LoadMarker::Loaded(_)) => return Ok(Arc::new(state.view.threads.clone())),
                Some(LoadMarker::Loading {
                    generation, future, ..
                }) => Some((*generation, future.clone())),
                None => None,
            };
            match joined {
                Some(joined) => {
                    tracing::trace!(content_target = %target, "Joining in-flight load");
                    joined
                }
                None => self.start_load(&mut state, target),
            }
        };

        let result = future.await;
        self.commit_load(target, generation, result)
    }

    fn switch_to(&self, state: &mut State, target: &TargetHandle) {
        if state.view.target.as_ref() == Some(target) {
            return;
        }

        if let Some(previous) = state.view.target.take() {
            match state.markers.remove(&previous) {
                Some(LoadMarker::Loading { cancel, .. }) => {
                    tracing::debug!(content_target = %previous, "Cancelling superseded load");
                    cancel.cancel();
                }
                Some(LoadMarker::Loaded(_)) => {
                    let snapshot = Arc::new(std::mem::take(&mut state.view.threads));
                    state.markers.insert(previous, LoadMarker::Loaded(snapshot));
                }
                None => {}
            }
        }

        state.ledger.abandon_all();
        state.view.threads = match state.markers.get(target) {
            Some(LoadMarker::Loaded(snapshot)) => snapshot.as_ref().clone(),
            _ => Vec::new(),
        };
        state.view.target = Some(target.clone());
    }

    fn start_load(&self, state: &mut State, target: &TargetHandle) -> (u64, LoadFuture) {
        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();

        let api = self.inner.api.clone();
        let token = cancel.clone();
        let handle = target.clone();
        let page = PageRequest::new(Some(1), Some(self.inner.config.page_size));
        let ordering = self.inner.config.ordering;

        let future = async move {
            tokio::select! {
                _ = token.cancelled() => Err(EngineError::Cancelled),
                fetched = api.list_comments(&handle, page, ordering) => {
                    fetched.map(|fetched| Arc::new(assemble(fetched.results)))
                }
            }
        }
        .boxed()
        .shared();

        tracing::debug!(content_target = %target, generation, "Loading comment threads");
        state.markers.insert(
            target.clone(),
            LoadMarker::Loading {
                generation,
                cancel,
                future: future.clone(),
            },
        );
        (generation, future)
    }

    fn commit_load(&self, target: &TargetHandle, generation: u64, result: LoadResult) -> LoadResult {
        let mut state = self.inner.state.lock();
        let is_current = state.view.target.as_ref() == Some(target);

        if !is_current {
            tracing::debug!(content_target = %target, generation, "Discarding stale load");
            return Err(EngineError::Cancelled);
        }

        let owns_marker = matches!(
            state.markers.get(target),
            Some(LoadMarker::Loading { generation: g, .. }) if *g == generation
        );
        if !owns_marker {
            // Another caller sharing this load settled it first, or the
            // marker was cleared and possibly replaced by a newer load.
            return match (result, state.markers.get(target)) {
                (Err(error), _) => Err(error),
                (Ok(_), Some(LoadMarker::Loaded(_))) => Ok(Arc::new(state.view.threads.clone())),
                (Ok(_), _) => {
                    tracing::debug!(content_target = %target, generation, "Discarding cancelled load");
                    Err(EngineError::Cancelled)
                }
            };
        }

        match result {
            Ok(threads) => {
                state.view.threads = threads.as_ref().clone();
                state
                    .markers
                    .insert(target.clone(), LoadMarker::Loaded(threads.clone()));
                Ok(threads)
            }
            Err(error) => {
                // Failure clears the marker so the next call retries.
                state.markers.remove(target);
                Err(error)
            }
        }
    }

    /// Aborts an in-flight load for `target`. Nothing is committed for it.
    pub fn cancel(&self, target: &TargetHandle) {
        let mut state = self.inner.state.lock();
        if let Some(LoadMarker::Loading { .. }) = state.markers.get(target) {
            if let Some(LoadMarker::Loading { cancel, .. }) = state.markers.remove(target) {
                tracing::debug!(content_target = %target, "Load cancelled");
                cancel.cancel();
            }
        }
    }

    /// Drops the cached threads for `target` so the next load hits the server.
    pub fn invalidate(&self, target: &TargetHandle) {
        let mut state = self.inner.state.lock();
        if let Some(LoadMarker::Loaded(_)) = state.markers.get(target) {
            state.markers.remove(target);
        }
    }

    // ============================
    // Optimistic mutations
    // ============================

    /// Applies `mutation` to local state and returns the ticket that must be
    /// passed to [`Reconciler::reconcile`].
    pub fn apply_optimistic(&self, mutation: Mutation) -> Result<Ticket, EngineError> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let view = &mut state.view;

        let ticket = match mutation {
            Mutation::Toggle { comment_id, kind } => {
                if view.comment(comment_id).is_none() {
                    return Err(EngineError::NotFound("Comment not loaded".to_string()));
                }
                state
                    .ledger
                    .apply(view, comment_id, |view| apply_toggle(view, comment_id, kind))
            }
            Mutation::Post { text, parent } => {
                let Some(target) = view.target.clone() else {
                    return Err(EngineError::InvalidTarget("no target loaded".to_string()));
                };
                let temp_id = state.next_temp_id;
                state.next_temp_id -= 1;
                let parent = parent.map(|id| flatten_parent(view, id));
                let placeholder = self.placeholder(&target, temp_id, text, parent);
                state
                    .ledger
                    .apply_touching(view, temp_id, parent, |view| apply_post(view, placeholder))
            }
            Mutation::Edit { comment_id, text } => {
                if view.comment(comment_id).is_none() {
                    return Err(EngineError::NotFound("Comment not loaded".to_string()));
                }
                state
                    .ledger
                    .apply(view, comment_id, |view| apply_edit(view, comment_id, text))
            }
            Mutation::Delete { comment_id } => {
                let Some(comment) = view.comment(comment_id) else {
                    return Err(EngineError::NotFound("Comment not loaded".to_string()));
                };
                let root_id = comment.parent;
                state
                    .ledger
                    .apply_touching(view, comment_id, root_id, |view| apply_delete(view, comment_id))
            }
        };

        Ok(ticket)
    }

    /// Settles an applied mutation. On error the mutation's own undo runs
    /// and the error is returned.
    pub fn reconcile(
        &self,
        ticket: Ticket,
        result: Result<MutationResult, EngineError>,
    ) -> Result<(), EngineError> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let key = ticket.key();

        // A newer mutation on the same comment is still outstanding; its
        // local delta must survive this result.
        let shadowed = state.ledger.pending_for(key) > 1;
        if shadowed {
            tracing::trace!(comment_id = key, "Newer optimistic mutation still pending");
        }

        state
            .ledger
            .reconcile(&mut state.view, ticket, result, |view, result| match result {
                _ if shadowed => {}
                MutationResult::Toggled(outcome) => {
                    if let Some(comment) = view.comment_mut(outcome.comment_id) {
                        comment.viewer_interaction = Some(outcome.state());
                        comment.like_count = outcome.like_count;
                        comment.dislike_count = outcome.dislike_count;
                        comment.report_count = outcome.report_count;
                    }
                }
                MutationResult::Posted(comment) | MutationResult::Edited(comment) => {
                    view.replace(key, comment);
                }
                MutationResult::Deleted => {}
            })
    }

    fn placeholder(
        &self,
        target: &TargetHandle,
        temp_id: i64,
        text: String,
        parent: Option<i64>,
    ) -> Comment {
        let now = Utc::now();
        Comment {
            id: temp_id,
            author: self.inner.viewer.clone(),
            content_type: target.content_type(),
            object_id: target.object_id(),
            parent,
            text,
            status: CommentStatus::Published,
            is_flagged: false,
            like_count: 0,
            dislike_count: 0,
            reply_count: 0,
            report_count: 0,
            is_edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
            viewer_interaction: Some(InteractionState::default()),
        }
    }

    // ============================
    // Write operations
    // ============================

    pub async fn toggle_interaction(
        &self,
        comment_id: i64,
        kind: InteractionKind,
    ) -> Result<InteractionOutcome, EngineError> {
        let ticket = self.apply_optimistic(Mutation::Toggle { comment_id, kind })?;
        let interaction_type = match kind {
            InteractionKind::Like => InteractionType::Like,
            InteractionKind::Dislike => InteractionType::Dislike,
        };

        let outcome = self.inner.api.interact(comment_id, interaction_type, None).await;
        self.reconcile(ticket, outcome.clone().map(MutationResult::Toggled))?;
        outcome
    }

    /// Posts a comment against the current target. Blank text is rejected
    /// before any network call, and a reply to a reply is sent against its
    /// root.
    pub async fn post_comment(&self, text: &str, parent: Option<i64>) -> Result<Comment, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyText);
        }

        let (target, parent) = {
            let state = self.inner.state.lock();
            let target = state
                .view
                .target
                .clone()
                .ok_or_else(|| EngineError::InvalidTarget("no target loaded".to_string()))?;
            (target, parent.map(|id| flatten_parent(&state.view, id)))
        };

        let ticket = self.apply_optimistic(Mutation::Post {
            text: text.to_string(),
            parent,
        })?;

        let input = CreateComment::new(&target, text, parent);
        let created = self.inner.api.create_comment(&input).await;
        self.reconcile(ticket, created.clone().map(MutationResult::Posted))?;
        created
    }

    pub async fn edit_comment(&self, comment_id: i64, text: &str) -> Result<Comment, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyText);
        }

        let ticket = self.apply_optimistic(Mutation::Edit {
            comment_id,
            text: text.to_string(),
        })?;
        let updated = self.inner.api.update_comment(comment_id, text).await;
        self.reconcile(ticket, updated.clone().map(MutationResult::Edited))?;
        updated
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<(), EngineError> {
        let ticket = self.apply_optimistic(Mutation::Delete { comment_id })?;
        let deleted = self.inner.api.delete_comment(comment_id).await;
        self.reconcile(ticket, deleted.clone().map(|()| MutationResult::Deleted))?;
        deleted
    }

    /// Files a report. Not optimistic: the count only moves once the server
    /// has accepted it.
    pub async fn report(&self, comment_id: i64, reason: Option<&str>) -> Result<InteractionOutcome, EngineError> {
        let outcome = self
            .inner
            .api
            .interact(comment_id, InteractionType::Report, reason)
            .await?;

        let mut state = self.inner.state.lock();
        if let Some(comment) = state.view.comment_mut(comment_id) {
            comment.report_count = outcome.report_count;
        }
        Ok(outcome)
    }

    // ============================
    // Periodic refresh
    // ============================

    /// Re-reads the current target and copies server counts onto local
    /// comments. A comment with an unreconciled mutation keeps its local
    /// numbers, and so does the root of a pending reply post or delete.
    /// Returns how many comments were updated.
    pub async fn refresh_counts(&self) -> Result<usize, EngineError> {
        let Some(target) = self.current_target() else {
            return Ok(0);
        };

        let page = PageRequest::new(Some(1), Some(self.inner.config.page_size));
        let fresh = self
            .inner
            .api
            .list_comments(&target, page, self.inner.config.ordering)
            .await?;

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.view.target.as_ref() != Some(&target) {
            return Ok(0);
        }

        let mut updated = 0;
        for server in fresh.results {
            if state.ledger.is_pending(server.id) {
                continue;
            }
            if let Some(local) = state.view.comment_mut(server.id) {
                local.like_count = server.like_count;
                local.dislike_count = server.dislike_count;
                local.reply_count = server.reply_count;
                local.report_count = server.report_count;
                if server.viewer_interaction.is_some() {
                    local.viewer_interaction = server.viewer_interaction;
                }
                updated += 1;
            }
        }

        tracing::trace!(content_target = %target, updated, "Counts refreshed");
        Ok(updated)
    }

    /// Runs [`Reconciler::refresh_counts`] every `every` until the reconciler
    /// is dropped or the returned handle is aborted.
    pub fn spawn_periodic_refresh(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let reconciler = Reconciler { inner };
                if let Err(error) = reconciler.refresh_counts().await {
                    tracing::warn!("Periodic comment refresh failed: {}", error);
                }
            }
        })
    }
}

/// A reply always hangs off a root; replying to a reply targets its root.
fn flatten_parent(view: &ThreadView, parent_id: i64) -> i64 {
    match view.comment(parent_id) {
        Some(comment) => comment.parent.unwrap_or(parent_id),
        None => parent_id,
    }
}

fn shift(state: InteractionState, delta: CountDelta) -> InteractionState {
    InteractionState {
        liked: i64::from(state.liked) + delta.likes > 0,
        disliked: i64::from(state.disliked) + delta.dislikes > 0,
    }
}

fn apply_toggle(
    view: &mut ThreadView,
    comment_id: i64,
    kind: InteractionKind,
) -> impl FnOnce(&mut ThreadView) + Send + use<> {
    let mut delta = CountDelta::default();
    if let Some(comment) = view.comment_mut(comment_id) {
        let (next, applied) = toggle_state(comment.viewer_interaction.unwrap_or_default(), kind);
        delta = applied;
        comment.viewer_interaction = Some(next);
        comment.like_count += delta.likes;
        comment.dislike_count += delta.dislikes;
    }

    move |view: &mut ThreadView| {
        let undo = delta.inverse();
        if let Some(comment) = view.comment_mut(comment_id) {
            let current = comment.viewer_interaction.unwrap_or_default();
            comment.viewer_interaction = Some(shift(current, undo));
            comment.like_count = (comment.like_count + undo.likes).max(0);
            comment.dislike_count = (comment.dislike_count + undo.dislikes).max(0);
        }
    }
}

fn apply_post(view: &mut ThreadView, placeholder: Comment) -> impl FnOnce(&mut ThreadView) + Send + use<> {
    let temp_id = placeholder.id;
    let root_id = placeholder.parent;

    match root_id {
        None => view.threads.insert(
            0,
            CommentThread {
                root: placeholder,
                replies: Vec::new(),
            },
        ),
        Some(root_id) => {
            if let Some(thread) = view.thread_mut(root_id) {
                thread.root.reply_count += 1;
                thread.replies.push(placeholder);
            }
        }
    }

    move |view: &mut ThreadView| match root_id {
        None => view.threads.retain(|t| t.root.id != temp_id),
        Some(root_id) => {
            if let Some(thread) = view.thread_mut(root_id) {
                let before = thread.replies.len();
                thread.replies.retain(|c| c.id != temp_id);
                if thread.replies.len() < before {
                    thread.root.reply_count = (thread.root.reply_count - 1).max(0);
                }
            }
        }
    }
}

fn apply_edit(view: &mut ThreadView, comment_id: i64, text: String) -> impl FnOnce(&mut ThreadView) + Send + use<> {
    let mut previous = None;
    if let Some(comment) = view.comment_mut(comment_id) {
        let old_text = std::mem::replace(&mut comment.text, text);
        previous = Some((old_text, comment.is_edited, comment.edited_at));
        comment.is_edited = true;
        comment.edited_at = Some(Utc::now());
    }

    move |view: &mut ThreadView| {
        if let (Some((text, is_edited, edited_at)), Some(comment)) = (previous, view.comment_mut(comment_id)) {
            comment.text = text;
            comment.is_edited = is_edited;
            comment.edited_at = edited_at;
        }
    }
}

enum Removed {
    Thread(usize, CommentThread),
    Reply { root_id: i64, index: usize, reply: Comment },
}

fn apply_delete(view: &mut ThreadView, comment_id: i64) -> impl FnOnce(&mut ThreadView) + Send + use<> {
    let mut removed = None;

    if let Some(pos) = view.threads.iter().position(|t| t.root.id == comment_id) {
        removed = Some(Removed::Thread(pos, view.threads.remove(pos)));
    } else {
        for thread in &mut view.threads {
            if let Some(index) = thread.replies.iter().position(|c| c.id == comment_id) {
                let reply = thread.replies.remove(index);
                thread.root.reply_count = (thread.root.reply_count - 1).max(0);
                removed = Some(Removed::Reply {
                    root_id: thread.root.id,
                    index,
                    reply,
                });
                break;
            }
        }
    }

    move |view: &mut ThreadView| match removed {
        Some(Removed::Thread(pos, thread)) => {
            let pos = pos.min(view.threads.len());
            view.threads.insert(pos, thread);
        }
        Some(Removed::Reply { root_id, index, reply }) => {
            if let Some(thread) = view.thread_mut(root_id) {
                let index = index.min(thread.replies.len());
                thread.replies.insert(index, reply);
                thread.root.reply_count += 1;
            }
        }
        None => {}
    }
}
