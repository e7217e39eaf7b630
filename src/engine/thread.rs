use std::collections::HashMap;

use crate::models::{Comment, CommentThread};

/// Groups a page of rows into root comments with their replies attached.
///
/// Roots keep the order they arrived in. Replies are sorted oldest first.
/// A reply whose root is not in `rows` is dropped: it belongs to a root
/// outside the current page window.
pub fn assemble(rows: Vec<Comment>) -> Vec<CommentThread> {
    let (roots, replies): (Vec<Comment>, Vec<Comment>) =
        rows.into_iter().partition(|comment| comment.parent.is_none());

    let mut threads: Vec<CommentThread> = roots
        .into_iter()
        .map(|root| CommentThread {
            root,
            replies: Vec::new(),
        })
        .collect();

    let index: HashMap<i64, usize> = threads
        .iter()
        .enumerate()
        .map(|(pos, thread)| (thread.root.id, pos))
        .collect();

    for reply in replies {
        let Some(parent_id) = reply.parent else {
            continue;
        };
        match index.get(&parent_id) {
            Some(&pos) => threads[pos].replies.push(reply),
            None => {
                tracing::trace!(
                    comment_id = reply.id,
                    parent_id,
                    "Reply dropped: root outside current page"
                );
            }
        }
    }

    for thread in &mut threads {
        thread
            .replies
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }

    threads
}
