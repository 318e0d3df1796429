use std::collections::{hash_map, HashMap};

use crate::api::{Comment, CommentId};

/// Canonical display form of a reply collection
///
/// Soft-deleted comments are dropped, remaining copies sharing an id collapse to the last one
/// seen, and the result is sorted by creation time. Applying it to its own output is a no-op.
pub fn dedup_replies<I>(raw: I) -> Vec<Comment>
where
    I: IntoIterator<Item = Comment>,
{
    let mut slots: HashMap<CommentId, usize> = HashMap::new();
    let mut res: Vec<Comment> = Vec::new();
    for c in raw.into_iter().filter(|c| !c.deleted) {
        match slots.entry(c.id) {
            hash_map::Entry::Occupied(slot) => res[*slot.get()] = c,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(res.len());
                res.push(c);
            }
        }
    }
    // ids are unique at this point, so the order is total
    res.sort_unstable_by_key(|c| (c.created_at, c.id));
    res
}

pub trait DisplayRepliesExt {
    fn display_replies(&self) -> Vec<Comment>;
}

impl DisplayRepliesExt for Comment {
    fn display_replies(&self) -> Vec<Comment> {
        dedup_replies(self.replies.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::tree::tests::{at, comment};

    fn raw(id: i64, deleted: bool, t: i64) -> Comment {
        let mut c = comment(id, Some(1), t);
        c.deleted = deleted;
        c
    }

    #[test]
    fn collapses_filters_and_sorts() {
        let res = dedup_replies(vec![raw(1, false, 2), raw(2, true, 1), raw(1, false, 2)]);
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].id, CommentId(1));
        assert_eq!(res[0].created_at, at(2));
    }

    #[test]
    fn last_copy_wins() {
        let mut stale = raw(5, false, 3);
        stale.content = String::from("stale");
        let mut fresh = raw(5, false, 3);
        fresh.content = String::from("fresh");
        let res = dedup_replies(vec![stale, raw(4, false, 9), fresh]);
        assert_eq!(
            res.iter().map(|c| c.content.as_str()).collect::<Vec<_>>(),
            vec!["fresh", "comment 4"],
        );

    }

    #[test]
    fn deleted_copies_do_not_hide_live_ones() {
        let res = dedup_replies(vec![raw(7, false, 1), raw(7, true, 1)]);
        assert_eq!(res.iter().map(|c| c.id).collect::<Vec<_>>(), vec![CommentId(7)]);
        assert!(!res[0].deleted);

        let res = dedup_replies(vec![raw(7, true, 1), raw(7, false, 2)]);
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].created_at, at(2));

        assert!(dedup_replies(vec![raw(8, true, 1), raw(8, true, 2)]).is_empty());
    }

    #[test]
    fn display_replies_on_a_comment() {
        let mut parent = comment(1, None, 0);
        parent.replies = vec![raw(3, false, 5), raw(2, false, 4), raw(3, false, 5)];
        let ids = parent
            .display_replies()
            .iter()
            .map(|c| c.id.0)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 3]);
    }

    #[derive(Clone, Debug, bolero::generator::TypeGenerator)]
    struct RawReply {
        id: u8,
        deleted: bool,
        at: u8,
    }

    #[test]
    fn idempotent_and_canonical() {
        bolero::check!()
            .with_type::<Vec<RawReply>>()
            .cloned()
            .for_each(|replies| {
                // small id space so that duplicates are common
                let replies = replies
                    .into_iter()
                    .map(|r| raw(i64::from(r.id % 8), r.deleted, i64::from(r.at % 4)))
                    .collect::<Vec<_>>();
                let once = dedup_replies(replies);
                let twice = dedup_replies(once.clone());
                assert_eq!(once, twice);

                let mut ids = HashSet::new();
                for c in once.iter() {
                    assert!(!c.deleted);
                    assert!(ids.insert(c.id), "duplicate id {:?}", c.id);
                }
                assert!(once.windows(2).all(|w| w[0].created_at <= w[1].created_at));
            });
    }
}
