//! Thread Reconstructor.
//!
//! Derives the root, the date order and the reply tree of an issue from a
//! flat list of `(key, message)` pairs in storage order. Nothing here is
//! persisted; the tree is rebuilt on every read.
//!
//! A message whose parent reference names no message in the issue is treated
//! as a top-level thread of its own. Traversal carries a visited set, so a
//! cyclic reference set renders each message once.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, FixedOffset};

use crate::message::Message;
use crate::util::short_user;

/// One rendered line of a comment tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    /// Position in date order (0 = root).
    pub index: usize,
    /// Nesting level below the message the walk started from.
    pub depth: usize,
    pub subject: String,
    /// Short form of the `From` header.
    pub author: String,
}

/// Key of the first message in storage order without a reply reference.
#[must_use]
pub fn find_root<'a>(messages: &[(&'a str, &'a Message)]) -> Option<&'a str> {
    messages
        .iter()
        .find(|(_, m)| m.is_root())
        .map(|(k, _)| *k)
}

/// Keys ordered root first, then ascending by `Date`.
///
/// Messages without a parseable date order before dated ones. Equal dates
/// keep storage order.
#[must_use]
pub fn order_by_date<'a>(messages: &[(&'a str, &'a Message)]) -> Vec<&'a str> {
    let root = find_root(messages);
    let mut keyed: Vec<(&'a str, bool, Option<DateTime<FixedOffset>>)> = messages
        .iter()
        .map(|(k, m)| (*k, Some(*k) == root, m.date()))
        .collect();
    keyed.sort_by(|a, b| match (a.1, b.1) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.2.cmp(&b.2),
    });
    keyed.into_iter().map(|(k, _, _)| k).collect()
}

/// Reply structure of one issue, indexed by date order.
#[derive(Debug, Clone)]
pub struct Thread<'a> {
    order: Vec<(&'a str, &'a Message)>,
    children: Vec<Vec<usize>>,
    top_level: Vec<usize>,
}

impl<'a> Thread<'a> {
    /// Build the reply tree.
    ///
    /// Children are listed in date order. A message whose reference does
    /// not resolve, or resolves to itself, becomes top-level.
    #[must_use]
    pub fn build(messages: &[(&'a str, &'a Message)]) -> Self {
        let by_key: HashMap<&str, &'a Message> = messages.iter().copied().collect();
        let order: Vec<(&'a str, &'a Message)> = order_by_date(messages)
            .into_iter()
            .filter_map(|k| by_key.get(k).map(|m| (k, *m)))
            .collect();

        let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        for (i, (_, msg)) in order.iter().enumerate() {
            if let Some(mid) = msg.message_id() {
                by_id.entry(mid).or_insert(i);
            }
        }

        let mut children = vec![Vec::new(); order.len()];
        let mut top_level = Vec::new();
        for (i, (_, msg)) in order.iter().enumerate() {
            match msg.parent_id().and_then(|p| by_id.get(p)) {
                Some(&parent) if parent != i => children[parent].push(i),
                _ => top_level.push(i),
            }
        }

        Self {
            order,
            children,
            top_level,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in date order.
    pub fn keys(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.order.iter().map(|(k, _)| *k)
    }

    /// Message at date-order position `index`.
    #[must_use]
    pub fn message(&self, index: usize) -> Option<&'a Message> {
        self.order.get(index).map(|(_, m)| *m)
    }

    #[must_use]
    pub fn key(&self, index: usize) -> Option<&'a str> {
        self.order.get(index).map(|(k, _)| *k)
    }

    /// Position of the message with Message-Id `id`.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        let id = id.trim();
        self.order
            .iter()
            .position(|(_, m)| m.message_id() == Some(id))
    }

    #[must_use]
    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions of messages without a resolvable parent.
    #[must_use]
    pub fn top_level(&self) -> &[usize] {
        &self.top_level
    }

    /// Parent Message-Id → child Message-Ids, children in date order.
    ///
    /// Messages lacking a Message-Id cannot be linked and are left out.
    #[must_use]
    pub fn reply_tree(&self) -> BTreeMap<String, Vec<String>> {
        let mut tree = BTreeMap::new();
        for (parent, kids) in self.children.iter().enumerate() {
            let Some(pid) = self.order[parent].1.message_id() else {
                continue;
            };
            let ids: Vec<String> = kids
                .iter()
                .filter_map(|&c| self.order[c].1.message_id().map(ToString::to_string))
                .collect();
            if !ids.is_empty() {
                tree.insert(pid.to_string(), ids);
            }
        }
        tree
    }

    /// Depth-first pre-order walk of the replies below `start`.
    ///
    /// Direct replies have depth 1. `start` itself is not included.
    #[must_use]
    pub fn render_tree(&self, start: usize) -> Vec<ThreadEntry> {
        let mut out = Vec::new();
        if start >= self.order.len() {
            return out;
        }
        let mut visited = HashSet::from([start]);
        self.walk(start, 1, &mut visited, &mut out);
        out
    }

    /// Every top-level thread, each rooted at depth 0.
    #[must_use]
    pub fn render_all(&self) -> Vec<ThreadEntry> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        for &top in &self.top_level {
            if visited.insert(top) {
                out.push(self.entry(top, 0));
                self.walk(top, 1, &mut visited, &mut out);
            }
        }
        out
    }

    fn walk(
        &self,
        from: usize,
        depth: usize,
        visited: &mut HashSet<usize>,
        out: &mut Vec<ThreadEntry>,
    ) {
        let mut stack: Vec<(usize, usize)> = self
            .children(from)
            .iter()
            .rev()
            .map(|&c| (c, depth))
            .collect();
        while let Some((node, level)) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            out.push(self.entry(node, level));
            stack.extend(self.children(node).iter().rev().map(|&c| (c, level + 1)));
        }
    }

    fn entry(&self, index: usize, depth: usize) -> ThreadEntry {
        let msg = self.order[index].1;
        ThreadEntry {
            index,
            depth,
            subject: msg.subject().to_string(),
            author: short_user(msg.author()).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(id: &str, parent: Option<&str>, date: &str, subject: &str) -> Message {
        let mut m = Message::new();
        m.set_header("From", "Jane Doe <jane.doe@example.com>");
        m.set_header("Date", date);
        m.set_header("Subject", subject);
        m.set_header("Message-Id", id);
        if let Some(p) = parent {
            m.set_header("References", p);
            m.set_header("In-Reply-To", p);
        }
        m
    }

    fn pairs(msgs: &[(String, Message)]) -> Vec<(&str, &Message)> {
        msgs.iter().map(|(k, m)| (k.as_str(), m)).collect()
    }

    /// root + two replies to root, keys deliberately out of date order.
    fn sample() -> Vec<(String, Message)> {
        vec![
            (
                "1".into(),
                msg("<r2>", Some("<root>"), "Wed, 02 Jul 2025 10:00:00 +0000", "Re: second"),
            ),
            (
                "2".into(),
                msg("<root>", None, "Sat, 05 Jul 2025 10:00:00 +0000", "login fails"),
            ),
            (
                "3".into(),
                msg("<r1>", Some("<root>"), "Tue, 01 Jul 2025 10:00:00 +0000", "Re: first"),
            ),
        ]
    }

    #[test]
    fn test_find_root() {
        let msgs = sample();
        assert_eq!(find_root(&pairs(&msgs)), Some("2"));
        assert_eq!(find_root(&[]), None);
    }

    #[test]
    fn test_root_first_even_when_newest() {
        let msgs = sample();
        assert_eq!(order_by_date(&pairs(&msgs)), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_undated_sorts_before_dated() {
        let mut msgs = sample();
        msgs.push(("4".into(), msg("<r3>", Some("<root>"), "garbage", "Re: undated")));
        assert_eq!(order_by_date(&pairs(&msgs)), vec!["2", "4", "3", "1"]);
    }

    #[test]
    fn test_reply_to_index_two_nests_under_it() {
        let mut msgs = sample();
        msgs.push((
            "9".into(),
            msg("<r4>", Some("<r2>"), "Sun, 06 Jul 2025 10:00:00 +0000", "Re: Re: second"),
        ));
        let p = pairs(&msgs);
        let thread = Thread::build(&p);
        assert_eq!(thread.message(2).and_then(Message::message_id), Some("<r2>"));

        let rendered = thread.render_tree(0);
        let summary: Vec<(usize, usize)> = rendered.iter().map(|e| (e.index, e.depth)).collect();
        assert_eq!(summary, vec![(1, 1), (2, 1), (3, 2)]);
        assert_eq!(rendered[0].author, "jane");
        assert_eq!(thread.render_tree(2).len(), 1);
        assert_eq!(thread.render_tree(2)[0].depth, 1);
    }

    #[test]
    fn test_orphan_reference_is_top_level() {
        let mut msgs = sample();
        msgs.push((
            "5".into(),
            msg("<o>", Some("<missing>"), "Mon, 07 Jul 2025 10:00:00 +0000", "orphan"),
        ));
        let p = pairs(&msgs);
        let thread = Thread::build(&p);
        assert_eq!(thread.top_level(), &[0, 3]);
        assert!(thread.render_tree(0).iter().all(|e| e.subject != "orphan"));
        assert!(thread.render_all().iter().any(|e| e.subject == "orphan" && e.depth == 0));
    }

    #[test]
    fn test_cycle_terminates() {
        let msgs = vec![
            ("1".to_string(), msg("<root>", None, "Tue, 01 Jul 2025 10:00:00 +0000", "root")),
            ("2".to_string(), msg("<a>", Some("<b>"), "Wed, 02 Jul 2025 10:00:00 +0000", "a")),
            ("3".to_string(), msg("<b>", Some("<a>"), "Thu, 03 Jul 2025 10:00:00 +0000", "b")),
        ];
        let p = pairs(&msgs);
        let thread = Thread::build(&p);
        let all = thread.render_all();
        assert_eq!(all.len(), 1);
        assert_eq!(thread.render_tree(1).len(), 1);
    }

    #[test]
    fn test_reply_tree_map() {
        let msgs = sample();
        let p = pairs(&msgs);
        let tree = Thread::build(&p).reply_tree();
        assert_eq!(tree.get("<root>"), Some(&vec!["<r1>".to_string(), "<r2>".to_string()]));
    }

    proptest! {
        #[test]
        fn prop_root_first_then_nondecreasing(offsets in proptest::collection::vec(0i64..100_000, 1..20), root_at in 0usize..20) {
            let base = DateTime::parse_from_rfc2822("Tue, 01 Jul 2025 10:00:00 +0000").unwrap();
            let root_at = root_at % offsets.len();
            let msgs: Vec<(String, Message)> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| {
                    let date = (base + chrono::Duration::seconds(*off)).to_rfc2822();
                    let parent = if i == root_at { None } else { Some("<root>") };
                    (format!("{i:03}"), msg(&format!("<m{i}>"), parent, &date, "s"))
                })
                .collect();
            let p = pairs(&msgs);
            let order = order_by_date(&p);
            prop_assert_eq!(order.len(), msgs.len());
            let root_key = format!("{root_at:03}");
            prop_assert_eq!(order[0], root_key.as_str());
            let dates: Vec<_> = order[1..]
                .iter()
                .map(|k| p.iter().find(|(key, _)| key == k).and_then(|(_, m)| m.date()))
                .collect();
            prop_assert!(dates.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
