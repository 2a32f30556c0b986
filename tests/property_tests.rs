//! Property-based tests for ordering and entry-list rewrites.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use sitestore::core::types::{Entry, Oid, RepoPath};
use sitestore::engine::coordinator::{merge_changes, Change};
use sitestore::engine::ordering::{insertion_index, subfolder_of};

/// Strategy for one valid path segment.
fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9_-]{0,7}"
}

/// Strategy for a collection item: top-level or one subfolder deep.
fn item() -> impl Strategy<Value = String> {
    prop_oneof![
        segment().prop_map(|name| format!("{name}.md")),
        (prop::sample::select(vec!["2021", "2022", "2023"]), segment())
            .prop_map(|(sub, name)| format!("{sub}/{name}.md")),
    ]
}

/// Strategy for an order whose subfolder groups are contiguous.
fn grouped_order() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(item(), 0..20).prop_map(|mut items| {
        items.sort_by_key(|i| subfolder_of(i).map(str::to_string));
        items
    })
}

fn oid_strategy() -> impl Strategy<Value = Oid> {
    "[0-9a-f]{40}".prop_map(|s| Oid::new(s).unwrap())
}

fn path_strategy() -> impl Strategy<Value = RepoPath> {
    prop::collection::vec(segment(), 1..4).prop_map(|segs| RepoPath::new(segs.join("/")).unwrap())
}

fn entries_strategy() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::btree_map(path_strategy(), oid_strategy(), 0..12)
        .prop_map(|m| m.into_iter().map(|(p, o)| Entry::blob(p, o)).collect())
}

/// Whether the items of every subfolder sit next to each other.
fn groups_contiguous(order: &[String]) -> bool {
    let mut closed: Vec<&str> = Vec::new();
    let mut current: Option<&str> = None;
    for item in order {
        let sub = subfolder_of(item);
        if sub != current {
            if let Some(prev) = current {
                closed.push(prev);
            }
            if let Some(s) = sub {
                if closed.contains(&s) {
                    return false;
                }
            }
            current = sub;
        }
    }
    true
}

proptest! {
    #[test]
    fn insertion_index_is_in_bounds(
        order in prop::collection::vec(item(), 0..20),
        new in item(),
        index in prop::option::of(0usize..40),
    ) {
        let at = insertion_index(&order, &new, index);
        prop_assert!(at <= order.len());
    }

    #[test]
    fn explicit_index_is_clamped(
        order in prop::collection::vec(item(), 0..20),
        new in item(),
        index in 0usize..40,
    ) {
        prop_assert_eq!(insertion_index(&order, &new, Some(index)), index.min(order.len()));
    }

    #[test]
    fn top_level_items_append(
        order in prop::collection::vec(item(), 0..20),
        name in segment(),
    ) {
        let new = format!("{name}.md");
        prop_assert_eq!(insertion_index(&order, &new, None), order.len());
    }

    #[test]
    fn subfolder_groups_stay_contiguous(
        order in grouped_order(),
        new in item(),
    ) {
        prop_assume!(groups_contiguous(&order));
        let mut next = order.clone();
        let at = insertion_index(&next, &new, None);
        next.insert(at, new);
        prop_assert!(groups_contiguous(&next));
    }

    #[test]
    fn upsert_leaves_exactly_one_entry(
        entries in entries_strategy(),
        path in path_strategy(),
        oid in oid_strategy(),
    ) {
        let entry = Entry::blob(path.clone(), oid);
        let merged = merge_changes(entries.clone(), &[Change::Upsert(entry.clone())]);

        let matching: Vec<_> = merged.iter().filter(|e| e.path == path).collect();
        prop_assert_eq!(matching, vec![&entry]);

        let others_before: Vec<_> = entries.iter().filter(|e| e.path != path).collect();
        let others_after: Vec<_> = merged.iter().filter(|e| e.path != path).collect();
        prop_assert_eq!(others_before, others_after);
    }

    #[test]
    fn remove_drops_only_that_path(
        entries in entries_strategy(),
        path in path_strategy(),
    ) {
        let merged = merge_changes(entries.clone(), &[Change::Remove(path.clone())]);
        prop_assert!(merged.iter().all(|e| e.path != path));
        prop_assert_eq!(
            merged.len(),
            entries.iter().filter(|e| e.path != path).count()
        );
    }

    #[test]
    fn rebase_round_trips(
        from in path_strategy(),
        to in path_strategy(),
        rest in path_strategy(),
    ) {
        let original = from.join(rest.as_str()).unwrap();
        let moved = original.rebase(&from, &to).unwrap();
        prop_assert!(moved.is_within(&to));
        prop_assert_eq!(moved.rebase(&to, &from).unwrap(), original);
    }
}
