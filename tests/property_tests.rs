use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use vsproj_watch::document::{Document, Element, Schema, decode, encode, flatten};
use vsproj_watch::grouping::extension_of;
use vsproj_watch::sync::{apply_add, apply_remove};

fn relative_path() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.(ts|css|html|js|TS)"
}

fn empty_project() -> Document {
    Document::new(Element::new("Project"))
}

/// Include values grouped by the path of their container.
fn groups(document: &Document, schema: &Schema) -> BTreeMap<Vec<usize>, Vec<String>> {
    let flat = flatten(&document.root);
    let mut groups: BTreeMap<Vec<usize>, Vec<String>> = BTreeMap::new();
    for (id, flat_ref) in flat.iter() {
        if let Some(include) = schema.include_of(flat_ref.element) {
            let parent = flat.parent(id).map(|p| p.path.clone()).unwrap_or_default();
            groups.entry(parent).or_default().push(include.to_string());
        }
    }
    groups
}

proptest! {
    #[test]
    fn test_add_is_idempotent(paths in prop::collection::vec(relative_path(), 1..20)) {
        // Invariant: each distinct path is listed exactly once, however often it is added
        let schema = Schema::default();
        let mut document = empty_project();
        for path in paths.iter().chain(paths.iter()) {
            apply_add(&mut document, &schema, path);
        }

        let listed: Vec<String> = groups(&document, &schema).into_values().flatten().collect();
        let distinct: BTreeSet<&String> = paths.iter().collect();
        prop_assert_eq!(listed.len(), distinct.len());
        prop_assert_eq!(listed.iter().collect::<BTreeSet<_>>(), distinct);
    }

    #[test]
    fn test_encode_decode_round_trip(
        paths in prop::collection::vec(relative_path(), 0..20),
        indent in 0usize..9,
    ) {
        // Invariant: trees built by the engine survive a trip through text
        let schema = Schema::default();
        let mut document = empty_project();
        for path in &paths {
            apply_add(&mut document, &schema, path);
        }

        let text = encode(&document, indent);
        let decoded = decode(&text).unwrap();
        prop_assert_eq!(&decoded, &document);
        prop_assert_eq!(encode(&decoded, indent), text);
    }

    #[test]
    fn test_same_extension_shares_a_group(paths in prop::collection::vec(relative_path(), 1..20)) {
        // Invariant: one group per extension, and every group holds a single extension
        let schema = Schema::default();
        let mut document = empty_project();
        for path in &paths {
            apply_add(&mut document, &schema, path);
        }

        let mut owner: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (group, includes) in groups(&document, &schema) {
            let extensions: BTreeSet<&str> = includes.iter().map(|p| extension_of(p)).collect();
            prop_assert_eq!(extensions.len(), 1);
            for extension in extensions {
                prop_assert!(owner.insert(extension.to_string(), group.clone()).is_none());
            }
        }
    }

    #[test]
    fn test_removing_everything_leaves_no_groups(paths in prop::collection::vec(relative_path(), 1..20)) {
        // Invariant: emptied groups disappear instead of lingering
        let schema = Schema::default();
        let mut document = empty_project();
        for path in &paths {
            apply_add(&mut document, &schema, path);
        }
        for path in &paths {
            apply_remove(&mut document, &schema, path);
        }

        prop_assert!(!document.root.is_container());
        prop_assert_eq!(encode(&document, 4), "<Project/>");
    }

    #[test]
    fn test_removal_is_non_destructive(
        paths in prop::collection::btree_set(relative_path(), 2..20),
        pick in any::<prop::sample::Index>(),
    ) {
        // Invariant: removing one entry leaves every other entry in its place and order
        let schema = Schema::default();
        let mut document = empty_project();
        for path in &paths {
            apply_add(&mut document, &schema, path);
        }
        let before = groups(&document, &schema);

        let paths: Vec<&String> = paths.iter().collect();
        let victim = paths[pick.index(paths.len())];
        prop_assert!(apply_remove(&mut document, &schema, victim).is_some());
        let after = groups(&document, &schema);

        let expected: Vec<Vec<String>> = before
            .into_values()
            .map(|group| group.into_iter().filter(|p| p != victim).collect::<Vec<_>>())
            .filter(|group| !group.is_empty())
            .collect();
        prop_assert_eq!(after.into_values().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_remove_unknown_is_noop(
        paths in prop::collection::vec(relative_path(), 0..10),
        other in "[A-Z]{1,6}\\.md",
    ) {
        let schema = Schema::default();
        let mut document = empty_project();
        for path in &paths {
            apply_add(&mut document, &schema, path);
        }
        let before = document.clone();

        prop_assert_eq!(apply_remove(&mut document, &schema, &other), None);
        prop_assert_eq!(document, before);
    }

    #[test]
    fn test_decode_never_panics(text in "\\PC{0,200}") {
        let _ = decode(&text);
    }
}
