//! Store caching, set merging and document mutation.

mod support;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use specsuite_core::{
    AssetKey, AssetKind, AssetSet, AssetStore, MergeOutcome, ReferenceKind, RootedLayout,
};
use support::{group_names, html, reference, reftest, Suite};

// ============================================================================
// Store
// ============================================================================

#[test]
fn test_store_returns_cached_instance() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let first = suite.add(&store, "css/t.xht", reftest(&[]));
    let again = suite.load(&store, "css/t.xht");
    assert!(Rc::ptr_eq(&first, &again));

    let found = store
        .find_by_path(suite.root().join("css/./t.xht"))
        .expect("cached");
    assert!(Rc::ptr_eq(&first, &found));
    assert!(store.find_by_path(suite.root().join("css/other.xht")).is_none());
}

#[test]
fn test_inline_content() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let asset = store.generate_source(
        suite.root().join("css/virtual.xht"),
        "css/virtual.xht",
        Some(reftest(&[]).into_bytes()),
    );
    assert!(asset.is_inline());
    assert_eq!(asset.metadata().unwrap().title, "Reference chain");
    assert!(store.is_empty());
}

#[test]
fn test_plain_file_passes_through() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let image = suite.add(&store, "css/support/swatch.png", [0x89u8, b'P', b'N', b'G']);

    assert_eq!(image.kind(), AssetKind::File);
    assert_eq!(image.asset_type(), "support");
    assert_eq!(image.name(), "swatch.png");
    assert!(image.metadata().is_none());
    assert!(image.errors().is_none());
    assert_eq!(image.output_bytes().unwrap(), vec![0x89, b'P', b'N', b'G']);
}

// ============================================================================
// Sets
// ============================================================================

#[test]
fn test_merge_into_empty_set() {
    let suite = Suite::new();
    let store = AssetStore::new();
    suite.write("css/a.xht", reftest(&[]));
    suite.write("css/a-ref.xht", reference(&[]));

    let mut source = AssetSet::new(&store);
    source.add(suite.root().join("css/a.xht"), "css/a.xht");
    source.add(suite.root().join("css/a-ref.xht"), "css/a-ref.xht");

    let mut target = AssetSet::new(&store);
    let conflicts = target.merge(&source).unwrap();
    assert!(conflicts.is_empty());
    assert_eq!(target.len(), source.len());
    for ((key_a, a), (key_b, b)) in source.iter().zip(target.iter()) {
        assert_eq!(key_a, key_b);
        assert!(Rc::ptr_eq(a, b));
    }
    let keys: Vec<String> = target.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, vec!["testcase/a", "reference/a-ref"]);
}

#[test]
fn test_same_content_is_unchanged() {
    let suite = Suite::new();
    let store = AssetStore::new();
    suite.write("css/a/t.xht", reftest(&[]));
    suite.write("css/b/t.xht", reftest(&[]));

    let mut set = AssetSet::new(&store);
    let (first, outcome) = set.add(suite.root().join("css/a/t.xht"), "css/a/t.xht");
    assert_eq!(outcome, MergeOutcome::Inserted);
    let (_, outcome) = set.add(suite.root().join("css/b/t.xht"), "css/b/t.xht");
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert!(Rc::ptr_eq(set.get(&AssetKey::of(&first)).unwrap(), &first));
}

#[test]
fn test_merge_mismatch_keeps_first() {
    let suite = Suite::new();
    let store = AssetStore::new();
    suite.write("css/a/t.xht", reftest(&[]));
    suite.write("css/b/t.xht", reftest(&[("match", "t-ref.xht")]));

    let mut ours = AssetSet::new(&store);
    let (kept, _) = ours.add(suite.root().join("css/a/t.xht"), "css/a/t.xht");
    let mut theirs = AssetSet::new(&store);
    theirs.add(suite.root().join("css/b/t.xht"), "css/b/t.xht");

    let conflicts = ours.merge(&theirs).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].key.to_string(), "testcase/t");
    assert_eq!(conflicts[0].kept, vec![suite.root().join("css/a/t.xht")]);
    assert_eq!(conflicts[0].rejected, vec![suite.root().join("css/b/t.xht")]);
    assert!(conflicts[0].to_string().starts_with("File merge mismatch"));

    assert_eq!(ours.len(), 1);
    assert!(Rc::ptr_eq(ours.iter().next().unwrap().1, &kept));
}

#[test]
fn test_config_fragments_are_appended() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let first = suite.write("one/css/.htaccess", "AddType text/html .htm");
    let second = suite.write("two/css/.htaccess", "AddCharset utf-8 .xht");

    let mut set = AssetSet::new(&store);
    let (config, outcome) = set.add(&first, "css/.htaccess");
    assert_eq!(outcome, MergeOutcome::Inserted);
    assert_eq!(config.kind(), AssetKind::Config);
    assert_eq!(AssetKey::of(&config).to_string(), "support/.htaccess");

    let (_, outcome) = set.add(&second, "css/.htaccess");
    assert_eq!(outcome, MergeOutcome::Appended);
    assert_eq!(set.len(), 1);
    assert_eq!(config.physical_paths(), vec![first, second]);
    assert_eq!(
        &*config.bytes().unwrap(),
        b"AddType text/html .htm\nAddCharset utf-8 .xht\n".as_slice()
    );
    assert_eq!(config.fragments().unwrap().len(), 2);
}

#[test]
fn test_repeated_config_merges_start_fresh() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let first = suite.write("a/.htaccess", "A");
    let second = suite.write("b/.htaccess", "B");

    for _ in 0..2 {
        let mut set = AssetSet::new(&store);
        let (config, _) = set.add(&first, "out/.htaccess");
        let (_, outcome) = set.add(&second, "out/.htaccess");
        assert_eq!(outcome, MergeOutcome::Appended);
        assert_eq!(&*config.bytes().unwrap(), b"A\nB\n".as_slice());
    }

    let alone = store.generate_source(&first, "out/.htaccess", None);
    assert_eq!(&*alone.bytes().unwrap(), b"A\n".as_slice());
    assert!(store.is_empty());
}

#[test]
fn test_append_requires_matching_paths() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let a = suite.add(&store, "css/.htaccess", "A");
    let b = suite.add(&store, "svg/.htaccess", "B");
    let t = suite.add(&store, "css/t.xht", reftest(&[]));

    assert!(a.append(&b).is_err());
    assert!(a.append(&t).is_err());
    assert!(t.append(&a).is_err());
    assert_eq!(&*a.bytes().unwrap(), b"A\n".as_slice());
}

#[test]
fn test_combine_merges_smaller_into_larger() {
    let suite = Suite::new();
    let store = AssetStore::new();
    for rel in ["css/a.xht", "css/b.xht", "css/c.xht"] {
        suite.write(rel, reftest(&[]));
    }
    let mut small = AssetSet::new(&store);
    small.add(suite.root().join("css/c.xht"), "css/c.xht");
    let mut large = AssetSet::new(&store);
    large.add(suite.root().join("css/a.xht"), "css/a.xht");
    large.add(suite.root().join("css/b.xht"), "css/b.xht");

    let combined = AssetSet::combine(Some(small), Some(large)).unwrap().unwrap();
    let names: Vec<String> = combined.iter().map(|(k, _)| k.name.clone()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

// ============================================================================
// Mutation
// ============================================================================

#[test]
fn test_adjust_content_paths_for_layout() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let test = suite.add(
        &store,
        "css/t.xht",
        reftest(&[("match", "reference/t-ref.xht")]),
    );
    suite.add(&store, "css/reference/t-ref.xht", reference(&[]));
    store.link_all();

    let mut set = AssetSet::new(&store);
    set.add_source(Rc::clone(&test));
    let layout = |rel: &Path| -> PathBuf {
        let file = rel.file_name().unwrap_or_default();
        if rel.components().any(|c| c.as_os_str() == "reference") {
            Path::new("/out/refs").join(file)
        } else {
            Path::new("/out/tests").join(file)
        }
    };
    set.adjust_content_paths(&layout);

    let output = test.serialize().unwrap();
    assert!(output.contains("href=\"../refs/t-ref.xht\""), "{}", output);
    assert_eq!(test.raw_references()[0].1.href, "../refs/t-ref.xht");
    let groups = test.metadata().unwrap().references.unwrap();
    assert_eq!(groups[0][0].rel_path, "../refs/t-ref.xht");
    assert_eq!(groups[0][0].name, "t-ref");
}

#[test]
fn test_harness_scripts_are_pinned() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let test = suite.add(
        &store,
        "dom/nodes/t.html",
        html(concat!(
            "<title>Harness</title>\n",
            "<link rel=\"help\" href=\"https://dom.spec.whatwg.org/\">\n",
            "<script src=\"../../resources/testharness.js\"></script>\n",
            "<script src=\"../../resources/testharnessreport.js\"></script>",
        )),
    );
    test.adjust_content_paths(&RootedLayout::new("/out"));

    let output = test.serialize().unwrap();
    assert!(output.contains("<script src=\"/resources/testharness.js\"></script>"));
    assert!(output.contains("<script src=\"/resources/testharnessreport.js\"></script>"));
    assert!(output.contains("<link rel=\"help\" href=\"https://dom.spec.whatwg.org/\">"));
    assert!(!output.contains("</link>"));
}

#[test]
fn test_inject_and_clear_tags() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let test = suite.add(&store, "css/t-002.xht", reftest(&[]));
    let prev = suite.add(&store, "css/t-001.xht", reftest(&[]));
    let next = suite.add(&store, "css/sub/t-003.xht", reftest(&[]));
    let original = test.serialize().unwrap();

    let links = test.augment_metadata(Some(&next), Some(&prev), None, None);
    assert!(links.next.is_some());
    assert!(links.prev.is_some());
    assert!(links.reference.is_none());

    let output = test.serialize().unwrap();
    assert!(output.contains("<link rel=\"next\" href=\"sub/t-003.xht\"/>"), "{}", output);
    assert!(output.contains("<link rel=\"prev\" href=\"t-001.xht\"/>"));
    let tags: Vec<String> = test.injected_tags().into_iter().map(|(_, t)| t).collect();
    assert!(tags.iter().any(|t| t == "next"));
    assert!(tags.iter().any(|t| t == "prev"));

    test.clear_injected_tags(Some("next"));
    let output = test.serialize().unwrap();
    assert!(!output.contains("rel=\"next\""));
    assert!(output.contains("rel=\"prev\""));
    assert!(test.injected_tags().iter().all(|(_, t)| t == "prev"));

    test.clear_injected_tags(None);
    assert!(test.injected_tags().is_empty());
    assert_eq!(test.serialize().unwrap(), original);
    assert_eq!(test.metadata().unwrap().title, "Reference chain");
}

#[test]
fn test_add_reference_injects_and_updates() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let test = suite.add(&store, "css/t.xht", reftest(&[]));
    let target = suite.add(&store, "css/t-ref.xht", reference(&[]));
    assert!(!test.is_reftest());

    test.add_reference(&target, None);
    assert!(test.is_reftest());
    assert_eq!(
        group_names(&test),
        vec![vec![("t-ref".to_string(), "==")]]
    );
    let output = test.serialize().unwrap();
    assert!(output.contains("<link rel=\"match\" href=\"t-ref.xht\"/>"), "{}", output);

    test.add_reference(&target, Some(ReferenceKind::Mismatch));
    assert_eq!(test.raw_references().len(), 1);
    assert_eq!(
        group_names(&test),
        vec![vec![("t-ref".to_string(), "!=")]]
    );
    let output = test.serialize().unwrap();
    assert!(output.contains("<link rel=\"mismatch\" href=\"t-ref.xht\"/>"));
    assert!(!output.contains("rel=\"match\""));
}

#[test]
fn test_add_reference_on_plain_file_is_ignored() {
    let suite = Suite::new();
    let store = AssetStore::new();
    let image = suite.add(&store, "css/support/a.png", [1u8, 2, 3]);
    let target = suite.add(&store, "css/t-ref.xht", reference(&[]));
    image.add_reference(&target, None);
    assert!(image.raw_references().is_empty());
}
