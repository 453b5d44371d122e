//! Merge pipeline scenarios: sectioning, image copies, dedup.

use bindery::prelude::*;

fn book(title: &str) -> Publication {
    Publication::new(
        DublinCore::new(title, "Author"),
        PublicationOptions::default(),
    )
    .unwrap()
}

#[test]
fn merge_two_publications_with_conflicting_image_names() {
    let mut p1 = book("One");
    p1.add_chapter(ChapterOptions::new("A").content(r#"<img src="../images/img.png"/>"#))
        .unwrap();
    p1.add_chapter(ChapterOptions::new("B")).unwrap();
    p1.add_image(ImageOptions::new("img.png", b"bytes-one".to_vec()))
        .unwrap();

    let mut p2 = book("Two");
    p2.add_chapter(ChapterOptions::new("C").content(r#"<img src="img.png"/>"#))
        .unwrap();
    p2.add_image(ImageOptions::new("img.png", b"bytes-two".to_vec()))
        .unwrap();

    let merged = merge_publications(DublinCore::new("Omnibus", "Ed."), &[&p1, &p2]).unwrap();

    let roots = merged.get_root_chapters();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].title, "Book 1");
    assert_eq!(roots[1].title, "Book 2");
    assert_eq!(roots[0].children.len(), 2);
    assert_eq!(roots[1].children.len(), 1);

    let filenames: Vec<_> = merged
        .get_all_images()
        .iter()
        .map(|i| i.filename.clone())
        .collect();
    assert_eq!(merged.get_all_images().len(), 2);
    assert!(filenames.contains(&"images/book1-img.png".to_string()));
    assert!(filenames.contains(&"images/book2-img.png".to_string()));

    let a = merged.get_chapter(&roots[0].children[0]).unwrap();
    assert!(a.content().contains(r#"src="../images/book1-img.png""#));
    let c = merged.get_chapter(&roots[1].children[0]).unwrap();
    assert!(c.content().contains(r#"src="../images/book2-img.png""#));
}

#[test]
fn identical_stylesheets_are_deduplicated() {
    let css = "p { margin: 0; }";
    let mut p1 = book("One");
    p1.add_chapter(ChapterOptions::new("A").content(r#"<img src="../css/s.css"/>"#))
        .unwrap();
    p1.add_stylesheet(StylesheetOptions::new("s.css", css)).unwrap();

    let mut p2 = book("Two");
    p2.add_chapter(ChapterOptions::new("B").content(r#"<img src="../css/s.css"/>"#))
        .unwrap();
    p2.add_stylesheet(StylesheetOptions::new("s.css", css)).unwrap();

    let merged = merge_publications(DublinCore::new("Omnibus", "Ed."), &[&p1, &p2]).unwrap();

    // One default plus exactly one merged copy.
    let stylesheets = merged.get_all_stylesheets();
    assert_eq!(stylesheets.len(), 2);
    assert!(stylesheets
        .iter()
        .any(|s| s.filename == "css/book1-s.css"));

    let roots = merged.get_root_chapters();
    for root in roots {
        let child = merged.get_chapter(&root.children[0]).unwrap();
        assert!(
            child.content().contains(r#"src="../css/book1-s.css""#),
            "both sources should point at the shared copy: {}",
            child.content()
        );
    }
}

#[test]
fn differing_stylesheets_are_kept_apart() {
    let mut p1 = book("One");
    p1.add_chapter(ChapterOptions::new("A")).unwrap();
    p1.add_stylesheet(StylesheetOptions::new("s.css", "p{color:red}"))
        .unwrap();

    let mut p2 = book("Two");
    p2.add_chapter(ChapterOptions::new("B")).unwrap();
    p2.add_stylesheet(StylesheetOptions::new("s.css", "p{color:blue}"))
        .unwrap();

    let merged = merge_publications(DublinCore::new("Omnibus", "Ed."), &[&p1, &p2]).unwrap();
    let filenames: Vec<_> = merged
        .get_all_stylesheets()
        .iter()
        .map(|s| s.filename.clone())
        .collect();
    assert!(filenames.contains(&"css/book1-s.css".to_string()));
    assert!(filenames.contains(&"css/book2-s.css".to_string()));
}

#[test]
fn cover_is_not_promoted_across_merge() {
    let mut p1 = book("One");
    p1.add_chapter(ChapterOptions::new("A")).unwrap();
    p1.add_image(ImageOptions::new("front.jpg", vec![1]).cover(true))
        .unwrap();

    let merged = merge_publications(DublinCore::new("Omnibus", "Ed."), &[&p1]).unwrap();
    assert!(merged.cover().is_none());
    assert_eq!(merged.get_all_images().len(), 1);
}

#[test]
fn merged_result_exports_and_reparses() {
    let mut p1 = book("One");
    p1.add_chapter(ChapterOptions::new("A").content("<p>a</p>")).unwrap();
    let mut p2 = book("Two");
    p2.add_chapter(ChapterOptions::new("B").content("<p>b</p>")).unwrap();

    let merged = merge_publications(DublinCore::new("Omnibus", "Ed."), &[&p1, &p2]).unwrap();
    let bytes = merged
        .export(EpubVersion::V3, &ExportOptions::default())
        .unwrap();
    let parsed = read_epub_bytes(&bytes, &ReadOptions::default()).unwrap();

    let roots = parsed.get_root_chapters();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].title, "Book 1");
    assert_eq!(roots[0].children.len(), 1);
    assert_eq!(roots[1].children.len(), 1);
}
