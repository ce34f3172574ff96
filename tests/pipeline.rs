//! End-to-end tests: source directory → entry stream → packed archive.

use siteark::archive::{PackedArchive, PackedArchiveWriter, StorageEngine};
use siteark::config::{self, BuildConfig};
use siteark::entry::{Entry, EntryKind};
use siteark::source::{EntrySource, SourceError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &[u8]) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(extra: &str) -> BuildConfig {
    let base: toml::Value = toml::from_str(
        r#"
welcome = "index.html"
favicon = "img/favicon.png"
language = "eng"
title = "Pipeline"
description = "End to end"
creator = "Tests"
publisher = "Tests"
"#,
    )
    .unwrap();
    let overlay: toml::Value = toml::from_str(extra).unwrap();
    config::resolve_config([base, overlay]).unwrap()
}

/// A small site: two pages, a stylesheet with a font, an image, an empty
/// file and the favicon.
fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("site");
    write(
        &root,
        "index.html",
        br#"<html><head><title>Home</title><link rel="stylesheet" href="css/site.css"></head>
<body><a href="docs/guide.html#intro">Guide</a> <img src="img/logo.png" alt="logo"></body></html>"#,
    );
    write(
        &root,
        "docs/guide.html",
        br#"<html><head><title>Guide</title></head><body><a href="../index.html">Home</a></body></html>"#,
    );
    write(
        &root,
        "css/site.css",
        b"@font-face { src: url('../fonts/body.woff'); }\nbody { background: url(../img/logo.png); }\n",
    );
    write(&root, "fonts/body.woff", b"wOFF");
    write(&root, "img/logo.png", &[0x89, b'P', b'N', b'G', 1, 2, 3]);
    write(&root, "img/favicon.png", &[0x89, b'P', b'N', b'G']);
    write(&root, "empty.txt", b"");
    tmp
}

fn drain(source: &mut EntrySource) -> Vec<Entry> {
    let mut entries = Vec::new();
    while let Some(entry) = source.get_next_entry().unwrap() {
        entries.push(entry);
    }
    entries
}

#[test]
fn entries_stream_in_order_then_end() {
    let tmp = site();
    let redirects = tmp.path().join("redirects.tsv");
    fs::write(&redirects, "oldurl\tTitle\ttarget\n").unwrap();
    let config = config(&format!("redirects = {:?}", redirects.display().to_string()));

    let mut source = EntrySource::start(tmp.path().join("site"), config).unwrap();
    let entries = drain(&mut source);
    let aids: Vec<String> = entries.iter().map(Entry::aid).collect();

    assert_eq!(
        aids,
        vec![
            "/M/Language",
            "/M/Publisher",
            "/M/Creator",
            "/M/Title",
            "/M/Description",
            "/M/Date",
            "/M/Favicon",
            "/M/Counter",
            "/A/oldurl",
            "/-/css/site.css",
            "/A/docs/guide.html",
            "/-/fonts/body.woff",
            "/I/img/favicon.png",
            "/I/img/logo.png",
            "/A/index.html",
        ]
    );

    let redirect = &entries[8];
    assert_eq!(
        redirect.kind,
        EntryKind::Redirect {
            target: siteark::namespace::ArchiveUrl::new('A', "target"),
            line: Some("oldurl\tTitle\ttarget".into()),
        }
    );
    assert_eq!(redirect.title, "Title");

    for _ in 0..3 {
        assert!(source.get_next_entry().unwrap().is_none());
    }

    let counter = source.get_payload(&entries[7]).unwrap();
    assert_eq!(
        String::from_utf8(counter).unwrap(),
        "text/css=1;text/html=2;application/font-woff=1;image/png=2;"
    );
}

#[test]
fn missing_source_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let mut source = EntrySource::start(tmp.path().join("nowhere"), config("")).unwrap();
    let result = loop {
        match source.get_next_entry() {
            Ok(Some(_)) => continue,
            other => break other,
        }
    };
    assert!(matches!(result, Err(SourceError::Walk(_))));
}

#[test]
fn packed_archive_holds_rewritten_payloads() {
    let tmp = site();
    let root = tmp.path().join("site");
    let output = tmp.path().join("site.ark");
    let config = config("min_chunk_size = 64");

    config.check_inputs(&root).unwrap();
    let writer = PackedArchiveWriter::new(config.min_chunk_size);
    let mut source = EntrySource::start(&root, config).unwrap();
    let stats = writer.create(&mut source, &output).unwrap();

    assert_eq!(stats.entries(), 14);
    assert_eq!(stats.namespaces.get(&'M'), Some(&8));
    assert!(stats.clusters > 1);

    let archive = PackedArchive::open(&output).unwrap();
    assert_eq!(archive.directory.main_page, "/A/index.html");

    let index = String::from_utf8(archive.payload('A', "index.html").unwrap().to_vec()).unwrap();
    assert!(index.contains(r#"href="../-/css/site.css""#));
    assert!(index.contains(r#"href="docs/guide.html#intro""#));
    assert!(index.contains(r#"src="../I/img/logo.png""#));
    assert!(index.contains("<title>Home</title>"));

    let guide = String::from_utf8(archive.payload('A', "docs/guide.html").unwrap().to_vec()).unwrap();
    assert!(guide.contains(r#"href="../index.html""#));

    let css = String::from_utf8(archive.payload('-', "css/site.css").unwrap().to_vec()).unwrap();
    assert_eq!(
        css,
        "@font-face { src: url('data:application/font-woff;base64,d09GRg=='); }\n\
         body { background: url(../../I/img/logo.png); }\n"
    );

    assert_eq!(
        archive.payload('I', "img/logo.png").unwrap(),
        &[0x89, b'P', b'N', b'G', 1, 2, 3]
    );
    assert_eq!(
        archive.payload('M', "Favicon").unwrap(),
        &[0x89, b'P', b'N', b'G']
    );
    assert_eq!(archive.payload('M', "Title").unwrap(), b"Pipeline");
    assert!(archive.entry('-', "empty.txt").is_none());
}

#[test]
fn unique_namespace_puts_content_in_a() {
    let tmp = site();
    let config = config("unique_namespace = true");
    let mut source = EntrySource::start(tmp.path().join("site"), config).unwrap();
    let entries = drain(&mut source);

    let content: Vec<&Entry> = entries
        .iter()
        .filter(|e| matches!(e.kind, EntryKind::File { .. }))
        .collect();
    assert!(content.iter().all(|e| e.namespace() == 'A'));

    let index = content.iter().find(|e| e.url.url == "index.html").unwrap();
    let payload = String::from_utf8(source.get_payload(index).unwrap()).unwrap();
    assert!(payload.contains(r#"src="img/logo.png""#));
    assert!(payload.contains(r#"href="css/site.css""#));
}
