mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use migrator::api::InMemoryCms;
use migrator::models::{EntityKind, PacingConfig};
use migrator::pipeline::{
    self, CancelToken, CollectingSink, GENERAL_PAGE, RunContext,
};
use migrator::storage::{LocalStorage, ManifestStore};
use tempfile::TempDir;

use common::{export_page, write};

const ROOT: &str = "index.html";
const HOME: &str = "IT-Home_1.html";
const BOOK: &str = "Networking_2.html";
const CHAPTER: &str = "Firewalls_3.html";

fn five_document_export(dir: &Path) {
    write(dir, HOME, export_page(&[ROOT], "IT Home", "<p>Welcome</p>"));
    write(dir, BOOK, export_page(&[ROOT, HOME], "Networking", "<p>All about networks</p>"));
    write(
        dir,
        CHAPTER,
        export_page(&[ROOT, HOME, BOOK], "Firewalls", "<p>Rules</p>"),
    );
    write(
        dir,
        "Port-Policy_4.html",
        export_page(
            &[ROOT, HOME, BOOK, CHAPTER],
            "Port Policy",
            concat!(
                r#"<p>See <a href="Networking_2.html">the book</a>"#,
                r#" and <a href="Gone_99.html">an old page</a>.</p>"#,
                r#"<p><a href="attachments/4/77.pdf?version=1">Spec.pdf</a></p>"#,
            ),
        ),
    );
    write(
        dir,
        "VPN_5.html",
        export_page(&[ROOT, HOME, BOOK], "VPN", "<p>Connect</p>"),
    );
    write(dir, "attachments/4/77.pdf", b"%PDF");
    write(dir, "attachments/4/78.txt", b"notes");
}

fn context(tmp: &TempDir) -> RunContext {
    RunContext::new("IT", tmp.path().join("IT")).with_pacing(PacingConfig::none())
}

#[tokio::test]
async fn test_five_document_import() {
    let tmp = TempDir::new().unwrap();
    five_document_export(&tmp.path().join("IT"));
    let cms = InMemoryCms::new();
    let store = LocalStorage::new(tmp.path().join("attachments.json"));
    let sink = Arc::new(CollectingSink::new());
    let mut ctx = context(&tmp).with_progress(sink.clone());

    let report = pipeline::run_import(&cms, &store, &mut ctx).await.unwrap();

    let topology = &ctx.topology;
    assert_eq!(topology.shelves, vec![HOME]);
    assert_eq!(topology.books, vec![BOOK]);
    assert_eq!(topology.chapters.keys().collect::<Vec<_>>(), vec![CHAPTER]);
    assert_eq!(topology.pages_in_chapters, vec!["Port-Policy_4.html"]);
    assert_eq!(topology.pages_in_books, vec!["VPN_5.html"]);

    let summary = &ctx.summary;
    assert_eq!(summary.shelves.created, 1);
    assert_eq!(summary.books.created, 1);
    assert_eq!(summary.chapters.created, 1);
    assert_eq!(summary.pages.created, 2);
    assert_eq!(summary.failure_count(), 0);
    assert!(!summary.cancelled);

    let pages = cms.pages();
    let policy = &pages[&ctx.ids.pages.get("4").unwrap()];
    assert_eq!(policy.name, "Port Policy");
    assert!(policy.html.contains(r#"href="/books/networking""#));
    assert!(policy.html.contains(r#"href="Gone_99.html""#));
    assert!(!policy.html.contains("breadcrumbs"));
    assert_eq!(
        summary.unresolved_links,
        vec![("Port-Policy_4.html".to_string(), "Gone_99.html".to_string())]
    );
    assert_eq!(
        pages.values().filter(|p| p.name == GENERAL_PAGE).count(),
        3
    );

    // Content scan and filesystem scan merge into one record.
    assert_eq!(report.records, 1);
    assert_eq!(report.files, 2);
    let saved = store.load("IT").await.unwrap().unwrap();
    let record = saved.get("4").unwrap();
    assert_eq!(record.new_page_id, ctx.ids.pages.get("4"));
    let hrefs: Vec<_> = record.attachments.iter().map(|a| a.href.as_str()).collect();
    assert_eq!(hrefs, vec!["attachments/4/77.pdf", "attachments/4/78.txt"]);

    let events = sink.events();
    assert!(events.iter().any(|e| e.counters.pages == 2));
}

#[tokio::test]
async fn test_missing_export_dir_makes_no_calls() {
    let tmp = TempDir::new().unwrap();
    let cms = InMemoryCms::new();
    let store = LocalStorage::new(tmp.path().join("attachments.json"));
    let mut ctx = context(&tmp);

    let err = pipeline::run_import(&cms, &store, &mut ctx).await.unwrap_err();

    assert!(err.to_string().contains("Export directory not found"));
    assert!(cms.books().is_empty());
    assert!(store.load("IT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_after_two_of_ten_pages() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("IT");
    write(&dir, HOME, export_page(&[ROOT], "IT Home", ""));
    write(&dir, BOOK, export_page(&[ROOT, HOME], "Networking", ""));
    for i in 0..10 {
        let name = format!("Page-{i}_{}.html", 10 + i);
        write(&dir, &name, export_page(&[ROOT, HOME, BOOK], &format!("Page {i}"), ""));
    }

    let cancel = CancelToken::new();
    let created = Arc::new(AtomicUsize::new(0));
    let hook = {
        let cancel = cancel.clone();
        let created = created.clone();
        move |name: &str, _: usize| {
            if name != GENERAL_PAGE && created.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                cancel.cancel();
            }
        }
    };
    let cms = InMemoryCms::new().with_page_hook(hook);
    let store = LocalStorage::new(tmp.path().join("attachments.json"));
    let mut ctx = context(&tmp).with_cancel(cancel);

    pipeline::run_import(&cms, &store, &mut ctx).await.unwrap();

    let pages = ctx.summary.tally(EntityKind::Page);
    assert_eq!(pages.created, 2);
    assert_eq!(pages.skipped, 8);
    assert!(pages.not_created.is_empty());
    assert!(ctx.summary.cancelled);
    assert_eq!(
        cms.pages().values().filter(|p| p.name != GENERAL_PAGE).count(),
        2
    );
}

#[tokio::test]
async fn test_import_upload_and_fix_links() {
    let tmp = TempDir::new().unwrap();
    five_document_export(&tmp.path().join("IT"));
    let cms = InMemoryCms::new();
    let store = LocalStorage::new(tmp.path().join("attachments.json"));

    let mut ctx = context(&tmp);
    pipeline::run_import(&cms, &store, &mut ctx).await.unwrap();
    let page_id = ctx.ids.pages.get("4").unwrap();

    let mut ctx = context(&tmp);
    let upload = pipeline::run_upload(&cms, &store, 1024, &mut ctx).await.unwrap();
    assert_eq!(upload.uploaded, 2);
    assert_eq!(upload.skipped(), 0);

    let mut ctx = context(&tmp);
    let fixed = pipeline::run_fix_links(&cms, &store, &mut ctx).await.unwrap();
    assert_eq!(fixed.pages_updated, 1);
    assert_eq!(fixed.links_fixed, 1);

    let spec = cms
        .attachments()
        .into_iter()
        .find(|a| a.name == "Spec.pdf")
        .unwrap();
    let html = &cms.pages()[&page_id].html;
    assert!(html.contains(&format!(r#"href="/attachments/{}""#, spec.id)));
}

#[tokio::test]
async fn test_download_and_encoded_links_resolved_after_upload() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("IT");
    write(&dir, HOME, export_page(&[ROOT], "IT Home", ""));
    write(&dir, BOOK, export_page(&[ROOT, HOME], "Networking", ""));
    write(
        &dir,
        "Budget_6.html",
        export_page(
            &[ROOT, HOME, BOOK],
            "Budget",
            concat!(
                r#"<p><a href="/wiki/download/attachments/6/plan.xlsx?api=v2""#,
                r#" data-linked-resource-id="80""#,
                r#" data-linked-resource-default-alias="plan.xlsx">plan</a></p>"#,
                r#"<p><a href="attachments/6/Q3%20Plan.pdf?version=2">Q3 Plan</a></p>"#,
            ),
        ),
    );
    write(&dir, "attachments/6/80.xlsx", b"PK");
    write(&dir, "attachments/6/Q3 Plan.pdf", b"%PDF");
    let cms = InMemoryCms::new();
    let store = LocalStorage::new(tmp.path().join("attachments.json"));

    let mut ctx = context(&tmp);
    pipeline::run_import(&cms, &store, &mut ctx).await.unwrap();
    let page_id = ctx.ids.pages.get("6").unwrap();
    let imported = cms.pages()[&page_id].html.clone();
    assert!(imported.contains(r#"href="attachments/6/80.xlsx""#));
    assert!(imported.contains(r#"href="attachments/6/Q3 Plan.pdf""#));

    // Content links and the files on disk agree on one key each.
    let saved = store.load("IT").await.unwrap().unwrap();
    assert_eq!(saved.get("6").unwrap().attachments.len(), 2);

    let mut ctx = context(&tmp);
    let upload = pipeline::run_upload(&cms, &store, 1024, &mut ctx).await.unwrap();
    assert_eq!(upload.uploaded, 2);

    let mut ctx = context(&tmp);
    let fixed = pipeline::run_fix_links(&cms, &store, &mut ctx).await.unwrap();
    assert_eq!(fixed.pages_updated, 1);
    assert_eq!(fixed.links_fixed, 2);
    assert_eq!(fixed.unmatched, 0);

    let html = &cms.pages()[&page_id].html;
    for attachment in cms.attachments() {
        assert_eq!(attachment.uploaded_to, page_id);
        assert!(html.contains(&format!(r#"href="/attachments/{}""#, attachment.id)));
    }
    assert!(!html.contains("attachments/6/"));
}
