mod common;

use migrator::api::InMemoryCms;
use migrator::models::PacingConfig;
use migrator::pipeline::{self, ENTITIES_FILE, GENERAL_PAGE, RunContext};
use migrator::services::PatternExtractor;
use migrator::storage::{LocalStorage, ManifestStore};
use tempfile::TempDir;

use common::{attachment_object, body_object, page_object, write};

#[tokio::test]
async fn test_xml_import_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("HR");
    let dump = [
        page_object("1", "Human Resources", None),
        page_object("2", "Handbook", Some("1")),
        page_object("3", "Holidays", Some("2")),
        page_object("4", "Regional Holidays", Some("3")),
        body_object("2", "<p>Read this first</p>"),
        body_object(
            "3",
            r#"<p>Calendar</p><ac:image><ri:attachment ri:filename="cal.png" /></ac:image><ac:link><ri:attachment ri:filename="dates.xlsx" /></ac:link>"#,
        ),
        attachment_object("50", "cal.png", "3"),
        attachment_object("51", "dates.xlsx", "3"),
    ]
    .join("\n");
    write(&dir, ENTITIES_FILE, dump);
    write(&dir, "attachments/3/50/1", b"\x89PNG");
    write(&dir, "attachments/3/51/1", b"PK");

    let cms = InMemoryCms::new();
    let store = LocalStorage::new(tmp.path().join("attachments.json"));
    let mut ctx = RunContext::new("HR", &dir).with_pacing(PacingConfig::none());

    let report = pipeline::run_xml_import(
        &cms,
        &store,
        &PatternExtractor::new().unwrap(),
        None,
        &mut ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.summary.shelves.created, 1);
    assert_eq!(ctx.summary.books.created, 1);
    // Regional Holidays is flattened into the Handbook book.
    assert_eq!(ctx.summary.pages.created, 2);

    let pages = cms.pages();
    let general = pages.values().find(|p| p.name == GENERAL_PAGE).unwrap();
    assert_eq!(general.html, "<p>Read this first</p>");
    let holidays = &pages[&ctx.ids.pages.get("3").unwrap()];
    assert!(holidays.html.contains(r#"<img src="data:image/png;base64,"#));
    assert!(holidays.html.contains(r#"href="[ATTACHMENT:dates.xlsx]""#));
    assert!(!holidays.html.contains("ac:"));
    let regional = &pages[&ctx.ids.pages.get("4").unwrap()];
    assert_eq!(regional.book_id, ctx.ids.books.get("2").unwrap());

    assert_eq!(report.files, 2);
    let saved = store.load("HR").await.unwrap().unwrap();
    assert_eq!(saved.get("3").unwrap().new_page_id, ctx.ids.pages.get("3"));
}
