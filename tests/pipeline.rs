//! Pipeline tests with a scripted model: no pdfium, no network.
//!
//! Pages are 1x1 PNGs; the model answers from the page number found in the
//! instruction, so each test can tell which page a request belongs to.

use datasheet2md::{
    assemble, convert_pages, extract_stream, write_dir, write_file, AssemblyOptions,
    ConversionConfig, ConversionProgressCallback, DatasheetError, DocumentMetadata,
    MetadataHeader, ModelError, ModelReply, ModelRequest, Page, PageError, PageSelection,
    RenderedPage, TranslationMode, VisionModel,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

type Reply = Result<ModelReply, ModelError>;

/// Answers every request through `respond(request, call_index)` and keeps
/// a copy of each request.
struct ScriptedModel<F> {
    respond: F,
    requests: Mutex<Vec<ModelRequest>>,
}

impl<F> ScriptedModel<F>
where
    F: Fn(&ModelRequest, usize) -> Reply + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl<F> VisionModel for ScriptedModel<F>
where
    F: Fn(&ModelRequest, usize) -> Reply + Send + Sync,
{
    fn describe(&self) -> String {
        "scripted".into()
    }

    async fn complete(&self, request: &ModelRequest) -> Reply {
        let call = {
            let mut seen = self.requests.lock().unwrap();
            seen.push(request.clone());
            seen.len() - 1
        };
        (self.respond)(request, call)
    }
}

fn ok(text: &str) -> Reply {
    Ok(ModelReply {
        content: text.to_string(),
        input_tokens: 100,
        output_tokens: 20,
    })
}

fn http(status: u16) -> Reply {
    Err(ModelError::Http {
        status,
        body: "scripted failure".into(),
    })
}

/// Page number of an extraction request; `None` for translation requests.
fn page_of(request: &ModelRequest) -> Option<usize> {
    request.image.as_ref()?;
    request
        .instruction
        .strip_prefix("This is page ")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// "## Section N / Body N" for extraction, "Body" → "Inhalt" for translation.
fn datasheet_reply(request: &ModelRequest) -> Reply {
    match page_of(request) {
        Some(n) => ok(&format!("## Section {n}\n\nBody {n}")),
        None => ok(&request.instruction.replace("Body", "Inhalt")),
    }
}

fn rendered(count: usize) -> Vec<RenderedPage> {
    let mut png = Vec::new();
    image::DynamicImage::new_rgb8(1, 1)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    (0..count).map(|i| Ok(Page::new(i, png.clone()))).collect()
}

fn metadata(page_count: usize) -> DocumentMetadata {
    DocumentMetadata {
        title: Some("LM317".into()),
        page_count,
        pdf_version: "1.7".into(),
        ..Default::default()
    }
}

fn fast() -> datasheet2md::ConversionConfigBuilder {
    ConversionConfig::builder().max_retries(2).retry_backoff_ms(1)
}

fn body_only() -> AssemblyOptions {
    AssemblyOptions {
        header: MetadataHeader::None,
        ..Default::default()
    }
}

// ── Sequential extraction ───────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_extracted_in_order_with_context() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().build().unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(3), metadata(3), &config)
        .await
        .unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    for (i, r) in requests.iter().enumerate() {
        assert_eq!(page_of(r), Some(i + 1));
        assert!(r.instruction.starts_with(&format!("This is page {} of 3", i + 1)));
    }
    assert!(requests[0].context.is_none());
    let third = requests[2].context.as_deref().unwrap();
    assert!(third.contains("Body 1") && third.contains("Body 2"));

    assert_eq!(out.stats.processed_pages, 3);
    assert_eq!(out.stats.failed_pages, 0);
    assert_eq!(out.stats.total_input_tokens, 300);
    assert_eq!(out.document.page_range, vec![1, 2, 3]);
    assert!(out.markdown.starts_with(
        "# LM317\n\n## Table of Contents\n\n- [LM317](#lm317)\n  - [Section 1](#section-1)\n"
    ));
    assert!(out.markdown.ends_with("## Section 3\n\nBody 3\n"));
}

#[tokio::test]
async fn context_window_is_limited() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().context_window(1).build().unwrap();

    convert_pages(&model, "lm317.pdf", &rendered(3), metadata(3), &config)
        .await
        .unwrap();

    let third = model.requests()[2].context.clone().unwrap();
    assert!(third.contains("Body 2"));
    assert!(!third.contains("Body 1"));
}

#[tokio::test]
async fn failed_page_does_not_stop_conversion() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(2) => http(401),
        _ => datasheet_reply(r),
    });
    let config = fast().build().unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(3), metadata(3), &config)
        .await
        .unwrap();

    // 401 is permanent: one call per page.
    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    let third = requests[2].context.as_deref().unwrap();
    assert!(third.contains("Body 1"));
    assert!(!third.contains("Body 2"));

    assert_eq!(out.stats.processed_pages, 2);
    assert_eq!(out.stats.failed_pages, 1);
    assert!(matches!(
        out.document.results[1].error,
        Some(PageError::ExtractionFailed { page: 2, .. })
    ));
    assert!(out.markdown.contains("Body 1"));
    assert!(out.markdown.contains("Body 3"));
    assert!(!out.markdown.contains("Body 2"));
    assert!(out.into_result().is_err());
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let model = ScriptedModel::new(|r: &ModelRequest, call| match call {
        0 => http(503),
        _ => datasheet_reply(r),
    });
    let config = fast().build().unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(1), metadata(1), &config)
        .await
        .unwrap();

    assert_eq!(model.requests().len(), 2);
    assert_eq!(out.document.results[0].retries, 1);
    assert!(out.markdown.contains("Body 1"));
}

#[tokio::test]
async fn render_failure_skips_the_model() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().build().unwrap();
    let mut pages = rendered(3);
    pages[1] = Err(PageError::RenderFailed {
        page: 2,
        detail: "broken content stream".into(),
    });

    let out = convert_pages(&model, "lm317.pdf", &pages, DocumentMetadata::default(), &config)
        .await
        .unwrap();

    assert_eq!(model.requests().len(), 2);
    assert_eq!(out.stats.total_pages, 3);
    assert_eq!(out.stats.failed_pages, 1);
}

#[tokio::test]
async fn all_pages_failing_is_an_error() {
    let model = ScriptedModel::new(|_: &ModelRequest, _| http(401));
    let config = fast().build().unwrap();

    let err = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, DatasheetError::AllPagesFailed { total: 2, .. }));
}

#[test]
fn no_pages_is_out_of_range() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().build().unwrap();

    let err = tokio_test::block_on(convert_pages(
        &model,
        "lm317.pdf",
        &[],
        metadata(4),
        &config,
    ))
    .unwrap_err();

    assert!(matches!(err, DatasheetError::PageOutOfRange { total: 4, .. }));
    assert!(model.requests().is_empty());
}

// ── Translation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_translation_asks_for_the_language() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().target_language("German").build().unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.image.is_some()));
    assert!(requests[0].system.contains("translate it into German"));
    assert!(requests[0].instruction.contains("into German"));
    assert_eq!(out.document.target_language.as_deref(), Some("German"));
    assert!(out.document.results.iter().all(|r| r.translated.is_none()));
}

#[tokio::test]
async fn per_page_translation_keeps_both_texts() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast()
        .target_language("German")
        .translation(TranslationMode::PerPage)
        .build()
        .unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(page_of(&requests[0]), Some(1));
    assert_eq!(page_of(&requests[1]), None);
    assert!(requests[1].system.contains("into German"));
    assert!(!requests[0].system.contains("German"));
    // Context carries the source text, not the translation.
    assert!(requests[2].context.as_deref().unwrap().contains("Body 1"));

    let first = &out.document.results[0];
    assert_eq!(first.text, "## Section 1\n\nBody 1\n");
    assert_eq!(first.translated.as_deref(), Some("## Section 1\n\nInhalt 1\n"));
    assert_eq!(first.input_tokens, 200);
    assert!(out.markdown.contains("Inhalt 2"));
    assert!(!out.markdown.contains("Body 2"));
}

#[tokio::test]
async fn per_page_translation_failure_keeps_source() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(_) => datasheet_reply(r),
        None if r.instruction.contains("Body 1") => http(400),
        None => datasheet_reply(r),
    });
    let config = fast()
        .target_language("German")
        .translation(TranslationMode::PerPage)
        .build()
        .unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    assert_eq!(out.stats.failed_pages, 0);
    assert_eq!(out.stats.untranslated_pages, 1);
    assert!(matches!(
        out.document.results[0].translation_error,
        Some(PageError::TranslationFailed { page: 1, .. })
    ));
    assert!(out.markdown.contains("Body 1"));
    assert!(out.markdown.contains("Inhalt 2"));
}

#[tokio::test]
async fn document_translation_is_one_call_after_extraction() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast()
        .target_language("German")
        .translation(TranslationMode::Document)
        .build()
        .unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    let last = &requests[2];
    assert!(last.image.is_none());
    assert!(last.instruction.contains("Body 1") && last.instruction.contains("Body 2"));

    assert!(out.document.translated_body.is_some());
    assert!(out.markdown.contains("Inhalt 1"));
    assert!(!out.markdown.contains("Body 1"));
    assert_eq!(out.stats.total_input_tokens, 300);

    // A page range is assembled from the per-page source text.
    let page_two = assemble(&out.document, &body_only().with_pages(PageSelection::Single(2)));
    assert_eq!(page_two, "## Section 2\n\nBody 2\n");
}

#[tokio::test]
async fn document_translation_failure_keeps_source() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(_) => datasheet_reply(r),
        None => http(400),
    });
    let config = fast()
        .target_language("German")
        .translation(TranslationMode::Document)
        .build()
        .unwrap();

    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    assert!(out.document.translated_body.is_none());
    assert!(out.document.translation_error.is_some());
    assert!(out.markdown.contains("Body 1"));
}

// ── Assembly and output files ───────────────────────────────────────────────

#[tokio::test]
async fn range_assembly_reuses_the_extraction() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r));
    let config = fast().build().unwrap();
    let out = convert_pages(&model, "lm317.pdf", &rendered(4), metadata(4), &config)
        .await
        .unwrap();

    let md = assemble(&out.document, &body_only().with_pages(PageSelection::Range(2, 3)));
    assert_eq!(md, "## Section 2\n\nBody 2\n\n## Section 3\n\nBody 3\n");
    assert_eq!(model.requests().len(), 4);
}

#[tokio::test]
async fn write_dir_writes_page_and_full_files() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(2) => http(401),
        _ => datasheet_reply(r),
    });
    let config = fast().build().unwrap();
    let out = convert_pages(&model, "docs/lm317.pdf", &rendered(3), metadata(3), &config)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = write_dir(&out, dir.path()).await.unwrap();

    let names: Vec<String> = written
        .pages
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["lm317_page_001.md", "lm317_page_003.md"]);
    assert_eq!(
        std::fs::read_to_string(&written.pages[1]).unwrap(),
        "## Section 3\n\nBody 3\n"
    );
    assert_eq!(written.full, dir.path().join("lm317_full.md"));
    assert_eq!(std::fs::read_to_string(&written.full).unwrap(), out.markdown);
    assert_eq!(written.stats.failed_pages, 1);
}

// ── Streaming and progress ──────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_pages_in_order() {
    let model = Arc::new(ScriptedModel::new(|r: &ModelRequest, _| datasheet_reply(r)));
    let config = fast().build().unwrap();

    let results: Vec<_> = extract_stream(model.clone(), rendered(3), 3, config)
        .collect()
        .await;

    let numbers: Vec<usize> = results.iter().map(|r| r.page_num()).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(results.iter().all(|r| r.is_success()));
    assert!(model.requests()[2].context.as_deref().unwrap().contains("Body 2"));
}

#[derive(Default)]
struct Counting {
    total: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    succeeded: AtomicUsize,
}

impl ConversionProgressCallback for Counting {
    fn on_conversion_start(&self, total_pages: usize) {
        self.total.store(total_pages, Ordering::SeqCst);
    }
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, _total_pages: usize, success_count: usize) {
        self.succeeded.store(success_count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_match_results() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(2) => http(401),
        _ => datasheet_reply(r),
    });
    let counting = Arc::new(Counting::default());
    let config = fast().progress_callback(counting.clone()).build().unwrap();

    convert_pages(&model, "lm317.pdf", &rendered(3), metadata(3), &config)
        .await
        .unwrap();

    assert_eq!(counting.total.load(Ordering::SeqCst), 3);
    assert_eq!(counting.started.load(Ordering::SeqCst), 3);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counting.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counting.succeeded.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_reports_start_and_completion() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(1) => http(401),
        _ => datasheet_reply(r),
    });
    let counting = Arc::new(Counting::default());
    let config = fast().progress_callback(counting.clone()).build().unwrap();

    let stream = extract_stream(model, rendered(3), 3, config);
    assert_eq!(counting.total.load(Ordering::SeqCst), 3);

    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), 3);
    assert_eq!(counting.started.load(Ordering::SeqCst), 3);
    assert_eq!(counting.succeeded.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn write_file_keeps_translation_error_on_output() {
    let model = ScriptedModel::new(|r: &ModelRequest, _| match page_of(r) {
        Some(_) => datasheet_reply(r),
        None => http(400),
    });
    let config = fast()
        .target_language("German")
        .translation(TranslationMode::Document)
        .build()
        .unwrap();
    let out = convert_pages(&model, "lm317.pdf", &rendered(2), metadata(2), &config)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("lm317.md");
    write_file(&out, &path).await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), out.markdown);
    assert!(out.document.translation_error.is_some());
    let json = serde_json::to_value(&out).unwrap();
    assert!(json["document"]["translation_error"].is_string());
}
