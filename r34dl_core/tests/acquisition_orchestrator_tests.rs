use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use r34dl_core::downloader::acquisition_orchestrator::AcquisitionOrchestrator;
use r34dl_core::downloader::file_classifier::DownloadPolicy;
use r34dl_core::downloader::single_file_downloader::{build_client, RetryPolicy, SingleFileDownloader};
use r34dl_core::downloader::strategy::api_retrieval_strategy::ApiRetrieval;
use r34dl_core::downloader::strategy::html_retrieval_strategy::HtmlRetrieval;
use r34dl_core::progress::{CallbackObserver, ProgressObserver, ProgressSnapshot};
use r34dl_core::types::types::{DownloadError, DownloadStats, ItemDescriptor, TagQuery};

fn image_post(uri: &str, id: u32) -> String {
    format!(r#"<post id="{id}" file_url="{uri}/images/{id}.jpg" sample_url="{uri}/samples/{id}.jpg" tags="cat_girl"/>"#)
}

fn video_post(uri: &str, id: u32) -> String {
    format!(r#"<post id="{id}" file_url="{uri}/videos/{id}.mp4" sample_url="{uri}/samples/{id}.mp4" tags="cat_girl"/>"#)
}

fn feed(posts: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><posts count="{}" offset="0">{}</posts>"#,
        posts.len(),
        posts.concat()
    )
}

async fn mount_page(server: &MockServer, pid: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("page", "dapi"))
        .and(query_param("pid", pid))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_images(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image data".to_vec()))
        .mount(server)
        .await;
}

fn orchestrator(output_dir: &Path, policy: DownloadPolicy) -> AcquisitionOrchestrator {
    AcquisitionOrchestrator::new(
        SingleFileDownloader::new(build_client().unwrap()),
        policy,
        output_dir,
    )
    .with_retry_policy(RetryPolicy::no_retries())
}

fn api(server: &MockServer) -> ApiRetrieval {
    ApiRetrieval::with_base_url(build_client().unwrap(), &server.uri())
}

/// Records every observer callback it receives.
#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<usize>>,
    completed: Mutex<Option<ProgressSnapshot>>,
    errors: Mutex<Vec<String>>,
}

struct RecordingObserver(Arc<Recorder>);

#[async_trait]
impl ProgressObserver for RecordingObserver {
    async fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.0.progress.lock().unwrap().push(snapshot.processed);
    }

    async fn on_complete(&self, snapshot: &ProgressSnapshot) {
        *self.0.completed.lock().unwrap() = Some(snapshot.clone());
    }

    async fn on_error(&self, error: &str) {
        self.0.errors.lock().unwrap().push(error.to_string());
    }
}

// ---------------------------------------------------------------
// Feed-driven runs
// ---------------------------------------------------------------

#[tokio::test]
async fn test_end_to_end_five_images() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let posts: Vec<String> = (1..=5).map(|id| image_post(&uri, id)).collect();
    mount_page(&server, "0", feed(&posts)).await;
    mount_images(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let mut orchestrator = orchestrator(dir.path(), DownloadPolicy::default());

    let stats = orchestrator.run(&query, 5, &api(&server)).await.unwrap();

    assert_eq!(
        stats,
        DownloadStats {
            total: 5,
            downloaded: 5,
            images: 5,
            ..DownloadStats::default()
        }
    );
    for id in 1..=5 {
        assert!(dir.path().join("Images").join(format!("{}.jpg", id)).exists());
    }
    assert_eq!(orchestrator.output_dir(), dir.path());
    assert_eq!(*orchestrator.policy(), DownloadPolicy::default());
}

#[test]
fn test_destination_layout() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(dir.path(), DownloadPolicy::default());

    let gif = ItemDescriptor::new("12", "https://x/images/a.gif", ".gif");
    let unknown = ItemDescriptor::new("13", "https://x/images/a.tiff", ".tiff");
    let video = ItemDescriptor::new("cl:ip", "https://x/v/clip.mp4", ".mp4");

    assert_eq!(orchestrator.destination_for(&gif), dir.path().join("Gif").join("12.gif"));
    assert_eq!(orchestrator.destination_for(&unknown), dir.path().join("Images").join("13.tiff"));
    assert_eq!(orchestrator.destination_for(&video), dir.path().join("Video").join("cl_ip.mp4"));
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let posts: Vec<String> = (1..=3).map(|id| image_post(&uri, id)).collect();
    mount_page(&server, "0", feed(&posts)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image data".to_vec()))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let strategy = api(&server);

    let first = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 3, &strategy)
        .await
        .unwrap();
    let second = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 3, &strategy)
        .await
        .unwrap();

    assert_eq!(first.downloaded, 3);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.images, 0);
}

#[tokio::test]
async fn test_exhausted_source_returns_partial_stats() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "0", feed(&[image_post(&uri, 1), image_post(&uri, 2)])).await;
    mount_page(&server, "1", feed(&[])).await;
    mount_images(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();

    let stats = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 10, &api(&server))
        .await
        .unwrap();

    assert_eq!(stats.total, 10);
    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_disabled_videos_are_never_fetched_or_counted() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(
        &server,
        "0",
        feed(&[image_post(&uri, 1), video_post(&uri, 2), image_post(&uri, 3)]),
    )
    .await;
    mount_page(&server, "1", feed(&[image_post(&uri, 4)])).await;
    mount_images(&server).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(samples|videos)/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let policy = DownloadPolicy {
        videos: false,
        ..DownloadPolicy::default()
    };

    let stats = orchestrator(dir.path(), policy)
        .run(&query, 2, &api(&server))
        .await
        .unwrap();

    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.videos, 0);
    assert_eq!(stats.failed, 0);
    assert!(!dir.path().join("Video").exists());
    assert!(dir.path().join("Images").join("4.jpg").exists());
}

#[tokio::test]
async fn test_failed_item_is_replaced_from_next_page() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "0", feed(&[image_post(&uri, 1), image_post(&uri, 2)])).await;
    mount_page(&server, "1", feed(&[image_post(&uri, 3), image_post(&uri, 4)])).await;
    Mock::given(method("GET"))
        .and(path("/images/2.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_images(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();

    let stats = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 2, &api(&server))
        .await
        .unwrap();

    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.failed, 1);
    assert!(dir.path().join("Images").join("3.jpg").exists());
    assert!(!dir.path().join("Images").join("4.jpg").exists());
}

#[tokio::test]
async fn test_page_error_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let recorder = Arc::new(Recorder::default());

    let mut orchestrator = orchestrator(dir.path(), DownloadPolicy::default());
    orchestrator.add_observer(Box::new(RecordingObserver(recorder.clone())));
    let result = orchestrator.run(&query, 5, &api(&server)).await;

    assert!(matches!(result, Err(DownloadError::HttpStatus { status: 500, .. })));
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    assert!(recorder.errors.lock().unwrap()[0].contains("500"));
    assert!(recorder.completed.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_uncreatable_output_dir_aborts_run() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "0", feed(&[image_post(&uri, 1), image_post(&uri, 2)])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image data".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let recorder = Arc::new(Recorder::default());

    let mut orchestrator = orchestrator(&blocker, DownloadPolicy::default());
    orchestrator.add_observer(Box::new(RecordingObserver(recorder.clone())));
    let result = orchestrator.run(&query, 2, &api(&server)).await;

    assert!(matches!(result, Err(DownloadError::Disk(_))));
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    assert!(recorder.completed.lock().unwrap().is_none());
    assert!(recorder.progress.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_quantity_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();

    let stats = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 0, &api(&server))
        .await
        .unwrap();

    assert_eq!(stats, DownloadStats::default());
}

// ---------------------------------------------------------------
// Progress
// ---------------------------------------------------------------

#[tokio::test]
async fn test_progress_callback_sees_every_item() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let posts: Vec<String> = (1..=3).map(|id| image_post(&uri, id)).collect();
    mount_page(&server, "0", feed(&posts)).await;
    mount_images(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let mut orchestrator = orchestrator(dir.path(), DownloadPolicy::default());
    orchestrator.add_observer(Box::new(CallbackObserver::new(move |processed, quantity| {
        sink.lock().unwrap().push((processed, quantity));
    })));
    orchestrator.run(&query, 3, &api(&server)).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
}

// ---------------------------------------------------------------
// Markup-driven run
// ---------------------------------------------------------------

struct DetailResponder;

impl Respond for DetailResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let body = if id == "2" {
            r#"<html><body><div class="content"><video id="gelcomVideoPlayer"><source src="/videos/clip2.webm"/></video></div></body></html>"#.to_string()
        } else {
            format!(r#"<html><body><div class="content"><img id="image" src="/images/{id}.png?{id}"/></div></body></html>"#)
        };
        ResponseTemplate::new(200).set_body_string(body)
    }
}

#[tokio::test]
async fn test_html_run_sorts_by_category() {
    let server = MockServer::start().await;
    let thumbs: String = (1..=3)
        .map(|id| format!(r#"<span class="thumb"><a href="index.php?page=post&amp;s=view&amp;id={id}">t</a></span>"#))
        .collect();
    Mock::given(method("GET"))
        .and(query_param("s", "list"))
        .and(query_param("pid", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><div class="content">{thumbs}</div></body></html>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("s", "view"))
        .respond_with(DetailResponder)
        .mount(&server)
        .await;
    mount_images(&server).await;
    Mock::given(method("GET"))
        .and(path("/videos/clip2.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"webm".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let query = TagQuery::parse("cat_girl").unwrap();
    let html = HtmlRetrieval::with_base_url(build_client().unwrap(), &server.uri());

    let stats = orchestrator(dir.path(), DownloadPolicy::default())
        .run(&query, 3, &html)
        .await
        .unwrap();

    assert_eq!(stats.downloaded, 3);
    assert_eq!(stats.images, 2);
    assert_eq!(stats.videos, 1);
    assert!(dir.path().join("Images").join("1.png").exists());
    assert!(dir.path().join("Images").join("3.png").exists());
    assert!(dir.path().join("Video").join("clip2.webm").exists());
}
