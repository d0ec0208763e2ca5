//! End-to-end pipeline tests: mock HTTP archive in, PDFs out.

use std::io::Cursor;
use std::path::Path;

use pagepress_core::fetch::SourceEntry;
use pagepress_core::pipeline::{self, PipelineConfig};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Encodes a small solid-color PNG for mock responses.
fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(24, 32, image::Rgb([10, 160, 90]));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("png encoding");
    buffer.into_inner()
}

fn test_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        output_dir: output_dir.to_path_buf(),
        concurrency: 3,
        batch_size: 4,
        ..PipelineConfig::default()
    }
}

fn page_count(pdf: &Path) -> usize {
    lopdf::Document::load(pdf).expect("valid pdf").get_pages().len()
}

#[tokio::test]
async fn test_run_urls_converts_each_image() {
    let server = MockServer::start().await;
    let body = png_bytes();
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}.png")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;
    }

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());
    let entries = ["a", "b", "c"]
        .iter()
        .map(|name| SourceEntry::new(format!("{}/{name}.png", server.uri())))
        .collect();

    let summary = pipeline::run_urls(&config, entries, false)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.fetch_failures, 0);
    assert_eq!(summary.converted, 3);
    for name in ["a", "b", "c"] {
        let pdf = temp_dir.path().join("pdfs").join(format!("{name}.pdf"));
        assert!(pdf.exists(), "missing {}", pdf.display());
        assert_eq!(page_count(&pdf), 1);
    }
    // No failures: no report file anywhere in the output root.
    assert!(summary.report_path.is_none());
}

#[tokio::test]
async fn test_run_urls_combine_builds_one_pdf() {
    let server = MockServer::start().await;
    let body = png_bytes();
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
    }

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());
    let entries = ["a", "b", "c"]
        .iter()
        .map(|name| SourceEntry::new(format!("{}/{name}.png", server.uri())))
        .collect();

    let summary = pipeline::run_urls(&config, entries, true)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    let pdfs: Vec<_> = std::fs::read_dir(temp_dir.path().join("pdfs"))
        .expect("pdfs dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(pdfs.len(), 1);
    let name = pdfs[0].file_name().expect("name").to_string_lossy();
    assert!(name.starts_with("combined_"), "got {name}");
    assert_eq!(page_count(&pdfs[0]), 3);
}

#[tokio::test]
async fn test_run_urls_partial_failure_writes_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/good.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());
    let entries = vec![
        SourceEntry::new(format!("{}/good.png", server.uri())),
        SourceEntry::new(format!("{}/bad.png", server.uri())),
    ];

    let summary = pipeline::run_urls(&config, entries, false)
        .await
        .expect("run succeeds");

    // Partial success is a pipeline success; the failure lands in the report.
    assert!(summary.succeeded);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.fetch_failures, 1);

    let report = summary.report_path.expect("report written");
    let text = std::fs::read_to_string(report).expect("report readable");
    assert!(text.contains("bad.png"));
    assert!(text.contains("500"));
}

#[tokio::test]
async fn test_run_urls_cleans_intermediates_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());
    let entries = vec![SourceEntry::new(format!("{}/a.png", server.uri()))];

    let summary = pipeline::run_urls(&config, entries, false)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    let leftover: Vec<_> = std::fs::read_dir(temp_dir.path().join("imgs"))
        .expect("imgs dir")
        .collect();
    assert!(leftover.is_empty(), "intermediates should be deleted");
}

#[tokio::test]
async fn test_run_urls_keep_images_flag_preserves_intermediates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = PipelineConfig {
        keep_images: true,
        ..test_config(temp_dir.path())
    };
    let entries = vec![SourceEntry::new(format!("{}/a.png", server.uri()))];

    let summary = pipeline::run_urls(&config, entries, false)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert!(temp_dir.path().join("imgs").join("a.png").exists());
}

#[tokio::test]
async fn test_run_manifest_probes_pages_and_builds_document_pdf() {
    let server = MockServer::start().await;
    let body = png_bytes();
    for page in 1..=3u32 {
        Mock::given(method("GET"))
            .and(path("/documents/preview"))
            .and(query_param("previewFileIndex", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/documents/preview"))
        .and(query_param("previewFileIndex", "4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let manifest = temp_dir.path().join("manifest.csv");
    std::fs::write(
        &manifest,
        "FILENAME,FILEENTRYID,PREVIEW_URL\n\
         \"Board Minutes.pdf\",42,/documents/preview?docId=42&previewFileIndex=1\n",
    )
    .expect("write manifest");

    let config = test_config(temp_dir.path());
    let base = Url::parse(&server.uri()).expect("base url");

    let summary = pipeline::run_manifest(&config, &manifest, &base, false)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert_eq!(summary.fetched, 3, "three probed pages");
    // The 404 at page 4 is expected termination, not an error.
    assert_eq!(summary.fetch_failures, 0);
    assert!(summary.report_path.is_none());

    let pdf = temp_dir.path().join("pdfs").join("Board Minutes.pdf");
    assert!(pdf.exists());
    assert_eq!(page_count(&pdf), 3);

    // Side outputs from manifest processing.
    assert!(temp_dir.path().join("urls").join("preview_urls.txt").exists());
    assert!(
        temp_dir
            .path()
            .join("urls")
            .join("filename_url_map.csv")
            .exists()
    );
}

#[tokio::test]
async fn test_run_manifest_document_without_page_one_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/preview"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let manifest = temp_dir.path().join("manifest.csv");
    std::fs::write(
        &manifest,
        "FILENAME,PREVIEW_URL\nGone.pdf,/documents/preview?previewFileIndex=1\n",
    )
    .expect("write manifest");

    let config = test_config(temp_dir.path());
    let base = Url::parse(&server.uri()).expect("base url");

    let summary = pipeline::run_manifest(&config, &manifest, &base, false)
        .await
        .expect("run completes");

    assert!(!summary.succeeded);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.fetch_failures, 1);
    assert!(summary.report_path.is_some());
}

#[tokio::test]
async fn test_run_single_fetches_and_converts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());

    let summary = pipeline::run_single(&config, &format!("{}/scan.png", server.uri()), None)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert!(temp_dir.path().join("pdfs").join("scan.pdf").exists());
}

#[tokio::test]
async fn test_run_single_honors_output_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());

    let summary = pipeline::run_single(
        &config,
        &format!("{}/scan.png", server.uri()),
        Some("named.pdf"),
    )
    .await
    .expect("run succeeds");

    assert!(summary.succeeded);
    assert!(temp_dir.path().join("pdfs").join("named.pdf").exists());
}

#[tokio::test]
async fn test_run_single_fetch_failure_reports_and_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan.png"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());

    let summary = pipeline::run_single(&config, &format!("{}/scan.png", server.uri()), None)
        .await
        .expect("run completes");

    assert!(!summary.succeeded);
    assert_eq!(summary.fetch_failures, 1);
    let report = summary.report_path.expect("report written");
    assert!(std::fs::read_to_string(report)
        .expect("report readable")
        .contains("503"));
}

#[tokio::test]
async fn test_run_directory_converts_local_images() {
    let temp_dir = TempDir::new().expect("temp dir");
    let scans = temp_dir.path().join("scans");
    std::fs::create_dir_all(&scans).expect("scans dir");
    for name in ["x.png", "y.png"] {
        image::RgbImage::from_pixel(16, 16, image::Rgb([5, 5, 5]))
            .save(scans.join(name))
            .expect("write png");
    }

    let out = temp_dir.path().join("out");
    let config = test_config(&out);

    let summary = pipeline::run_directory(&config, &scans, false, false)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert_eq!(summary.converted, 2);
    assert!(out.join("pdfs").join("x.pdf").exists());
    assert!(out.join("pdfs").join("y.pdf").exists());
}

#[tokio::test]
async fn test_run_directory_combine_names_after_directory() {
    let temp_dir = TempDir::new().expect("temp dir");
    let scans = temp_dir.path().join("scans");
    std::fs::create_dir_all(&scans).expect("scans dir");
    image::RgbImage::from_pixel(16, 16, image::Rgb([5, 5, 5]))
        .save(scans.join("x.png"))
        .expect("write png");

    let out = temp_dir.path().join("out");
    let config = test_config(&out);

    let summary = pipeline::run_directory(&config, &scans, false, true)
        .await
        .expect("run succeeds");

    assert!(summary.succeeded);
    assert!(out.join("pdfs").join("scans_combined.pdf").exists());
}

#[tokio::test]
async fn test_run_directory_empty_is_failure() {
    let temp_dir = TempDir::new().expect("temp dir");
    let empty = temp_dir.path().join("empty");
    std::fs::create_dir_all(&empty).expect("empty dir");
    let config = test_config(&temp_dir.path().join("out"));

    let summary = pipeline::run_directory(&config, &empty, false, false)
        .await
        .expect("run completes");
    assert!(!summary.succeeded);
}

#[tokio::test]
async fn test_run_url_file_missing_file_is_systemic_error() {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = test_config(temp_dir.path());

    let result =
        pipeline::run_url_file(&config, Path::new("/definitely/not/here.txt"), false).await;
    assert!(result.is_err());
}
