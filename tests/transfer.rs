mod common;

use common::test_config;
use modsync::{DownloadTask, Fetched, ModError, NoProgress, Transfer};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_follows_relative_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old/version.txt"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new/version.txt"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new/version.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("2.1.0"))
        .mount(&server)
        .await;

    let transfer = Transfer::new(&test_config()).unwrap();
    let body = transfer
        .get(&format!("{}/old/version.txt", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, Fetched::Ok("2.1.0".to_string()));
}

#[tokio::test]
async fn test_status_outcomes() {
    let server = MockServer::start().await;
    Mock::given(path("/cached"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(path("/loop"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let transfer = Transfer::new(&test_config()).unwrap();

    let cached = transfer.get(&format!("{}/cached", server.uri())).await.unwrap();
    assert!(cached.is_not_modified());

    let missing = transfer.get(&format!("{}/missing", server.uri())).await;
    assert!(matches!(missing, Err(ModError::NotFound(_))));

    let broken = transfer.get(&format!("{}/broken", server.uri())).await;
    assert!(matches!(
        broken,
        Err(ModError::HttpStatus { status: 500, .. })
    ));

    let looping = transfer.get(&format!("{}/loop", server.uri())).await;
    assert!(matches!(looping, Err(ModError::TooManyRedirects(_))));

    assert!(transfer
        .get_optional(&format!("{}/missing", server.uri()))
        .await
        .is_none());
}

#[tokio::test]
async fn test_download_resumes_with_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.dat"))
        .and(header("Range", "bytes=5-"))
        .respond_with(ResponseTemplate::new(206).set_body_string(" world"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("file.dat");
    std::fs::write(&target, "hello").unwrap();

    let transfer = Transfer::new(&test_config()).unwrap();
    let len = transfer
        .download(&format!("{}/file.dat", server.uri()), &target, &NoProgress)
        .await
        .unwrap();

    assert_eq!(len, Fetched::Ok(11));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello world");
}

#[tokio::test]
async fn test_download_restarts_when_range_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("file.dat");
    std::fs::write(&target, "junk!").unwrap();

    let transfer = Transfer::new(&test_config()).unwrap();
    transfer
        .download(&format!("{}/file.dat", server.uri()), &target, &NoProgress)
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello world");
}

#[tokio::test]
async fn test_try_download_falls_back_to_next_mirror() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/good/pkg.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-data".to_vec()))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let transfer = Transfer::new(&test_config()).unwrap();
    let mut task = DownloadTask::new(
        "pkg.zip",
        vec![
            format!("{}/dead/", server.uri()),
            format!("{}/good/", server.uri()),
        ],
        tmp.path().join("sub/pkg.zip"),
    );

    let result = transfer.try_download(&mut task, &NoProgress).await.unwrap();
    assert_eq!(result, Fetched::Ok(7));
    assert_eq!(task.offset, 7);
    assert_eq!(std::fs::read(tmp.path().join("sub/pkg.zip")).unwrap(), b"PK-data");
}

#[tokio::test]
async fn test_try_download_all_mirrors_fail() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let transfer = Transfer::new(&test_config()).unwrap();
    let mut task = DownloadTask::new(
        "pkg.zip",
        vec![format!("{}/a/", server.uri()), format!("{}/b", server.uri())],
        tmp.path().join("pkg.zip"),
    );

    let err = transfer.try_download(&mut task, &NoProgress).await.unwrap_err();
    assert!(matches!(err, ModError::AllMirrorsFailed(name) if name == "pkg.zip"));
}

fn part_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".part"))
        .collect()
}

#[tokio::test]
async fn test_failed_download_keeps_existing_file() {
    let server = MockServer::start().await;
    Mock::given(path("/flaky/notes.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("notes.txt");
    std::fs::write(&target, "installed copy").unwrap();

    let transfer = Transfer::new(&test_config()).unwrap();
    let mut task = DownloadTask::new(
        "notes.txt",
        vec![format!("{}/gone/", server.uri()), format!("{}/flaky/", server.uri())],
        target.clone(),
    );

    let err = transfer.try_download(&mut task, &NoProgress).await.unwrap_err();
    assert!(matches!(err, ModError::AllMirrorsFailed(_)));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "installed copy");
    assert!(part_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_not_modified_keeps_existing_file() {
    let server = MockServer::start().await;
    Mock::given(path("/files/notes.txt"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("notes.txt");
    std::fs::write(&target, "installed copy").unwrap();

    let transfer = Transfer::new(&test_config()).unwrap();
    let mut task = DownloadTask::new(
        "notes.txt",
        vec![format!("{}/files/", server.uri())],
        target.clone(),
    );

    let result = transfer.try_download(&mut task, &NoProgress).await.unwrap();
    assert!(result.is_not_modified());
    assert_eq!(result.ok(), None);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "installed copy");
    assert!(part_files(tmp.path()).is_empty());
}

/// Serves one chunked response with no `Content-Length` on a raw socket.
async fn serve_chunked_once(body: Vec<u8>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for chunk in body.chunks(16 * 1024) {
            response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            response.extend_from_slice(chunk);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{}/big.bin", addr)
}

#[tokio::test]
async fn test_download_without_content_length() {
    let body: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();
    let url = serve_chunked_once(body.clone()).await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("big.bin");
    let progress = common::RecordingProgress::default();

    let transfer = Transfer::new(&test_config()).unwrap();
    let len = transfer.download(&url, &target, &progress).await.unwrap();

    assert_eq!(len, Fetched::Ok(body.len() as u64));
    assert_eq!(std::fs::read(&target).unwrap(), body);

    // Against the assumed 1 TiB size the intermediate updates stay at 0%.
    let events = progress.events.lock().clone();
    let updates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            common::Event::Update(fraction, label) => Some((*fraction, label.clone())),
            _ => None,
        })
        .collect();
    assert!(updates.len() > 1);
    assert!(updates[..updates.len() - 1]
        .iter()
        .all(|(fraction, label)| *fraction < 0.01 && label == "big.bin: 0%"));
    assert_eq!(updates.last().unwrap(), &(1.0, "big.bin: 100%".to_string()));
}
