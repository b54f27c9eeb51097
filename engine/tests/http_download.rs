use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use engine::{
    compute_file_checksum, DownloadConfig, DownloadController, DownloadEvent, DownloadTarget,
    ErrorKind, HttpSource, SessionReport, SessionState, TransferOutcome,
};

const TEST_SIZE: usize = 64 * 1024 + 123;

/// Accept one connection, capture the request head, write `response`.
fn serve_once(response: Vec<u8>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Test server has an address");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Client should connect");
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).expect("Failed to read request") == 0 {
                break;
            }
            head.push(byte[0]);
        }
        stream.write_all(&response).expect("Failed to write response");
        stream.flush().expect("Failed to flush response");
        String::from_utf8_lossy(&head).to_string()
    });
    (addr, handle)
}

fn body() -> Vec<u8> {
    (0..TEST_SIZE).map(|i| (i % 256) as u8).collect()
}

fn controller(config: DownloadConfig) -> DownloadController {
    let client = reqwest::blocking::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to build HTTP client");
    let source = HttpSource::with_client(client, &config);
    DownloadController::new(Arc::new(source), config).expect("Config should be valid")
}

fn wait_for_report(events: &Receiver<DownloadEvent>) -> (Vec<DownloadEvent>, SessionReport) {
    let mut seen = Vec::new();
    loop {
        match events.recv_timeout(Duration::from_secs(30)) {
            Ok(DownloadEvent::Finished(report)) => return (seen, report),
            Ok(event) => seen.push(event),
            Err(e) => panic!("no session report: {}", e),
        }
    }
}

#[test]
fn test_http_download_with_content_length() {
    let data = body();
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        data.len()
    )
    .into_bytes();
    response.extend_from_slice(&data);
    let (addr, server) = serve_once(response);

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = DownloadConfig {
        install_dir: temp_dir.path().join("TargetGame"),
        ..DownloadConfig::default()
    };
    let target = DownloadTarget::new(
        format!("http://{}/owner/repo/releases/download/v2.0/game.exe", addr),
        &config.install_dir,
        "game.exe",
    );
    let controller = controller(config);

    let events = controller.subscribe();
    controller.start(target.clone()).expect("Idle controller accepts start");
    let (seen, report) = wait_for_report(&events);

    match &report.outcome {
        TransferOutcome::Success {
            final_size_bytes,
            checksum,
        } => {
            assert_eq!(*final_size_bytes, TEST_SIZE as u64);
            let again = compute_file_checksum(&target.destination_path, checksum.algorithm())
                .expect("Failed to rehash download");
            assert_eq!(&again, checksum);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(std::fs::read(&target.destination_path).expect("Failed to read download"), data);

    let last_progress = seen
        .iter()
        .rev()
        .find_map(|e| match e {
            DownloadEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .expect("At least one progress event");
    assert_eq!(last_progress.total_bytes, TEST_SIZE as u64);
    assert_eq!(last_progress.fraction_complete, 100.0);

    let request = server.join().expect("Server thread panicked").to_lowercase();
    assert!(request.starts_with("get /owner/repo/releases/download/v2.0/game.exe"));
    assert!(request.contains("user-agent: game-downloader"));
    assert!(request.contains("accept: application/octet-stream"));

    assert_eq!(controller.acknowledge(), Ok(SessionState::Completed));
}

#[test]
fn test_http_download_without_content_length() {
    let data = body();
    let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
    response.extend_from_slice(&data);
    let (addr, server) = serve_once(response);

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let target = DownloadTarget::new(format!("http://{}/game.exe", addr), temp_dir.path(), "game.exe");
    let controller = controller(DownloadConfig::default());

    let events = controller.subscribe();
    controller.start(target.clone()).expect("Idle controller accepts start");
    let (seen, report) = wait_for_report(&events);
    server.join().expect("Server thread panicked");

    assert!(report.outcome.is_success());
    let on_disk = std::fs::metadata(&target.destination_path).expect("Download should exist");
    assert_eq!(on_disk.len(), TEST_SIZE as u64);
    for event in seen {
        if let DownloadEvent::Progress { progress, .. } = event {
            assert_eq!(progress.total_bytes, 0);
            assert_eq!(progress.fraction_complete, 0.0);
        }
    }
}

#[test]
fn test_http_not_found() {
    let response = b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found".to_vec();
    let (addr, server) = serve_once(response);

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let target = DownloadTarget::new(
        format!("http://{}/missing.exe", addr),
        temp_dir.path().join("TargetGame"),
        "missing.exe",
    );
    let controller = controller(DownloadConfig::default());

    let events = controller.subscribe();
    controller.start(target.clone()).expect("Idle controller accepts start");
    let (_, report) = wait_for_report(&events);
    server.join().expect("Server thread panicked");

    assert_eq!(report.outcome.failure_kind(), Some(ErrorKind::RemoteError));
    match &report.outcome {
        TransferOutcome::Failure { message, .. } => assert!(message.contains("404")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!target.destination_path.exists());
    assert_eq!(controller.acknowledge(), Ok(SessionState::Failed));
    assert_eq!(controller.state(), SessionState::Idle);
}

#[test]
fn test_http_connection_refused() {
    // Bind and drop to get a port nobody is listening on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("Failed to reserve a port");

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let target = DownloadTarget::new(format!("http://{}/game.exe", addr), temp_dir.path(), "game.exe");
    let controller = controller(DownloadConfig::default());

    let events = controller.subscribe();
    controller.start(target.clone()).expect("Idle controller accepts start");
    let (_, report) = wait_for_report(&events);

    assert_eq!(report.outcome.failure_kind(), Some(ErrorKind::RemoteError));
    assert!(!target.destination_path.exists());
}
