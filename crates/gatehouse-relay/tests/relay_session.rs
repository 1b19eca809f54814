//! Relay session tests against shell scripts standing in for the transcoder
//!
//! Run with: cargo test --package gatehouse-relay --test relay_session

#![cfg(unix)]

use bytes::Bytes;
use gatehouse_protocol::part_header;
use gatehouse_relay::{
    Outbound, RelayError, SessionEnd, StreamSession, capture,
};
use parking_lot::Mutex;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;

const FRAME_LOOP: &str = r"while true; do printf '\377\330frame\377\331'; sleep 0.05; done";

fn shell(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[derive(Default)]
struct Recorded {
    sections: Vec<Bytes>,
    finishes: Vec<Option<String>>,
}

/// Accepts a fixed number of sections, then behaves like a vanished client.
struct Recorder {
    accept: usize,
    state: Arc<Mutex<Recorded>>,
}

impl Recorder {
    fn new(accept: usize) -> (Self, Arc<Mutex<Recorded>>) {
        let state = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                accept,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Outbound for Recorder {
    async fn send(&mut self, section: Bytes) -> bool {
        let mut state = self.state.lock();
        if state.sections.len() >= self.accept {
            return false;
        }
        state.sections.push(section);
        true
    }

    async fn peer_gone(&self) {
        std::future::pending::<()>().await;
    }

    fn finish(self, error: Option<RelayError>) {
        self.state.lock().finishes.push(error.map(|e| e.to_string()));
    }
}

#[tokio::test]
async fn test_client_disconnect_stops_transcoder() {
    let session = StreamSession::spawn(shell(FRAME_LOOP), Duration::from_secs(3)).unwrap();
    let (recorder, state) = Recorder::new(3);

    let summary = tokio::time::timeout(Duration::from_secs(10), session.run(recorder))
        .await
        .expect("session should end");

    assert_eq!(summary.end, SessionEnd::ClientGone);
    assert_eq!(summary.sections, 3);
    assert!(!summary.forced_kill);

    let state = state.lock();
    assert_eq!(state.sections.len(), 3);
    assert_eq!(state.finishes, vec![None]);
}

#[tokio::test]
async fn test_sections_are_multipart_framed() {
    let session = StreamSession::spawn(shell(FRAME_LOOP), Duration::from_secs(3)).unwrap();
    let (recorder, state) = Recorder::new(1);

    session.run(recorder).await;

    let state = state.lock();
    let section = &state.sections[0];
    let header = part_header(9);
    assert!(section.starts_with(header.as_bytes()));
    assert_eq!(&section[header.len()..header.len() + 9], b"\xFF\xD8frame\xFF\xD9");
}

#[tokio::test]
async fn test_transcoder_ignoring_sigterm_is_killed() {
    let script = format!("trap '' TERM; {FRAME_LOOP}");
    let session = StreamSession::spawn(shell(&script), Duration::from_millis(300)).unwrap();
    let (recorder, state) = Recorder::new(2);

    let summary = tokio::time::timeout(Duration::from_secs(10), session.run(recorder))
        .await
        .expect("session should end");

    assert_eq!(summary.end, SessionEnd::ClientGone);
    assert!(summary.forced_kill);
    assert_eq!(state.lock().finishes.len(), 1);
}

#[tokio::test]
async fn test_dropped_receiver_ends_session() {
    let session = StreamSession::spawn(shell(FRAME_LOOP), Duration::from_secs(3)).unwrap();
    let (tx, mut rx) = mpsc::channel(1);

    let handle = tokio::spawn(session.run(tx));

    for _ in 0..2 {
        let section = rx.recv().await.unwrap().unwrap();
        assert!(section.starts_with(b"--frame\r\n"));
    }
    drop(rx);

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("session should end")
        .unwrap();
    assert_eq!(summary.end, SessionEnd::ClientGone);
    assert!(summary.sections >= 2);
}

#[rstest]
#[case::clean_exit(0, SessionEnd::Completed, None)]
#[case::failure_exit(3, SessionEnd::Failed, Some("Transcoder exited with code 3"))]
#[tokio::test]
async fn test_transcoder_exit(
    #[case] code: i32,
    #[case] expected_end: SessionEnd,
    #[case] expected_error: Option<&str>,
) {
    let script = format!(
        r"printf 'junk\377\330one\377\331\377\330two\377\331'; exit {code}"
    );
    let session = StreamSession::spawn(shell(&script), Duration::from_secs(3)).unwrap();
    let (recorder, state) = Recorder::new(usize::MAX);

    let summary = session.run(recorder).await;

    assert_eq!(summary.end, expected_end);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.sections, 2);
    assert!(!summary.forced_kill);

    let state = state.lock();
    assert_eq!(
        state.finishes,
        vec![expected_error.map(str::to_string)]
    );
}

#[tokio::test]
async fn test_capture_returns_first_frame() {
    let script = r"printf '\377\330snap\377\331'; sleep 5";
    let snapshot = capture(shell(script), Duration::from_secs(5)).await.unwrap();

    assert!(snapshot.success);
    assert_eq!(snapshot.size, 8);
    assert!(snapshot.image.starts_with("data:image/jpeg;base64,"));

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["size"], 8);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_capture_times_out() {
    let err = capture(shell("sleep 5"), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::SnapshotTimeout { .. }));
}

#[tokio::test]
async fn test_capture_without_frame() {
    let err = capture(shell("printf 'no jpeg here'"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NoFrame));
}
