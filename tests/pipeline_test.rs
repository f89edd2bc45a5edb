use futures::FutureExt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use voxbridge::config::TranscriptionOrder;
use voxbridge::error::log_errors;
use voxbridge::listener::{Listener, TextCallback, CAPTURE_WINDOW, STOP_WAIT};

mod common;
use common::mock_asr::{MockRecognizer, Reply};
use common::mock_audio::{MockAudio, Step};
use common::{collecting_errors, wait_for};

fn collector() -> (TextCallback, Arc<Mutex<Vec<String>>>) {
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heard);
    let callback: TextCallback = Arc::new(move |text: String| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(text);
        }
        .boxed()
    });
    (callback, heard)
}

#[tokio::test]
async fn test_listen_once_transcribes() {
    let listener = Listener::new(
        Arc::new(MockAudio::with_tags(&[7])),
        Arc::new(MockRecognizer::new().phrase(7, "open the pod bay doors")),
        TranscriptionOrder::Concurrent,
        log_errors(),
    )
    .unwrap();

    let text = listener.listen_once(Duration::from_millis(200)).await;
    assert_eq!(text.as_deref(), Some("open the pod bay doors"));
}

#[tokio::test]
async fn test_listen_once_silence_and_gibberish() {
    let listener = Listener::new(
        Arc::new(MockAudio::new(vec![
            Step::Silence,
            Step::Segment(common::mock_audio::tagged_segment(3)),
        ])),
        Arc::new(MockRecognizer::new().reply(3, Reply::Unintelligible)),
        TranscriptionOrder::Concurrent,
        log_errors(),
    )
    .unwrap();

    assert_eq!(listener.listen_once(Duration::from_millis(50)).await, None);
    assert_eq!(listener.listen_once(Duration::from_millis(50)).await, None);
}

#[tokio::test]
async fn test_service_error_goes_to_callback() {
    let (on_error, errors) = collecting_errors();
    let listener = Listener::new(
        Arc::new(MockAudio::with_tags(&[1])),
        Arc::new(MockRecognizer::new().reply(1, Reply::ServiceDown)),
        TranscriptionOrder::Concurrent,
        on_error,
    )
    .unwrap();

    assert_eq!(listener.listen_once(Duration::from_millis(50)).await, None);
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("mock service unavailable"));
}

#[tokio::test]
async fn test_capture_errors_do_not_stop_loop() {
    let (on_error, errors) = collecting_errors();
    let audio = Arc::new(MockAudio::new(vec![
        Step::Fail("device unplugged".into()),
        Step::Segment(common::mock_audio::tagged_segment(1)),
    ]));
    let listener = Listener::new(
        audio,
        Arc::new(MockRecognizer::new().phrase(1, "still here")),
        TranscriptionOrder::Concurrent,
        on_error,
    )
    .unwrap();

    let (callback, heard) = collector();
    assert!(listener.start_continuous(callback).unwrap());
    let got = wait_for(|| !heard.lock().unwrap().is_empty(), Duration::from_secs(3)).await;
    listener.stop_continuous();

    assert!(got);
    assert!(errors.lock().unwrap()[0].contains("device unplugged"));
}

#[tokio::test]
async fn test_continuous_start_stop() {
    let audio = Arc::new(MockAudio::with_tags(&[1, 2]));
    let recognizer = MockRecognizer::new().phrase(1, "one").phrase(2, "two");
    let listener = Listener::new(
        Arc::clone(&audio) as Arc<dyn voxbridge::audio::AudioSource>,
        Arc::new(recognizer),
        TranscriptionOrder::Concurrent,
        log_errors(),
    )
    .unwrap();

    let (callback, heard) = collector();
    assert!(listener.start_continuous(Arc::clone(&callback)).unwrap());
    assert!(!listener.start_continuous(callback).unwrap());
    assert!(listener.is_listening());

    let got = wait_for(|| heard.lock().unwrap().len() == 2, Duration::from_secs(3)).await;
    assert!(got);

    assert!(listener.stop_continuous());
    assert!(!listener.is_listening());
    assert!(!listener.stop_continuous());

    let mut words = heard.lock().unwrap().clone();
    words.sort();
    assert_eq!(words, vec!["one", "two"]);

    // Capture stays stopped
    let captures = audio.captures.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(audio.captures.load(Ordering::SeqCst), captures);
}

#[tokio::test]
async fn test_sequential_order_is_preserved() {
    let recognizer = MockRecognizer::new()
        .slow_phrase(1, "first", Duration::from_millis(300))
        .slow_phrase(2, "second", Duration::from_millis(10))
        .phrase(3, "third");
    let listener = Listener::new(
        Arc::new(MockAudio::with_tags(&[1, 2, 3])),
        Arc::new(recognizer),
        TranscriptionOrder::Sequential,
        log_errors(),
    )
    .unwrap();

    let (callback, heard) = collector();
    listener.start_continuous(callback).unwrap();
    let got = wait_for(|| heard.lock().unwrap().len() == 3, Duration::from_secs(3)).await;
    listener.stop_continuous();

    assert!(got);
    assert_eq!(*heard.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_concurrent_order_follows_completion() {
    let recognizer = Arc::new(
        MockRecognizer::new()
            .slow_phrase(1, "slow", Duration::from_millis(400))
            .phrase(2, "fast"),
    );
    let listener = Listener::new(
        Arc::new(MockAudio::with_tags(&[1, 2])),
        Arc::clone(&recognizer) as Arc<dyn voxbridge::asr::Recognizer>,
        TranscriptionOrder::Concurrent,
        log_errors(),
    )
    .unwrap();

    let (callback, heard) = collector();
    listener.start_continuous(callback).unwrap();
    let got = wait_for(|| heard.lock().unwrap().len() == 2, Duration::from_secs(3)).await;
    listener.stop_continuous();

    assert!(got);
    assert_eq!(*heard.lock().unwrap(), vec!["fast", "slow"]);
    assert_eq!(recognizer.finished(), vec![2, 1]);
}

#[tokio::test]
async fn test_stop_cuts_phrase_short() {
    let audio = Arc::new(MockAudio::new(vec![Step::LongPhrase(
        1,
        Duration::from_secs(8),
    )]));
    let listener = Listener::new(
        Arc::clone(&audio) as Arc<dyn voxbridge::audio::AudioSource>,
        Arc::new(MockRecognizer::new().phrase(1, "too late")),
        TranscriptionOrder::Concurrent,
        log_errors(),
    )
    .unwrap();

    let (callback, heard) = collector();
    listener.start_continuous(callback).unwrap();
    assert!(wait_for(|| audio.active.load(Ordering::SeqCst) == 1, Duration::from_secs(1)).await);

    let started = Instant::now();
    assert!(listener.stop_continuous_async().await);
    assert!(started.elapsed() < CAPTURE_WINDOW);
    assert_eq!(audio.active.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(heard.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_after_stuck_capture() {
    let stuck = STOP_WAIT + Duration::from_millis(500);
    let audio = Arc::new(MockAudio::new(vec![
        Step::Stuck(1, stuck),
        Step::Segment(common::mock_audio::tagged_segment(2)),
    ]));
    let listener = Listener::new(
        Arc::clone(&audio) as Arc<dyn voxbridge::audio::AudioSource>,
        Arc::new(MockRecognizer::new().phrase(1, "stale").phrase(2, "fresh")),
        TranscriptionOrder::Sequential,
        log_errors(),
    )
    .unwrap();

    let (first, heard_before) = collector();
    listener.start_continuous(first).unwrap();
    assert!(wait_for(|| audio.active.load(Ordering::SeqCst) == 1, Duration::from_secs(1)).await);

    // The stuck read outlives the bounded join, so the old thread is detached
    let started = Instant::now();
    assert!(listener.stop_continuous_async().await);
    assert!(started.elapsed() >= STOP_WAIT);
    assert!(!listener.is_listening());

    let (second, heard_after) = collector();
    assert!(listener.start_continuous(second).unwrap());
    let got = wait_for(
        || !heard_after.lock().unwrap().is_empty(),
        Duration::from_secs(3),
    )
    .await;
    listener.stop_continuous_async().await;

    assert!(got);
    assert_eq!(*heard_after.lock().unwrap(), vec!["fresh"]);
    assert!(heard_before.lock().unwrap().is_empty());
    assert_eq!(audio.max_active.load(Ordering::SeqCst), 1);
}

#[test]
fn test_listener_requires_runtime() {
    let result = Listener::new(
        Arc::new(MockAudio::silent()),
        Arc::new(MockRecognizer::new()),
        TranscriptionOrder::Concurrent,
        log_errors(),
    );
    assert!(result.is_err());
}
