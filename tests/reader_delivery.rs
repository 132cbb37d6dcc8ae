mod support;

use std::time::{Duration, Instant};

use fablock_statustool::{BroadcastSink, DoorCommand, MotorState, ReaderOptions, StatusEvent};
use support::*;

#[tokio::test]
async fn lines_are_delivered_in_order() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    let seen = collecting_sink(&manager);
    manager.connect(test_config()).await.unwrap();

    // Chunk boundaries deliberately fall inside telegrams
    device.push(b"DOOR=1102\r\nAWA");
    device.push(b"KE=1\r\n\r\nPIN=12");
    device.push(b"34\r\nSENSE=708\r\nOK.\r\n");

    let stats = wait_for_stats(&manager, |s| s.lines_read == 6).await;
    assert_eq!(stats.empty_lines, 1);
    assert_eq!(stats.events_delivered, 5);

    let expected = vec![
        StatusEvent::Door {
            locked: true,
            closed: true,
            motor_state: MotorState::Stopped,
            motor_action_ok: false,
        },
        StatusEvent::Awake { running: true },
        StatusEvent::Pin { code: "1234".into() },
        StatusEvent::Sense { raw_value: "708".into() },
        StatusEvent::Ack,
    ];
    assert_eq!(*seen.lock().unwrap(), expected);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn many_lines_keep_their_order() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    let seen = collecting_sink(&manager);
    manager.connect(test_config()).await.unwrap();

    let n = 200;
    let mut stream = Vec::new();
    for i in 0..n {
        stream.extend_from_slice(format!("PIN={}\r\n", i).as_bytes());
    }
    // Larger than one read buffer, so lines span reads
    for chunk in stream.chunks(700) {
        device.push(chunk);
    }

    wait_for_stats(&manager, |s| s.events_delivered == n as u64).await;
    let codes: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| match e {
            StatusEvent::Pin { code } => code.clone(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    let expected: Vec<String> = (0..n).map(|i| i.to_string()).collect();
    assert_eq!(codes, expected);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn unrecognized_lines_are_counted_not_forwarded() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    let seen = collecting_sink(&manager);
    manager.connect(test_config()).await.unwrap();

    device.push(b"boot v1.2\r\nFOO=1\r\nDOOR=12\r\nAWAKE=0\r\n");
    let stats = wait_for_stats(&manager, |s| s.lines_read == 4).await;
    assert_eq!(stats.unrecognized_lines, 2);
    assert_eq!(stats.malformed_lines, 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(matches!(&seen[0], StatusEvent::Malformed { original, .. } if original == "DOOR=12"));
    assert_eq!(seen[1], StatusEvent::Awake { running: false });
    drop(seen);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn acks_can_be_suppressed_by_the_host() {
    let options = ReaderOptions { suppress_ack: true, ..Default::default() };
    let (manager, _connector, device) = fake_manager(options);
    let seen = collecting_sink(&manager);
    manager.connect(test_config()).await.unwrap();

    device.push(b"OK.\r\nAWAKE=1\r\nOK.\r\n");
    let stats = wait_for_stats(&manager, |s| s.lines_read == 3).await;
    assert_eq!(stats.acks_suppressed, 2);
    assert_eq!(*seen.lock().unwrap(), vec![StatusEvent::Awake { running: true }]);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn events_before_sink_are_dropped() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    manager.connect(test_config()).await.unwrap();

    device.push(b"AWAKE=1\r\n");
    let stats = wait_for_stats(&manager, |s| s.lines_read == 1).await;
    assert_eq!(stats.events_dropped_no_sink, 1);

    let seen = collecting_sink(&manager);
    device.push(b"AWAKE=0\r\n");
    wait_for_stats(&manager, |s| s.events_delivered == 1).await;
    assert_eq!(*seen.lock().unwrap(), vec![StatusEvent::Awake { running: false }]);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn oversized_garbage_is_discarded() {
    let options = ReaderOptions { max_line_len: 64, ..Default::default() };
    let (manager, _connector, device) = fake_manager(options);
    let seen = collecting_sink(&manager);
    manager.connect(test_config()).await.unwrap();

    // The garbage ends in something that looks like a telegram
    device.push(&[b'x'; 100]);
    device.push(b"AWAKE=1\r\nSENSE=12\r\n");
    let stats = wait_for_stats(&manager, |s| s.lines_read == 1).await;
    assert_eq!(stats.partial_buffer_trims, 1);
    assert_eq!(stats.events_delivered, 1);
    assert_eq!(*seen.lock().unwrap(), vec![StatusEvent::Sense { raw_value: "12".into() }]);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn broadcast_sink_fans_out() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    let sink = BroadcastSink::new(16);
    let mut first = sink.subscribe();
    let mut second = sink.subscribe();
    manager.set_sink(sink);
    manager.connect(test_config()).await.unwrap();

    device.push(b"SENSE=708\r\n");
    let expected = StatusEvent::Sense { raw_value: "708".into() };
    let got = tokio::time::timeout(Duration::from_secs(2), first.recv()).await.unwrap().unwrap();
    assert_eq!(got, expected);
    assert_eq!(second.recv().await.unwrap(), expected);

    manager.disconnect().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_is_not_starved_by_a_busy_slow_reader() {
    let (manager, _connector, device) = fake_manager(ReaderOptions::default());
    let seen = collecting_sink(&manager);
    device.set_read_delay(Duration::from_millis(10));
    for i in 0..60 {
        device.push(format!("SENSE={}\r\n", i).as_bytes());
    }
    manager.connect(test_config()).await.unwrap();
    wait_for_stats(&manager, |s| s.events_delivered >= 5).await;

    let started = Instant::now();
    for _ in 0..5 {
        tokio::time::timeout(
            Duration::from_secs(1),
            manager.send_door_command(DoorCommand::Open),
        )
        .await
        .expect("send finished in time")
        .expect("send succeeded");
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(device.written(), b"!D1\r".repeat(5));

    // Reading went on while commands were written, and stayed in order
    let stats = wait_for_stats(&manager, |s| s.events_delivered == 60).await;
    assert_eq!(stats.events_delivered, 60);
    let seen = seen.lock().unwrap().clone();
    for (i, event) in seen.iter().enumerate() {
        assert_eq!(*event, StatusEvent::Sense { raw_value: i.to_string() });
    }

    manager.disconnect().await.unwrap();
}
