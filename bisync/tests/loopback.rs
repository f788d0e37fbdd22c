//! End-to-end exchanges between two full link stacks joined by an
//! in-memory duplex stream.

use std::time::Duration;

use bisync::{Bisync, LinkOptions};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(30);

struct End {
    link: Bisync,
    reads: mpsc::UnboundedReceiver<Vec<u8>>,
    errors: mpsc::UnboundedReceiver<i32>,
}

impl End {
    async fn next_read(&mut self) -> Vec<u8> {
        timeout(WAIT, self.reads.recv())
            .await
            .expect("no payload delivered")
            .expect("link gone")
    }

    fn no_errors(&mut self) {
        assert!(self.errors.try_recv().is_err(), "unexpected protocol error");
    }
}

async fn pair() -> (End, End) {
    let (near, far) = tokio::io::duplex(256);
    let mut ends = Vec::new();
    for stream in [near, far] {
        let link = Bisync::attach(stream, LinkOptions::default());
        let (read_tx, reads) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        link.on_read(move |payload| {
            let _ = read_tx.send(payload);
        })
        .await
        .expect("link alive");
        link.on_error(move |error| {
            let _ = error_tx.send(error.code());
        })
        .await
        .expect("link alive");
        ends.push(End {
            link,
            reads,
            errors,
        });
    }
    let second = ends.pop().expect("two ends");
    let first = ends.pop().expect("two ends");
    (first, second)
}

#[tokio::test(start_paused = true)]
async fn single_message_crosses_the_link() {
    let (left, mut right) = pair().await;

    left.link.write("HELLO").await.expect("link alive");
    assert_eq!(right.next_read().await, b"HELLO");

    right.no_errors();
}

#[tokio::test(start_paused = true)]
async fn batch_arrives_in_order() {
    let (left, mut right) = pair().await;

    left.link
        .write_many(["ONE", "TWO", "THREE"])
        .await
        .expect("link alive");

    assert_eq!(right.next_read().await, b"ONE");
    assert_eq!(right.next_read().await, b"TWO");
    assert_eq!(right.next_read().await, b"THREE");

    right.no_errors();
}

#[tokio::test(start_paused = true)]
async fn payloads_with_whitespace_stay_whole() {
    let (left, mut right) = pair().await;

    left.link
        .write("multi word payload")
        .await
        .expect("link alive");
    assert_eq!(right.next_read().await, b"multi word payload");
}

#[tokio::test(start_paused = true)]
async fn both_directions_take_turns() {
    let (mut left, mut right) = pair().await;

    left.link.write("PING").await.expect("link alive");
    assert_eq!(right.next_read().await, b"PING");

    right.link.write("PONG").await.expect("link alive");
    assert_eq!(left.next_read().await, b"PONG");

    left.no_errors();
    right.no_errors();
}

#[tokio::test(start_paused = true)]
async fn closed_link_rejects_writes() {
    let (mut left, _right) = pair().await;

    left.link.close();
    // Abort lands asynchronously; once the engine task is gone, writes
    // surface the closed link.
    let mut rejected = false;
    for _ in 0..100 {
        tokio::task::yield_now().await;
        if left.link.write("LATE").await.is_err() {
            rejected = true;
            break;
        }
    }
    assert!(rejected, "writes kept succeeding after close");
}
