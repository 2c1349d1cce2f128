//! Turn-path integration: endpointing decisions feeding the outbound
//! framing contract, without any provider network traffic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use outdial_core::audio::{FRAME_PAD_BOUNDARY, OUTBOUND_FRAME_BYTES};
use outdial_pipeline::stt::pool::{ConnectionPool, PoolConfig, PoolError};
use outdial_pipeline::{Endpointer, FrameRechunker};

#[test]
fn full_turn_framing_contract() {
    // A reply synthesized as three sentences of odd-sized provider chunks
    let mut rechunker = FrameRechunker::new();
    let mut frames = Vec::new();

    for sentence_pcm in [vec![1u8; 4700], vec![2u8; 900], vec![3u8; 6100]] {
        frames.extend(rechunker.push(&sentence_pcm));
    }
    frames.extend(rechunker.flush());

    // Sequence numbers strictly increasing
    for pair in frames.windows(2) {
        assert!(pair[1].sequence > pair[0].sequence);
    }

    // Every payload is a multiple of the padding boundary; all but the
    // flushed tail are full gateway frames
    let (tail, body) = frames.split_last().unwrap();
    for frame in body {
        assert_eq!(frame.pcm.len(), OUTBOUND_FRAME_BYTES);
    }
    assert_eq!(tail.pcm.len() % FRAME_PAD_BOUNDARY, 0);

    // Total audio is preserved modulo zero padding
    let total: usize = frames.iter().map(|f| f.pcm.len()).sum();
    assert!(total >= 4700 + 900 + 6100);
    assert!(total - (4700 + 900 + 6100) < FRAME_PAD_BOUNDARY);
}

#[test]
fn endpointer_event_and_debounce_race() {
    let base = Instant::now();
    let mut ep = Endpointer::new(
        Duration::from_millis(1000),
        Duration::from_millis(8000),
        Duration::from_millis(150),
    );

    // Fragment lands; provider utterance-end wins the race
    ep.on_final_fragment(base);
    assert!(ep.on_utterance_end().is_some());

    // Same state, no provider event: debounce path fires at 1s
    assert!(ep.poll(base + Duration::from_millis(999)).is_none());
    assert!(ep.poll(base + Duration::from_millis(1000)).is_some());
}

#[tokio::test]
async fn pool_serves_concurrent_sessions_within_cap() {
    let pool = Arc::new(ConnectionPool::<u32>::new(PoolConfig {
        max_connections: 4,
        max_queued: 50,
        acquire_timeout: Duration::from_secs(5),
    }));

    // 12 concurrent callers over a pool of 4, each releasing after work
    let mut tasks = Vec::new();
    for i in 0..12u32 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            let client_id = format!("call-{}", i);
            let conn = pool
                .acquire_with(&client_id, || async move { Ok::<_, String>(i) })
                .await?;
            assert_eq!(*conn, i);
            tokio::time::sleep(Duration::from_millis(20)).await;
            pool.release(&client_id);
            Ok::<(), PoolError>(())
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.total_acquired, 12);
    assert_eq!(snapshot.total_released, 12);
    assert_eq!(snapshot.total_timeout, 0);
}
