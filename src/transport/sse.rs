//! Server-sent events framing
//!
//! Turns a hub subscription into a stream of frames with a per-stream id
//! starting at 1. Detecting a disconnected client is left to the HTTP layer;
//! dropping the stream ends the hub subscription and stops delivery, never
//! the scan.

use std::fmt;

use futures::stream::{self, Stream};

use crate::notifications::api::{Progress, ProgressSubscriber};

pub const PROGRESS_EVENT: &str = "progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub id: u64,
    pub event: &'static str,
    pub data: String,
}

impl SseFrame {
    pub fn progress(id: u64, progress: &Progress) -> serde_json::Result<Self> {
        Ok(Self {
            id,
            event: PROGRESS_EVENT,
            data: serde_json::to_string(progress)?,
        })
    }
}

impl fmt::Display for SseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {}\nevent: {}\ndata: {}\n\n", self.id, self.event, self.data)
    }
}

/// Frames for every snapshot the subscription yields, ending with it
pub fn progress_events(subscriber: ProgressSubscriber) -> impl Stream<Item = SseFrame> {
    stream::unfold((subscriber, 0u64), |(subscriber, last_id)| async move {
        loop {
            let progress = subscriber.recv().await?;
            match SseFrame::progress(last_id + 1, &progress) {
                Ok(frame) => return Some((frame, (subscriber, last_id + 1))),
                Err(e) => log::warn!(
                    "Dropping progress for scan {} on '{}': {}",
                    progress.scan_id,
                    subscriber.key(),
                    e
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::api::ProgressHub;
    use crate::scanner::types::ScanId;
    use futures::StreamExt;

    fn progress(processed: u64) -> Progress {
        Progress {
            source_key: "client-a".to_string(),
            processed_count: processed,
            active_count: 1,
            completion_pct: 50.0,
            elapsed_seconds: 3,
            eta_seconds: 3,
            scan_id: ScanId(7),
        }
    }

    #[test]
    fn test_frame_rendering() {
        let frame = SseFrame::progress(1, &progress(6)).unwrap();
        let rendered = frame.to_string();
        assert!(rendered.starts_with("id: 1\nevent: progress\ndata: {"));
        assert!(rendered.ends_with("}\n\n"));

        let data: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(data["client_key"], "client-a");
        assert_eq!(data["processed_count"], 6);
        assert_eq!(data["scan_id"], 7);
    }

    #[tokio::test]
    async fn test_ids_increase_and_stream_ends_with_subscription() {
        let hub = ProgressHub::default();
        let subscriber = hub.get_subscriber("client-a").unwrap();
        let publisher = hub.get_publisher("client-a").unwrap();
        for n in 1..=3 {
            publisher.send(progress(n)).await.unwrap();
        }
        drop(publisher);

        let frames: Vec<SseFrame> = progress_events(subscriber).collect().await;
        let ids: Vec<u64> = frames.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(frames.iter().all(|f| f.event == PROGRESS_EVENT));
    }

    #[tokio::test]
    async fn test_dropping_stream_ends_subscription() {
        let hub = ProgressHub::default();
        let mut frames = Box::pin(progress_events(hub.get_subscriber("client-a").unwrap()));
        assert_eq!(hub.subscriber_count().unwrap(), 1);

        let publisher = hub.get_publisher("client-a").unwrap();
        publisher.send(progress(1)).await.unwrap();
        assert_eq!(frames.next().await.map(|f| f.id), Some(1));

        drop(frames);
        assert_eq!(hub.subscriber_count().unwrap(), 0);
        // Publishing continues without anyone listening
        for n in 2..40 {
            tokio::time::timeout(std::time::Duration::from_secs(1), publisher.send(progress(n)))
                .await
                .expect("publisher blocked after the client went away")
                .unwrap();
        }
    }
}
