pub mod decoder;

use bytes::Bytes;
use chrono::Utc;
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::sync::Arc;

use self::decoder::{ DecodedLine, LineDecoder };
use crate::error::RelayError;
use crate::llm::ChatClient;
use crate::models::relay::{ GenerationRequest, RelayEvent };

/// Turns raw upstream chunks into relay events.
///
/// The returned stream is lazy: a chunk is only pulled from `chunks` when the
/// consumer asks for the next event, so a slow client slows the upstream read
/// and dropping the stream drops the upstream body. It yields fragments in
/// decode order followed by exactly one terminal event, then ends.
pub fn relay_chunks<S>(chunks: S) -> impl Stream<Item = RelayEvent> + Send + 'static
    where S: Stream<Item = Result<Bytes, RelayError>> + Send + 'static
{
    async_stream::stream! {
        let mut chunks = std::pin::pin!(chunks);
        let mut decoder = LineDecoder::new();
        let mut forwarded = 0usize;
        let mut dropped = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Upstream stream failed after {} fragment(s): {}", forwarded, e);
                    yield RelayEvent::Error(e.to_string());
                    return;
                }
            };
            debug!("Received {} byte chunk", chunk.len());

            for decoded in decoder.push(&chunk) {
                match decoded {
                    Ok(DecodedLine::Fragment(text)) => {
                        forwarded += 1;
                        yield RelayEvent::Fragment(text);
                    }
                    Ok(DecodedLine::UpstreamError(message)) => {
                        error!("Model server reported an error: {}", message);
                        yield RelayEvent::Error(message);
                        return;
                    }
                    Err(e) => {
                        dropped += 1;
                        warn!("Skipping unparsable line: {}", e);
                    }
                }
            }
        }

        let discarded = decoder.finish();
        if discarded > 0 {
            warn!("Discarding {} byte(s) of unterminated trailing data", discarded);
        }
        info!("Relay finished: {} fragment(s) forwarded, {} line(s) dropped", forwarded, dropped);
        yield RelayEvent::Done;
    }
}

/// Opens the upstream generation for `request` and relays it.
/// Failing to open the upstream call also ends in a single `Error` event.
pub fn open_relay(
    client: Arc<dyn ChatClient>,
    request: Arc<GenerationRequest>
) -> impl Stream<Item = RelayEvent> + Send + 'static {
    async_stream::stream! {
        let waited = Utc::now().signed_duration_since(request.submitted_at);
        info!(
            "Streaming model '{}' from {} (submitted {} ms ago)",
            request.model,
            client.get_base_url(),
            waited.num_milliseconds()
        );

        let chunks = match client.stream_chunks(&request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Could not start generation: {}", e);
                yield RelayEvent::Error(e.to_string());
                return;
            }
        };

        let mut events = std::pin::pin!(relay_chunks(chunks));
        while let Some(event) = events.next().await {
            yield event;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };

    fn chunks(parts: Vec<Result<&'static str, &'static str>>) -> impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static {
        stream::iter(
            parts
                .into_iter()
                .map(|p| p.map(|s| Bytes::from_static(s.as_bytes())).map_err(|e| RelayError::Upstream(e.into())))
                .collect::<Vec<_>>()
        )
    }

    async fn collect(parts: Vec<Result<&'static str, &'static str>>) -> Vec<RelayEvent> {
        relay_chunks(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn lines_split_across_three_chunks() {
        let events = collect(vec![
            Ok("{\"response\":"),
            Ok("\"He\"}\n{\"resp"),
            Ok("onse\":\"llo\"}\n"),
        ]).await;

        assert_eq!(events, vec![
            RelayEvent::Fragment("He".into()),
            RelayEvent::Fragment("llo".into()),
            RelayEvent::Done,
        ]);
    }

    #[tokio::test]
    async fn empty_upstream_is_just_done() {
        assert_eq!(collect(vec![]).await, vec![RelayEvent::Done]);
    }

    #[tokio::test]
    async fn malformed_line_does_not_end_the_session() {
        let events = collect(vec![Ok("{\"response\":\"a\"}\ngarbage\n{\"response\":\"b\"}\n")]).await;
        assert_eq!(events, vec![
            RelayEvent::Fragment("a".into()),
            RelayEvent::Fragment("b".into()),
            RelayEvent::Done,
        ]);
    }

    #[tokio::test]
    async fn transport_error_keeps_earlier_fragments_and_stops() {
        let events = collect(vec![
            Ok("{\"response\":\"He\"}\n"),
            Err("connection reset"),
            Ok("{\"response\":\"never\"}\n"),
        ]).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RelayEvent::Fragment("He".into()));
        assert!(matches!(&events[1], RelayEvent::Error(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn upstream_error_record_terminates() {
        let events = collect(vec![
            Ok("{\"response\":\"a\"}\n{\"error\":\"out of memory\"}\n{\"response\":\"b\"}\n"),
        ]).await;

        assert_eq!(events, vec![
            RelayEvent::Fragment("a".into()),
            RelayEvent::Error("out of memory".into()),
        ]);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_the_relay_stops_pulling_and_releases_upstream() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));

        let guard = DropFlag(Arc::clone(&released));
        let counter = Arc::clone(&pulled);
        let upstream = stream::iter(0..1000).map(move |_| {
            let _held = &guard;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RelayError>(Bytes::from_static(b"{\"response\":\"x\"}\n"))
        });

        let mut events = Box::pin(relay_chunks(upstream));
        assert_eq!(events.next().await, Some(RelayEvent::Fragment("x".into())));
        assert!(pulled.load(Ordering::SeqCst) <= 1);
        assert!(!released.load(Ordering::SeqCst));

        drop(events);
        assert!(released.load(Ordering::SeqCst));
        assert!(pulled.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn exactly_one_terminal_event_at_the_end() {
        let scenarios = vec![
            vec![Ok("{\"response\":\"a\"}\n")],
            vec![Ok("{\"response\":\"a\"}\n"), Err("boom")],
            vec![Err("boom")],
            vec![Ok("{\"response\":\"a\"}")],
        ];
        for parts in scenarios {
            let events = collect(parts).await;
            let terminals = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1);
            assert!(events.last().unwrap().is_terminal());
        }
    }
}
