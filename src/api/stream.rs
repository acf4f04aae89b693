use super::classify::classify_block;
use super::client::ByteStream;
use crate::error::ChatError;
use crate::types::StreamEvent;
use futures::StreamExt;
use std::collections::VecDeque;

const BLOCK_TERMINATOR: &[u8] = b"\n\n";

/// Splits an incrementally arriving byte stream into blank-line-terminated
/// blocks. Bytes are buffered undecoded so a multi-byte character split across
/// two reads is still decoded whole.
#[derive(Default)]
pub struct BlockDecoder {
    buffer: Vec<u8>,
}

impl BlockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every block completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut blocks = Vec::new();
        let mut start = 0;

        while let Some(offset) = find_terminator(&self.buffer[start..]) {
            let end = start + offset;
            blocks.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + BLOCK_TERMINATOR.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        blocks
    }

    /// Discards the unterminated remainder, returning it for diagnostics.
    pub fn flush(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_terminator(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(BLOCK_TERMINATOR.len())
        .position(|window| window == BLOCK_TERMINATOR)
}

/// Block framing plus classification. Stops producing events after `Done`.
#[derive(Default)]
pub struct StreamParser {
    decoder: BlockDecoder,
    done: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        for block in self.decoder.push(chunk) {
            let Some(event) = classify_block(&block) else {
                continue;
            };
            let is_done = event == StreamEvent::Done;
            events.push(event);
            if is_done {
                self.done = true;
                self.decoder.flush();
                break;
            }
        }
        events
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn flush(&mut self) -> String {
        self.decoder.flush()
    }
}

/// Lazy, ordered sequence of events read from one response body.
///
/// Each call to [`EventStream::next_event`] suspends only while waiting for
/// the next chunk from the transport. The sequence ends at `Done` or at end of
/// body, whichever comes first.
pub struct EventStream {
    bytes: ByteStream,
    parser: StreamParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl EventStream {
    pub fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            parser: StreamParser::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, ChatError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event == StreamEvent::Done {
                    self.finished = true;
                    self.pending.clear();
                }
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.parser.process(&chunk)),
                Some(Err(error)) => {
                    self.finished = true;
                    return Err(error);
                }
                None => {
                    self.finished = true;
                    let remainder = self.parser.flush();
                    if !remainder.trim().is_empty() {
                        tracing::debug!(
                            bytes = remainder.len(),
                            "discarding unterminated block at end of stream"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataPayload;
    use bytes::Bytes;
    use futures::stream;
    use proptest::prelude::*;

    fn byte_stream(chunks: Vec<Result<&'static str, &'static str>>) -> ByteStream {
        let items: Vec<Result<Bytes, ChatError>> = chunks
            .into_iter()
            .map(|chunk| match chunk {
                Ok(text) => Ok(Bytes::from(text)),
                Err(message) => Err(ChatError::Transport(message.to_string())),
            })
            .collect();
        Box::pin(stream::iter(items))
    }

    #[test]
    fn test_block_split_across_chunks_is_emitted_once() {
        let mut decoder = BlockDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert!(decoder.push(b"lo\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: next"), vec!["data: hello".to_string()]);
        assert_eq!(decoder.buffered_len(), "data: next".len());
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: 你好\n\n".as_bytes();
        let mut decoder = BlockDecoder::new();
        assert!(decoder.push(&text[..8]).is_empty());
        assert_eq!(decoder.push(&text[8..]), vec!["data: 你好".to_string()]);
    }

    #[test]
    fn test_remainder_is_never_emitted() {
        let mut decoder = BlockDecoder::new();
        assert!(decoder.push(b"data: partial").is_empty());
        assert_eq!(decoder.flush(), "data: partial");
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_parser_stops_after_done() {
        let mut parser = StreamParser::new();
        let events = parser.process(b"data: one\n\ndata: [DONE]\n\ndata: two\n\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Data(DataPayload::Text("one".to_string())),
                StreamEvent::Done
            ]
        );
        assert!(parser.is_done());
        assert!(parser.process(b"data: three\n\n").is_empty());
    }

    #[test]
    fn test_empty_blocks_are_skipped() {
        let mut parser = StreamParser::new();
        let events = parser.process(b"\n\n\n\nthink: a\n\n");
        assert_eq!(events, vec![StreamEvent::Think("a".to_string())]);
    }

    #[tokio::test]
    async fn test_event_stream_yields_in_order_and_ends_at_done() {
        let mut events = EventStream::new(byte_stream(vec![
            Ok("event: think\ndata: hmm\n\nda"),
            Ok("ta: answer\n\n"),
            Ok("data: [DONE]\n\n"),
            Err("never read"),
        ]));

        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Think("hmm".to_string()))
        );
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Data(DataPayload::Text("answer".to_string())))
        );
        assert_eq!(events.next_event().await.unwrap(), Some(StreamEvent::Done));
        assert_eq!(events.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_stream_ends_without_done_and_drops_partial_block() {
        let mut events = EventStream::new(byte_stream(vec![Ok("data: a\n\ndata: trailing")]));
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Data(DataPayload::Text("a".to_string())))
        );
        assert_eq!(events.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_stream_surfaces_read_error() {
        let mut events = EventStream::new(byte_stream(vec![Ok("data: a\n\n"), Err("reset")]));
        assert!(events.next_event().await.unwrap().is_some());
        let error = events.next_event().await.unwrap_err();
        assert!(error.is_transport());
        assert_eq!(events.next_event().await.unwrap(), None);
    }

    fn arb_block() -> impl Strategy<Value = String> {
        "(event: [a-z_]{1,8}\n)?(data|think|tool_message): [a-zA-Z0-9 {}\":,]{0,24}"
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_blocks(
            blocks in prop::collection::vec(arb_block(), 0..8),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
        ) {
            let text: String = blocks.iter().map(|b| format!("{b}\n\n")).collect();
            let bytes = text.as_bytes();

            let mut whole = BlockDecoder::new();
            let expected = whole.push(bytes);

            let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
            positions.sort_unstable();
            let mut chunked = BlockDecoder::new();
            let mut actual = Vec::new();
            let mut last = 0;
            for position in positions.into_iter().chain(std::iter::once(bytes.len())) {
                actual.extend(chunked.push(&bytes[last..position]));
                last = position;
            }

            prop_assert_eq!(&actual, &expected);
            prop_assert_eq!(actual, blocks);
        }
    }
}
