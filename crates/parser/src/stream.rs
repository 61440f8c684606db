//! Stream adapter: wraps a fragment stream, feeds the parser, and yields the
//! fragments back unchanged.

use futures::{Stream, StreamExt};

use crate::machine::{TagEvent, TagStreamParser};

/// Pass `input` through while reporting every [`TagEvent`] to `on_event`.
///
/// Events for a fragment are delivered before that fragment is yielded.
/// When `input` ends, the parser is finished and the closing events are
/// delivered before the returned stream ends.
pub fn tag_stream<S, F>(
    input: S,
    parser: TagStreamParser,
    on_event: F,
) -> impl Stream<Item = String>
where
    S: Stream<Item = String> + Unpin,
    F: FnMut(TagEvent),
{
    futures::stream::unfold(Some((input, parser, on_event)), |state| async move {
        let (mut input, mut parser, mut on_event) = state?;
        match input.next().await {
            Some(fragment) => {
                for event in parser.feed(&fragment) {
                    on_event(event);
                }
                Some((fragment, Some((input, parser, on_event))))
            }
            None => {
                for event in parser.finish() {
                    on_event(event);
                }
                None
            }
        }
    })
}

/// Parse a complete sequence of fragments.
pub fn parse_fragments<'a>(
    parser: &mut TagStreamParser,
    fragments: impl IntoIterator<Item = &'a str>,
) -> Vec<TagEvent> {
    let mut events: Vec<TagEvent> = fragments
        .into_iter()
        .flat_map(|fragment| parser.feed(fragment))
        .collect();
    events.extend(parser.finish());
    events
}
