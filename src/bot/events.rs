use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserEvent;
use crate::recording::{RecordingSink, WRITE_SOUND_BINDING};

/// Consume a bot's page events until the stream ends or the session is
/// cancelled. Events already queued are handled before cancellation is
/// observed, and a fragment write that has begun always completes.
pub async fn dispatch_events(
    bot_id: String,
    mut events: mpsc::UnboundedReceiver<BrowserEvent>,
    sink: RecordingSink,
    session: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = session.cancelled() => break,
        };
        handle_event(&bot_id, &sink, event).await;
    }
    debug!("Event dispatch for bot {} finished", bot_id);
}

async fn handle_event(bot_id: &str, sink: &RecordingSink, event: BrowserEvent) {
    match event {
        BrowserEvent::BindingCalled { name, payload } if name == WRITE_SOUND_BINDING => {
            match sink.ingest_payload(&payload).await {
                Ok(path) => debug!("Bot {} stored fragment in {:?}", bot_id, path),
                Err(e) => warn!("Bot {} dropped audio fragment: {}", bot_id, e),
            }
        }
        BrowserEvent::BindingCalled { name, .. } => {
            debug!("Bot {} ignoring call to binding {}", bot_id, name);
        }
        BrowserEvent::ConsoleError { args } => {
            warn!("Bot {} console error: {}", bot_id, args.join(" "));
        }
        BrowserEvent::ExceptionThrown { message } => {
            warn!("Bot {} page exception: {}", bot_id, message);
        }
        BrowserEvent::DownloadCompleted { id } => {
            info!("Bot {} download completed: {}", bot_id, id);
        }
    }
}
