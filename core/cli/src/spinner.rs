use std::time::Duration;

use carport_uploader::Event;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

/// Shows the latest pipeline event on a terminal spinner until the channel closes.
pub async fn render(mut events: UnboundedReceiver<Event>) {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {elapsed} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = events.recv().await {
        let message = format!("{}: {event}", event.source().display());
        match event {
            Event::Complete { .. } | Event::DeadLettered { .. } | Event::Failed { .. } => {
                spinner.println(message)
            },
            _ => spinner.set_message(message),
        }
    }
    spinner.finish_and_clear();
}
