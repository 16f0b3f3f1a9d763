pub mod sim;
pub mod traits;

use tokio::sync::watch;

use crate::domain::types::NewPeakEvent;

/// New-peak delivery channel: bounded, single consumer, latest-wins. A burst
/// of notifications coalesces to the newest peak instead of queueing.
pub fn peak_channel() -> (watch::Sender<NewPeakEvent>, watch::Receiver<NewPeakEvent>) {
    watch::channel(NewPeakEvent { height: 0 })
}
