use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use super::error::TrackerError;
use super::http::HttpDialect;
use super::response::{AnnounceResult, TrackerEvent};
use super::udp::UdpDialect;
use crate::download::{DownloadInfo, StatsSource};

/// How many peers to ask for on each announce.
const NUMWANT: u32 = 20;

/// One announce worth of parameters, assembled from the download
/// identity and a fresh stats snapshot.
pub(super) struct AnnounceParams {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub event: TrackerEvent,
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
    pub numwant: u32,
}

enum Dialect {
    Http(HttpDialect),
    Udp(UdpDialect),
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop,
    Completed,
}

/// Control handle for a running [`Announcer`].
///
/// Both methods are idempotent and safe to call from any task; they
/// never block.
#[derive(Clone)]
pub struct AnnouncerHandle {
    signals: mpsc::Sender<Signal>,
}

impl AnnouncerHandle {
    /// Asks the announcer to send a final `stopped` announce and exit.
    pub fn stop(&self) {
        let _ = self.signals.try_send(Signal::Stop);
    }

    /// Asks the announcer to report the download as completed.
    pub fn announce_completion(&self) {
        let _ = self.signals.try_send(Signal::Completed);
    }
}

/// The periodic announce loop for one torrent.
///
/// Created against a tracker URL whose scheme picks the dialect:
/// `http`/`https` or `udp`; anything else fails construction. The loop
/// itself runs in [`run`](Announcer::run).
pub struct Announcer {
    url: String,
    info: Arc<DownloadInfo>,
    stats: Arc<dyn StatsSource>,
    dialect: Dialect,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: mpsc::Receiver<Signal>,
}

impl Announcer {
    /// Builds an announcer for the given tracker URL.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnsupportedScheme`] for schemes other
    /// than `http`, `https`, and `udp`, and [`TrackerError::InvalidUrl`]
    /// or an I/O error when the UDP socket cannot be set up.
    pub async fn new(
        url: &str,
        info: Arc<DownloadInfo>,
        stats: Arc<dyn StatsSource>,
    ) -> Result<Self, TrackerError> {
        let dialect = if url.starts_with("http://") || url.starts_with("https://") {
            Dialect::Http(HttpDialect::new(url)?)
        } else if url.starts_with("udp://") {
            Dialect::Udp(UdpDialect::connect(url).await?)
        } else {
            let scheme = url.split("://").next().unwrap_or(url);
            return Err(TrackerError::UnsupportedScheme(scheme.to_string()));
        };

        let (signal_tx, signal_rx) = mpsc::channel(2);

        Ok(Self {
            url: url.to_string(),
            info,
            stats,
            dialect,
            signal_tx,
            signal_rx,
        })
    }

    /// Returns a control handle usable while [`run`](Announcer::run) is
    /// in flight.
    pub fn handle(&self) -> AnnouncerHandle {
        AnnouncerHandle {
            signals: self.signal_tx.clone(),
        }
    }

    /// Runs the announce loop until stopped.
    ///
    /// Announces `started` first, then re-announces every time the
    /// tracker-provided interval elapses, delivering each
    /// [`AnnounceResult`] in order on `results`. A
    /// [`stop`](AnnouncerHandle::stop) signal triggers a best-effort
    /// `stopped` announce whose result is not delivered; an
    /// [`announce_completion`](AnnouncerHandle::announce_completion)
    /// signal triggers a `completed` announce whose result is.
    ///
    /// # Errors
    ///
    /// Any failed announce (other than the final `stopped`) ends the
    /// loop with the error; the results channel closes by drop. Retry
    /// policy belongs to the caller.
    pub async fn run(mut self, results: mpsc::Sender<AnnounceResult>) -> Result<(), TrackerError> {
        debug!(url = %self.url, "starting announcer");
        let (result, mut interval) = self.announce(TrackerEvent::Started).await?;
        if results.send(result).await.is_err() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = time::sleep(Duration::from_secs(interval.into())) => {
                    debug!(url = %self.url, "announcing regularly");
                    let (result, next) = self.announce(TrackerEvent::None).await?;
                    interval = next;
                    if results.send(result).await.is_err() {
                        return Ok(());
                    }
                }
                signal = self.signal_rx.recv() => match signal {
                    Some(Signal::Stop) | None => {
                        debug!(url = %self.url, "announcing stopped");
                        if let Err(e) = self.announce(TrackerEvent::Stopped).await {
                            warn!(url = %self.url, error = %e, "final stopped announce failed");
                        }
                        return Ok(());
                    }
                    Some(Signal::Completed) => {
                        debug!(url = %self.url, "announcing completed");
                        let (result, next) = self.announce(TrackerEvent::Completed).await?;
                        interval = next;
                        if results.send(result).await.is_err() {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }

    async fn announce(
        &mut self,
        event: TrackerEvent,
    ) -> Result<(AnnounceResult, u32), TrackerError> {
        let stats = self.stats.current();
        let params = AnnounceParams {
            info_hash: *self.info.info_hash.as_bytes(),
            peer_id: self.info.peer_id,
            port: self.info.port,
            event,
            downloaded: stats.downloaded,
            uploaded: stats.uploaded,
            left: stats.left,
            numwant: NUMWANT,
        };

        match &mut self.dialect {
            Dialect::Http(http) => http.announce(&params).await,
            Dialect::Udp(udp) => udp.announce(&params).await,
        }
    }
}
