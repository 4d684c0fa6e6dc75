/*!
 # Controller telemetry

 The transport to the controller lives outside this crate and is reached
 through [`ControllerLink`]. This module turns telemetry records into a
 device status, performs one-shot refreshes under a timeout, and runs a
 cancellable background poller.

 Requests are never retried: a timeout, a link error or an empty result marks
 the device offline until the next poll.
*/

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::codec::{
    decode_last_setting, AckStatus, Command, CommandRequest, CommandResponse, DecodedAck,
    LastSettingResponse,
};
use crate::config::FeederConfig;
use crate::timestamp;
use crate::{Error, Result};

/// One telemetry record reported by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Controller clock in compact `DDMMYYHHMMSS` form
    #[serde(default)]
    pub a3: Option<String>,
    /// Signal strength
    #[serde(default)]
    pub a4: Option<i32>,
    /// Unix time the backend received the record
    #[serde(default)]
    pub received_at: Option<i64>,
}

/// Reachability of the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Nothing known yet
    #[default]
    Unknown,
    /// A refresh is in flight
    Waiting,
    /// Latest poll returned telemetry
    Online,
    /// Latest poll failed, timed out or returned nothing
    Offline,
}

/// Outcome of one status poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub status: DeviceStatus,
    /// Last known signal strength
    pub signal: Option<i32>,
    /// Controller time as `DD-MM-YYYY HH:MM:SS`
    pub date_time: Option<String>,
    /// Operator message, if the poll has something to say
    pub message: Option<String>,
}

impl StatusReport {
    fn offline(message: &str) -> Self {
        Self {
            status: DeviceStatus::Offline,
            message: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// Transport to the controller backend
pub trait ControllerLink: Send + Sync + 'static {
    /// Posts a command payload
    fn send_command(
        &self,
        controller_id: &str,
        request: CommandRequest,
    ) -> impl Future<Output = Result<CommandResponse>> + Send;

    /// Most recent telemetry records, newest first
    fn latest_telemetry(
        &self,
        controller_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Telemetry>>> + Send;

    /// Settings the controller last accepted
    fn last_setting(
        &self,
        controller_id: &str,
    ) -> impl Future<Output = Result<LastSettingResponse>> + Send;
}

/// Builds a status report from telemetry records, newest first
pub fn status_from_telemetry(records: &[Telemetry]) -> StatusReport {
    let Some(latest) = records.first() else {
        return StatusReport::offline("No telemetry received");
    };

    let date_time = latest
        .a3
        .as_deref()
        .and_then(timestamp::format_device_time)
        .or_else(|| {
            latest
                .received_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        });

    StatusReport {
        status: DeviceStatus::Online,
        signal: latest.a4,
        message: Some(format!(
            "Date/Time: {}",
            date_time.as_deref().unwrap_or("No time data")
        )),
        date_time,
    }
}

/// Reads the latest telemetry once, giving up after `timeout`
#[instrument(skip(link))]
pub async fn pull_status<L: ControllerLink>(
    link: &L,
    controller_id: &str,
    timeout: Duration,
) -> StatusReport {
    match time::timeout(timeout, link.latest_telemetry(controller_id, 1)).await {
        Ok(Ok(records)) => {
            debug!("Received {} telemetry records", records.len());
            status_from_telemetry(&records)
        }
        Ok(Err(e)) => {
            warn!("Telemetry request failed: {}", e);
            StatusReport::offline("Device did not respond")
        }
        Err(_) => {
            warn!("Telemetry request timed out after {:?}", timeout);
            StatusReport::offline("Device did not respond (Timeout)")
        }
    }
}

/// Asks the controller to refresh, then reads its telemetry
///
/// Sends `c0=201`, waits for the settle delay and pulls once. The whole
/// exchange shares one request timeout.
#[instrument(skip(link, config))]
pub async fn refresh_once<L: ControllerLink>(
    link: &L,
    controller_id: &str,
    config: &FeederConfig,
) -> StatusReport {
    let timeout = config.request_timeout();
    let exchange = async {
        let response = link
            .send_command(controller_id, CommandRequest::command(Command::Refresh))
            .await?;
        match response.status() {
            AckStatus::Received => debug!("Refresh acknowledged: {:?}", response.ack_payload),
            status => debug!("Refresh not confirmed: {:?}", status),
        }
        time::sleep(config.refresh_settle_delay()).await;
        Ok::<_, Error>(pull_status(link, controller_id, timeout).await)
    };

    match time::timeout(timeout, exchange).await {
        Ok(Ok(report)) => {
            info!("Refresh finished: {:?}", report.status);
            report
        }
        Ok(Err(e)) => {
            warn!("Refresh command failed: {}", e);
            StatusReport::offline("Device did not respond")
        }
        Err(_) => {
            warn!("Refresh timed out after {:?}", timeout);
            StatusReport::offline("Device did not respond (Timeout)")
        }
    }
}

/// Fetches and decodes the settings the controller last accepted
///
/// `now` stands in for the acceptance time when the controller sent none.
#[instrument(skip(link))]
pub async fn pull_last_setting<L: ControllerLink>(
    link: &L,
    controller_id: &str,
    timeout: Duration,
    now: NaiveDateTime,
) -> Result<DecodedAck> {
    let response = time::timeout(timeout, link.last_setting(controller_id))
        .await
        .map_err(|_| {
            warn!("Last setting request timed out after {:?}", timeout);
            Error::Timeout(timeout.as_millis() as u64)
        })??;

    let ack = decode_last_setting(&response, now);
    info!("Controller holds {} settings since {}", ack.settings.len(), ack.accepted_at);
    Ok(ack)
}

/// Background task polling controller telemetry
///
/// Polls immediately, then once per poll interval, until cancelled or dropped.
pub struct TelemetryPoller {
    status_rx: watch::Receiver<StatusReport>,
    cancel_tx: watch::Sender<bool>,
    refresh: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryPoller {
    /// Starts polling on the current tokio runtime
    pub fn spawn<L: ControllerLink>(link: Arc<L>, controller_id: String, config: &FeederConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(StatusReport::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());

        let handle = tokio::spawn(poll_loop(
            link,
            controller_id,
            config.clone(),
            status_tx,
            Arc::clone(&refresh),
            cancel_rx,
        ));

        Self {
            status_rx,
            cancel_tx,
            refresh,
            handle: Some(handle),
        }
    }

    /// Asks the task to send a refresh command before its next poll
    ///
    /// The status reads [`DeviceStatus::Waiting`] until the refresh finishes.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Latest status report
    pub fn status(&self) -> StatusReport {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified on every new report
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status_rx.clone()
    }

    /// Asks the task to stop after the current poll
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Cancels the task and waits for it to finish
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Telemetry poller ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

#[instrument(skip(link, config, status_tx, refresh, cancel_rx))]
async fn poll_loop<L: ControllerLink>(
    link: Arc<L>,
    controller_id: String,
    config: FeederConfig,
    status_tx: watch::Sender<StatusReport>,
    refresh: Arc<Notify>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let interval = config.poll_interval();
    info!("Starting telemetry polling every {:?}", interval);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let refreshing = tokio::select! {
            biased;
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => break,
            _ = refresh.notified() => true,
            _ = ticker.tick() => false,
        };

        if refreshing {
            status_tx.send_modify(|report| {
                report.status = DeviceStatus::Waiting;
                report.message = Some("Waiting for device response".to_string());
            });
        }

        let poll = async {
            if refreshing {
                refresh_once(link.as_ref(), &controller_id, &config).await
            } else {
                pull_status(link.as_ref(), &controller_id, config.request_timeout()).await
            }
        };
        let mut report = tokio::select! {
            biased;
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => break,
            report = poll => report,
        };

        // Signal is only reported now and then; keep the last known value
        if report.signal.is_none() {
            report.signal = status_tx.borrow().signal;
        }
        if report.status != status_tx.borrow().status {
            info!("Controller {} is now {:?}", controller_id, report.status);
        }
        status_tx.send_replace(report);
    }

    info!("Telemetry polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted link: pops one answer per request, hangs when nothing is left
    #[derive(Default)]
    struct ScriptedLink {
        telemetry: Mutex<VecDeque<Result<Vec<Telemetry>>>>,
        last_setting: Mutex<Option<LastSettingResponse>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedLink {
        fn with(answers: Vec<Result<Vec<Telemetry>>>) -> Self {
            Self {
                telemetry: Mutex::new(answers.into()),
                ..Self::default()
            }
        }
    }

    impl ControllerLink for ScriptedLink {
        fn send_command(
            &self,
            _controller_id: &str,
            request: CommandRequest,
        ) -> impl Future<Output = Result<CommandResponse>> + Send {
            self.commands.lock().push(request.payload);
            async { Ok(CommandResponse::default()) }
        }

        fn latest_telemetry(
            &self,
            _controller_id: &str,
            _limit: usize,
        ) -> impl Future<Output = Result<Vec<Telemetry>>> + Send {
            let next = self.telemetry.lock().pop_front();
            async move {
                match next {
                    Some(answer) => answer,
                    None => std::future::pending().await,
                }
            }
        }

        fn last_setting(
            &self,
            _controller_id: &str,
        ) -> impl Future<Output = Result<LastSettingResponse>> + Send {
            let next = self.last_setting.lock().take();
            async move {
                match next {
                    Some(response) => Ok(response),
                    None => std::future::pending().await,
                }
            }
        }
    }

    fn record(a3: &str, a4: Option<i32>) -> Telemetry {
        Telemetry {
            a3: Some(a3.to_string()),
            a4,
            received_at: None,
        }
    }

    #[test]
    fn status_from_records() {
        let report = status_from_telemetry(&[record("051225093015", Some(17))]);
        assert_eq!(report.status, DeviceStatus::Online);
        assert_eq!(report.signal, Some(17));
        assert_eq!(report.date_time.as_deref(), Some("05-12-2025 09:30:15"));

        let empty = status_from_telemetry(&[]);
        assert_eq!(empty.status, DeviceStatus::Offline);
        assert_eq!(empty.message.as_deref(), Some("No telemetry received"));
    }

    #[test]
    fn status_falls_back_to_received_at() {
        let telemetry = Telemetry {
            a3: Some("bad".into()),
            a4: None,
            received_at: Some(0),
        };
        let report = status_from_telemetry(&[telemetry]);
        assert_eq!(report.date_time.as_deref(), Some("01-01-1970 00:00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn pull_times_out_without_retry() {
        let link = ScriptedLink::default();
        let report = pull_status(&link, "c1", Duration::from_secs(4)).await;
        assert_eq!(report.status, DeviceStatus::Offline);
        assert_eq!(report.message.as_deref(), Some("Device did not respond (Timeout)"));
    }

    #[tokio::test(start_paused = true)]
    async fn pull_reports_link_errors_as_offline() {
        let link = ScriptedLink::with(vec![Err(Error::Link("503".into()))]);
        let report = pull_status(&link, "c1", Duration::from_secs(4)).await;
        assert_eq!(report.status, DeviceStatus::Offline);
        assert_eq!(report.message.as_deref(), Some("Device did not respond"));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_sends_refresh_command() {
        let link = ScriptedLink::with(vec![Ok(vec![record("0512250930", None)])]);
        let report = refresh_once(&link, "c1", &FeederConfig::default()).await;
        assert_eq!(report.status, DeviceStatus::Online);
        assert_eq!(link.commands.lock().as_slice(), ["c0=201"]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_shares_one_timeout() {
        let link = ScriptedLink::default();
        let started = time::Instant::now();
        let report = refresh_once(&link, "c1", &FeederConfig::default()).await;
        assert_eq!(report.status, DeviceStatus::Offline);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_millis(5500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn last_setting_is_decoded() {
        let link = ScriptedLink::default();
        *link.last_setting.lock() = Some(LastSettingResponse {
            sent_settings: "c0=212&as1=0600|1800&as2=0040|0025&as4=0180|0240&as9=0250|0500".into(),
            set_time_raw: Some("051225093015".into()),
        });
        let now = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let ack = pull_last_setting(&link, "c1", Duration::from_secs(4), now).await.unwrap();
        assert_eq!(ack.settings.len(), 2);
        assert_eq!(ack.settings[1].start_time.as_str(), "18:00");
        assert_eq!(ack.settings[1].time_gap.seconds(), 240);
        assert_eq!(ack.accepted_at, timestamp::parse("051225093015").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn last_setting_times_out() {
        let link = ScriptedLink::default();
        let now = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let err = pull_last_setting(&link, "c1", Duration::from_secs(4), now).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(4000)));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_waits_during_refresh() {
        let link = Arc::new(ScriptedLink::with(vec![
            Ok(vec![record("0512250930", Some(21))]),
            Ok(vec![record("0512250931", None)]),
        ]));
        let poller = TelemetryPoller::spawn(Arc::clone(&link), "c1".into(), &FeederConfig::default());
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, DeviceStatus::Online);

        poller.request_refresh();
        rx.changed().await.unwrap();
        let waiting = rx.borrow_and_update().clone();
        assert_eq!(waiting.status, DeviceStatus::Waiting);
        assert_eq!(waiting.signal, Some(21));

        rx.changed().await.unwrap();
        let refreshed = rx.borrow_and_update().clone();
        assert_eq!(refreshed.status, DeviceStatus::Online);
        assert_eq!(refreshed.date_time.as_deref(), Some("05-12-2025 09:31:00"));
        assert_eq!(link.commands.lock().as_slice(), ["c0=201"]);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poller_keeps_last_signal_and_stops() {
        let link = Arc::new(ScriptedLink::with(vec![
            Ok(vec![record("0512250930", Some(21))]),
            Ok(vec![record("0512250932", None)]),
            Ok(vec![]),
        ]));
        let poller = TelemetryPoller::spawn(link, "c1".into(), &FeederConfig::default());
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().signal, Some(21));

        rx.changed().await.unwrap();
        let second = rx.borrow_and_update().clone();
        assert_eq!(second.status, DeviceStatus::Online);
        assert_eq!(second.signal, Some(21));
        assert_eq!(second.date_time.as_deref(), Some("05-12-2025 09:32:00"));

        rx.changed().await.unwrap();
        assert_eq!(poller.status().status, DeviceStatus::Offline);

        poller.shutdown().await;
    }
}
