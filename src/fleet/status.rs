//! The `status` screen: continuously refreshed inventory, per-agent polls,
//! and a redraw every 500 ms.
use std::collections::BTreeMap;
use std::io::Write as _;
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info};

use crate::args::StatusArgs;
use crate::config::CoordinatorConfig;
use crate::error::{AppError, AppResult, FleetError};
use crate::shutdown::ShutdownSender;
use crate::system::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};

use super::commands::{SharedProvider, build_providers, describe_managed};
use super::instance::RegionInstances;
use super::poller::{
    FleetPoller, PollCompletion, PollDispatcher, PollOutcome, PollTicket, STALE_THRESHOLD,
};
use super::provider::ImageTable;
use super::render::render_fleet;

const RENDER_PERIOD: Duration = Duration::from_millis(500);
const INVENTORY_PAUSE: Duration = Duration::from_secs(1);

/// Polls `GET http://<address>:<control_port>/` on its own task per request.
pub struct HttpPollDispatcher {
    client: Client,
    control_port: u16,
    completions: mpsc::UnboundedSender<PollCompletion>,
}

impl HttpPollDispatcher {
    #[must_use]
    pub const fn new(
        client: Client,
        control_port: u16,
        completions: mpsc::UnboundedSender<PollCompletion>,
    ) -> Self {
        Self {
            client,
            control_port,
            completions,
        }
    }
}

impl PollDispatcher for HttpPollDispatcher {
    type Handle = AbortHandle;

    fn dispatch(&self, ticket: PollTicket, address: &str) -> AbortHandle {
        let request = self
            .client
            .get(format!("http://{}:{}/", address, self.control_port))
            .header(reqwest::header::CONNECTION, "keep-alive");
        let completions = self.completions.clone();
        let task = tokio::spawn(async move {
            let outcome = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(value) => PollOutcome::Success(value),
                        Err(err) => PollOutcome::Failure(error_code(&err)),
                    }
                }
                Ok(response) => PollOutcome::Failure(response.status().as_u16().to_string()),
                Err(err) => PollOutcome::Failure(error_code(&err)),
            };
            if completions.send(PollCompletion { ticket, outcome }).is_err() {
                debug!("Status loop gone, dropping poll result");
            }
        });
        task.abort_handle()
    }
}

/// Short code shown in brackets after an instance whose last poll failed.
fn error_code(err: &reqwest::Error) -> String {
    let code = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_decode() {
        "decode"
    } else if err.is_body() {
        "body"
    } else {
        "request"
    };
    code.to_owned()
}

/// Runs the status screen until Ctrl+C.
///
/// # Errors
///
/// Returns configuration errors, or an error when the terminal cannot be
/// written.
pub async fn run_status(config: &CoordinatorConfig, args: StatusArgs) -> AppResult<()> {
    let images = ImageTable::with_overrides(&config.images);
    let regions = config.target_regions(args.region.as_deref());
    let providers = build_providers(config, &images, &regions)?;
    let client = Client::builder()
        .build()
        .map_err(|err| AppError::fleet(FleetError::BuildClient { source: err }))?;

    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let (view_tx, view_rx) = watch::channel(Vec::<RegionInstances>::new());
    let inventory_handle = tokio::spawn(refresh_inventory(
        providers,
        config.instance_tags.clone(),
        view_tx,
        shutdown_tx.clone(),
    ));

    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
    let dispatcher = HttpPollDispatcher::new(client, config.control_port, completion_tx);
    let mut poller = FleetPoller::new(dispatcher, STALE_THRESHOLD, config.poll_fan_out.max(1));

    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut render_interval = interval(RENDER_PERIOD);
    render_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            _ = render_interval.tick() => {
                let view = view_rx.borrow().clone();
                let now = Instant::now();
                if let Err(err) = draw(&render_fleet(&view, poller.states(), now)) {
                    break Err(err);
                }
                poller.observe(&view, now);
                let report = poller.poll_due(&view, now);
                if report.deferred > 0 {
                    debug!("{} polls deferred by the fan-out cap", report.deferred);
                }
            }
            Some(completion) = completion_rx.recv() => {
                poller.complete(completion, Instant::now());
            }
        }
    };

    drop(shutdown_tx.send(()));
    let cancelled = poller.shutdown();
    inventory_handle.await?;
    signal_handle.abort();
    info!("Status stopped, cancelled {} polls", cancelled);
    result
}

/// Re-describes every region, pausing between rounds. A region whose call
/// fails keeps its previous instance list.
async fn refresh_inventory(
    providers: Vec<SharedProvider>,
    tags: BTreeMap<String, String>,
    view_tx: watch::Sender<Vec<RegionInstances>>,
    shutdown_tx: ShutdownSender,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        let results = tokio::select! {
            _ = shutdown_rx.recv() => break,
            results = describe_managed(&providers, &tags) => results,
        };

        let previous = view_tx.borrow().clone();
        let view: Vec<RegionInstances> = providers
            .iter()
            .zip(results)
            .map(|(provider, result)| {
                let region = provider.region().to_owned();
                let instances = result.unwrap_or_else(|err| {
                    error!("DescribeInstances error: {}", err);
                    previous
                        .iter()
                        .find(|known| known.region == region)
                        .map(|known| known.instances.clone())
                        .unwrap_or_default()
                });
                RegionInstances { region, instances }
            })
            .collect();
        if view_tx.send(view).is_err() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            () = sleep(INVENTORY_PAUSE) => {}
        }
    }
}

fn draw(screen: &str) -> AppResult<()> {
    let mut stdout = std::io::stdout();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
    stdout.write_all(screen.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
