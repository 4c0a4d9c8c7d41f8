pub mod cli;
pub mod rpc;
pub mod transport;

#[cfg(not(feature = "coverage"))]
use std::time::Duration;

#[cfg(not(feature = "coverage"))]
use log::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[cfg(debug_assertions)]
fn default_filter() -> &'static str {
    "info"
}

#[cfg(not(debug_assertions))]
fn default_filter() -> &'static str {
    "warn"
}

/// Installs the fmt subscriber; `log` records from the library are forwarded to it.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter())),
        )
        .try_init();
}

#[cfg(not(feature = "coverage"))]
pub fn run(cli: Cli) {
    use crate::rpc::{LogChannelPicker, LogTextSink, LogVoiceSink, RpcConnector, Surfaces};

    let mut connector = match RpcConnector::new_with_websocket(cli.to_config()) {
        Ok(connector) => connector,
        Err(err) => {
            error!("could not build token client: {err}");
            return;
        }
    };
    let mut voice = LogVoiceSink;
    let mut text = LogTextSink;
    let mut picker = LogChannelPicker {
        selected_text_channel: cli.text_channel.clone(),
    };
    let period = Duration::from_secs(1) / cli.tick_rate.max(1);
    info!("pumping rpc link every {period:?}");
    loop {
        let mut surfaces = Surfaces {
            voice: &mut voice,
            text: &mut text,
            picker: &mut picker,
        };
        connector.tick(&mut surfaces);
        for event in connector.take_events() {
            info!("{event:?}");
        }
        std::thread::sleep(period);
    }
}

#[cfg(feature = "coverage")]
pub fn run(_cli: Cli) {}
