//! Headless demo for the field controller.
//!
//! Stands up a [`MockIoc`] with a DCM-energy channel and drives a scripted
//! operator interaction through the [`TextFieldController`], logging every
//! transition: live value arrives, an in-band edit is committed, the device
//! pushes the new value back, and an out-of-band edit is blocked.
//!
//! # Usage
//!
//! ```bash
//! ophyd_field --config config/config.toml
//! ```

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use ophyd_field::config::AppConfig;
use ophyd_field::field::{FieldOptions, Key, TextFieldController};
use ophyd_field::mock::MockIoc;
use ophyd_field::pv::{PvDescription, PvEndpoint, PvMonitor, PvValue, SetResponse};
use ophyd_field::telemetry;

const PV: &str = "bl:dcm_energy";

#[derive(Parser)]
#[command(name = "ophyd_field")]
#[command(about = "Beamline text-field controller walkthrough", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    telemetry::init_from_config(&config)?;
    info!(name = %config.application.name, "starting walkthrough");

    let ioc = Arc::new(MockIoc::new());
    ioc.register(
        PV,
        PvValue::Number(0.192193814),
        PvDescription {
            name: "dcm_energy".into(),
            dtype: "number".into(),
            units: "eV".into(),
            lower_disp_limit: Some(100.0),
            upper_disp_limit: Some(200.0),
            ..PvDescription::default()
        },
    );

    let opts = FieldOptions::new().with_label("DCM energy");
    let mut controller = TextFieldController::new(PV, opts, &config.field);

    // Fire-and-forget dispatch: the controller pushes requests into a queue,
    // the walkthrough forwards them to the endpoint and feeds the verdict
    // back as a commit-response event.
    let (request_tx, mut request_rx) = mpsc::unbounded_channel();
    controller.connect_dispatcher(move |seq, request| {
        request_tx
            .send((seq, request))
            .map_err(|_| anyhow!("request queue closed"))
    });

    let mut feed = ioc.subscribe(PV)?;
    if let Some(update) = feed.borrow_and_update().clone() {
        controller.on_update(&update);
    }
    info!(
        display = controller.display_value(),
        label = ?controller.label_text(),
        limits = ?controller.limits(),
        "live value arrived"
    );

    // In-band edit: type 150, commit with Enter.
    controller.on_focus();
    controller.on_change("150");
    controller.on_key_down(Key::Enter);
    if let Ok((seq, request)) = request_rx.try_recv() {
        info!(request = %serde_json::to_string(&request)?, "forwarding set request");
        match ioc.put(request).await {
            Ok(response) => controller.on_set_response(seq, Some(response)),
            Err(err) => {
                warn!(error = %err, "no verdict from endpoint");
                controller.on_set_response(
                    seq,
                    Some(SetResponse {
                        success: false,
                        message: None,
                    }),
                );
            }
        }
    }
    feed.changed().await?;
    if let Some(update) = feed.borrow_and_update().clone() {
        controller.on_update(&update);
    }
    info!(
        display = controller.display_value(),
        fault = ?controller.fault_message(),
        "commit round trip complete"
    );

    // Out-of-band edit: 250 exceeds the upper limit, Enter is a no-op.
    controller.on_focus();
    controller.on_change("250");
    controller.on_key_down(Key::Enter);
    info!(
        display = controller.display_value(),
        fault = ?controller.fault_message(),
        editing = controller.is_editing(),
        "out-of-band edit blocked"
    );

    // Blur silently discards the rejected edit.
    controller.on_blur();
    info!(display = controller.display_value(), "edit discarded on blur");

    Ok(())
}
