//! End-to-end reconciliation: a controller wired to a mock IOC over real
//! tokio channels, driven the way an input widget would drive it.

use std::sync::Arc;

use tokio::sync::mpsc;

use ophyd_field::config::FieldDefaults;
use ophyd_field::field::{FieldOptions, Key, TextFieldController};
use ophyd_field::mock::MockIoc;
use ophyd_field::pv::{PvDescription, PvEndpoint, PvMonitor, PvValue, SetRequest};

const PV: &str = "bl:dcm_energy";

fn defaults() -> FieldDefaults {
    FieldDefaults {
        default_signif_figures: Some(3),
    }
}

fn dcm_description(ctrl_limits: Option<(f64, f64)>) -> PvDescription {
    let (lower_ctrl, upper_ctrl) = match ctrl_limits {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => (None, None),
    };
    PvDescription {
        name: "dcm_energy".into(),
        dtype: "number".into(),
        units: "eV".into(),
        lower_disp_limit: Some(100.0),
        upper_disp_limit: Some(200.0),
        lower_ctrl_limit: lower_ctrl,
        upper_ctrl_limit: upper_ctrl,
        ..PvDescription::default()
    }
}

struct Rig {
    ioc: Arc<MockIoc>,
    controller: TextFieldController,
    feed: tokio::sync::watch::Receiver<Option<ophyd_field::pv::PvUpdate>>,
    requests: mpsc::UnboundedReceiver<(u64, SetRequest)>,
}

fn rig(description: PvDescription) -> Rig {
    let ioc = Arc::new(MockIoc::new());
    ioc.register(PV, PvValue::Number(0.192193814), description);

    let mut controller = TextFieldController::new(PV, FieldOptions::new(), &defaults());
    let (tx, requests) = mpsc::unbounded_channel();
    controller.connect_dispatcher(move |seq, request| {
        tx.send((seq, request))
            .map_err(|_| anyhow::anyhow!("request queue closed"))
    });

    let mut feed = ioc.subscribe(PV).unwrap();
    let initial = feed.borrow_and_update().clone().unwrap();
    controller.on_update(&initial);

    Rig {
        ioc,
        controller,
        feed,
        requests,
    }
}

#[tokio::test]
async fn commit_round_trip_then_blocked_out_of_band_edit() {
    let mut rig = rig(dcm_description(None));

    // Live value 0.192193814 with a global default of 3 decimals.
    assert_eq!(rig.controller.display_value(), "0.192");

    // Operator types an in-band value and commits.
    rig.controller.on_focus();
    rig.controller.on_change("150");
    assert_eq!(rig.controller.fault(), None);
    rig.controller.on_key_down(Key::Enter);
    assert!(!rig.controller.is_editing());

    let (seq, request) = rig.requests.try_recv().unwrap();
    assert_eq!(request.target, PV);
    assert_eq!(request.value, PvValue::Number(150.0));

    let response = rig.ioc.put(request).await.unwrap();
    assert!(response.success);
    rig.controller.on_set_response(seq, Some(response));
    assert_eq!(rig.controller.fault(), None);
    assert!(!rig.controller.is_loading());

    // The device pushes the accepted value back through the feed.
    rig.feed.changed().await.unwrap();
    let update = rig.feed.borrow_and_update().clone().unwrap();
    rig.controller.on_update(&update);
    assert_eq!(rig.controller.display_value(), "150.000");

    // Out-of-band edit: flagged, and Enter is a no-op.
    rig.controller.on_focus();
    rig.controller.on_change("250");
    assert_eq!(rig.controller.fault_message().as_deref(), Some("too high"));
    rig.controller.on_key_down(Key::Enter);
    assert!(rig.requests.try_recv().is_err());
    assert!(rig.controller.is_editing());

    // Blur discards the rejected edit back to the device's truth.
    rig.controller.on_blur();
    assert_eq!(rig.controller.display_value(), "150.000");
}

#[tokio::test]
async fn device_rejection_surfaces_the_server_message() {
    // Display limits are wider than the control limits the device enforces,
    // so a value can pass local validation and still be rejected remotely.
    let mut rig = rig(dcm_description(Some((100.0, 180.0))));

    rig.controller.on_focus();
    rig.controller.on_change("190");
    assert_eq!(rig.controller.fault(), None);
    rig.controller.on_key_down(Key::Enter);

    let (seq, request) = rig.requests.try_recv().unwrap();
    let response = rig.ioc.put(request).await.unwrap();
    assert!(!response.success);
    rig.controller.on_set_response(seq, Some(response));

    assert!(rig
        .controller
        .fault_message()
        .is_some_and(|m| m.contains("out of range")));
    assert_eq!(rig.ioc.value(PV), Some(PvValue::Number(0.192193814)));
}

#[tokio::test]
async fn live_update_during_an_edit_only_refreshes_the_fallback() {
    let mut rig = rig(dcm_description(None));

    rig.controller.on_focus();
    rig.controller.on_change("150");

    // The device moves on its own while the operator is typing.
    rig.ioc.push(PV, PvValue::Number(175.5)).unwrap();
    rig.feed.changed().await.unwrap();
    let update = rig.feed.borrow_and_update().clone().unwrap();
    rig.controller.on_update(&update);

    assert_eq!(rig.controller.display_value(), "150");
    rig.controller.on_blur();
    assert_eq!(rig.controller.display_value(), "175.500");
}

#[tokio::test]
async fn transport_failure_maps_to_the_fixed_fallback_message() {
    let mut rig = rig(dcm_description(None));
    rig.ioc.set_offline(true);

    rig.controller.on_focus();
    rig.controller.on_change("150");
    rig.controller.on_key_down(Key::Enter);

    let (seq, request) = rig.requests.try_recv().unwrap();
    let outcome = rig.ioc.put(request).await;
    assert!(outcome.is_err());

    // No verdict was obtained: the driver reports a failed set without a
    // server message, which renders as the fixed fallback.
    rig.controller.on_set_response(
        seq,
        Some(ophyd_field::pv::SetResponse {
            success: false,
            message: None,
        }),
    );
    assert_eq!(
        rig.controller.fault_message().as_deref(),
        Some("failed to set value")
    );
}
