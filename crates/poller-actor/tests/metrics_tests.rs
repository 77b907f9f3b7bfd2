use device_sim::DeviceSim;
use metrics_exporter_prometheus::PrometheusBuilder;
use pandapwr_client::{ClientConfig, PandaPwrClient};
use poller_actor::DeviceChannels;
use types::{DeviceEndpoint, Outlet, SwitchState};

#[test]
fn polls_and_commands_are_counted() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let sim = DeviceSim::start(DeviceSim::sample_payload())
                .await
                .expect("start sim");
            let client = PandaPwrClient::new(
                DeviceEndpoint::new(sim.ip_address()),
                ClientConfig { timeout_ms: 1_000 },
            )
            .expect("build client");
            let channels = DeviceChannels::new(client);

            assert!(channels.poll().await);
            sim.set_raw_body("not json").await;
            assert!(!channels.poll().await);
            assert!(channels.set_switch(Outlet::Usb, SwitchState::On).await);
        })
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("pandapwr_polls_total{outcome=\"ok\"} 1"),
        "{rendered}"
    );
    assert!(
        rendered.contains("pandapwr_polls_total{outcome=\"failed\"} 1"),
        "{rendered}"
    );
    assert!(
        rendered.contains("pandapwr_commands_total{outlet=\"usb\",outcome=\"ok\"} 1"),
        "{rendered}"
    );
}
