use anyhow::Result;
use retro_bridge_host::domain::models::{HostEvent, SystemIdHandle};
use retro_bridge_host::domain::settings::{Settings, SettingsService};
use retro_bridge_host::infrastructure::bluetooth::transport::{ReadyFlag, TxPump, TxQueue};
use retro_bridge_host::infrastructure::bluetooth::BluetoothHost;
use retro_bridge_host::infrastructure::logging::init_logger;
use retro_bridge_host::infrastructure::replay::{StdioRadio, TraceReader};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

fn main() -> Result<()> {
    // Optional explicit settings file, otherwise the per-user one
    let settings_service = match std::env::args().nth(1) {
        Some(path) => SettingsService::from_path(path)?,
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let _logging_guard = init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Retro Bridge host");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<()> {
    let (tx, tx_rx) = TxQueue::bounded(settings.host.tx_queue_capacity);
    let ready = ReadyFlag::new();
    let radio = StdioRadio::new(ready.clone());
    let pump = tokio::spawn(TxPump::new(tx_rx, ready.clone(), radio).run());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                HostEvent::PeerReady {
                    slot,
                    bdaddr,
                    device,
                } => info!("Controller {} ready in slot {} ({:?})", bdaddr, slot, device),
                HostEvent::PeerRemoved { slot } => info!("Slot {} free", slot),
                HostEvent::Input {
                    slot,
                    system,
                    state,
                    ..
                } => debug!("Slot {} -> {:?}: {:?}", slot, system, state),
            }
        }
    });

    let system_id = SystemIdHandle::new(settings.host.system_id);
    let mut host = BluetoothHost::new(settings.host, tx, event_tx, system_id);

    ready.set();
    host.start();

    let mut reader = TraceReader::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        for frame in reader.feed(&line) {
            host.on_frame(&frame);
        }
    }
    if let Some(frame) = reader.finish() {
        host.on_frame(&frame);
    }

    info!("Input closed, shutting down");
    drop(host);
    pump.await?;
    events.await?;
    Ok(())
}
