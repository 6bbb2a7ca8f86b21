use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy)]
pub enum ShutdownEvent {
    Graceful,
    Immediate,
}

/// First ctrl-c requests a graceful shutdown; a second one demands an
/// immediate exit.
pub fn spawn_ctrl_c_handler(tx: mpsc::UnboundedSender<ShutdownEvent>) {
    tokio::spawn(async move {
        let mut signals = 0u8;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            signals += 1;
            let event = if signals == 1 {
                ShutdownEvent::Graceful
            } else {
                ShutdownEvent::Immediate
            };
            if tx.send(event).is_err() || matches!(event, ShutdownEvent::Immediate) {
                return;
            }
        }
    });
}
