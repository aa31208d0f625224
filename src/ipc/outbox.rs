use std::io::Write;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;

enum Outgoing {
    Line(String),
    Flushed(std_mpsc::Sender<()>),
}

/// Line-oriented JSON writer shared by request handling and refresh tasks.
///
/// `send` only queues the line; a dedicated thread does the writing, so a
/// stalled stdout never blocks a caller that holds a lock. Lines are written
/// in the order they were sent.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    pub fn new(mut w: Box<dyn Write + Send>) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
        std::thread::Builder::new()
            .name("gradebookd-outbox".to_string())
            .spawn(move || {
                while let Some(msg) = rx.blocking_recv() {
                    match msg {
                        Outgoing::Line(line) => {
                            if let Err(e) = writeln!(w, "{}", line).and_then(|_| w.flush()) {
                                tracing::error!(error = %e, "failed to write output line");
                            }
                        }
                        Outgoing::Flushed(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })?;
        Ok(Self { tx })
    }

    pub fn stdout() -> std::io::Result<Self> {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn send(&self, value: &serde_json::Value) {
        let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        if self.tx.send(Outgoing::Line(line)).is_err() {
            tracing::error!("output writer is gone; dropping line");
        }
    }

    /// Blocks until every line sent before this call has been written.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        if self.tx.send(Outgoing::Flushed(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}
