use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

pub const DEBUG_ENV: &str = "ETHERFLOW_DEBUG";

/// Tees formatted log lines into a broadcast channel (tailed by
/// `/api/logs`) and, unless suppressed, to stdout.
#[derive(Clone)]
pub(crate) struct SseMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for SseMakeWriter {
    type Writer = SseWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SseWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct SseWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for SseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(line); // no receivers is fine
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

fn max_level() -> Level {
    match std::env::var(DEBUG_ENV).as_deref() {
        Ok("1") | Ok("true") => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber and returns the log fan-out sender.
/// Interactive commands pass `quiet` so log lines don't interleave with
/// prompts; the lines still reach the channel.
pub(crate) fn init_logging(quiet: bool) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(500);
    let make_writer = SseMakeWriter {
        sender: log_tx.clone(),
        suppress_stdout: quiet,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level())
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // already set in tests
    log_tx
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn writer_forwards_lines_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let make = SseMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        let mut w = make.make_writer();
        assert_eq!(w.write(b"hello\n").unwrap(), 6);
        w.flush().unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello\n");
    }

    #[test]
    fn writer_without_receivers_still_succeeds() {
        let (tx, _) = broadcast::channel::<String>(1);
        let make = SseMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        assert!(make.make_writer().write(b"dropped").is_ok());
    }
}
