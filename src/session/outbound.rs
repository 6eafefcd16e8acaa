//! Outbound byte sink abstraction.

use std::io;

use tokio::sync::mpsc;

/// Where a session writes encoded commands.
///
/// Implementations must keep bytes in the order they were sent. After
/// [`end`](Outbound::end) no further writes are allowed.
pub trait Outbound {
    /// Queue `bytes` for the solver's stdin.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Signal end of input to the solver.
    fn end(&mut self) -> io::Result<()>;
}

/// Outbound sink that hands byte buffers to a writer task.
///
/// The writer task owns the child's stdin; dropping the sender on
/// [`end`](Outbound::end) is its cue to close the pipe.
#[derive(Debug)]
pub struct ChannelOutbound {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelOutbound {
    /// Create a sink and the receiving end for the writer task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl Outbound for ChannelOutbound {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "outbound stream ended"))?;
        tx.send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "solver stdin writer stopped"))
    }

    fn end(&mut self) -> io::Result<()> {
        self.tx = None;
        Ok(())
    }
}
