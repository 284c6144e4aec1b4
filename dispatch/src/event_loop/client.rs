use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::error::SendError;

use super::engine::{LoopCommand, LoopTask};

/// Client handle for posting work to the event loop thread.
///
/// Cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct EventLoopClient {
    sender: UnboundedSender<LoopCommand>,
}

impl EventLoopClient {
    pub(super) fn new(sender: UnboundedSender<LoopCommand>) -> Self {
        Self { sender }
    }

    /// Post a task. Hands the task back if the loop has stopped.
    pub fn spawn(&self, task: Box<dyn LoopTask>) -> Result<(), Box<dyn LoopTask>> {
        self.sender
            .send(LoopCommand::Spawn { task })
            .map_err(|SendError(command)| match command {
                LoopCommand::Spawn { task } => task,
                LoopCommand::Shutdown => unreachable!("sent a spawn command"),
            })
    }

    /// Stop the loop. Tasks already running are dropped.
    pub fn shutdown(&self) {
        let _ = self.sender.send(LoopCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
