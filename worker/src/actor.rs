use kv_route_protocol::BlockHash;
use kv_route_worker_cache::{BlockCacheError, BlockStats, LatencyConfig, Scheduler, Task};
use tokio::sync::{mpsc, oneshot};

enum Command {
    Admit {
        request_id: String,
        sequence: Vec<BlockHash>,
        decode_tokens: u32,
        respond_to: oneshot::Sender<Result<Task, BlockCacheError>>,
    },
    Complete {
        request_id: String,
        respond_to: oneshot::Sender<Option<Task>>,
    },
    CurrentLoadMs {
        respond_to: oneshot::Sender<f64>,
    },
    Stats {
        respond_to: oneshot::Sender<BlockStats>,
    },
    TakeEvictions {
        respond_to: oneshot::Sender<Vec<BlockHash>>,
    },
    ResidentHashes {
        respond_to: oneshot::Sender<Vec<BlockHash>>,
    },
}

/// Owns the one [`Scheduler`] instance exclusively and serves requests sent
/// over an `mpsc` channel, so every mutation is totally ordered without a
/// shared lock across request-handling tasks.
struct Actor {
    scheduler: Scheduler,
    receiver: mpsc::Receiver<Command>,
}

impl Actor {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                Command::Admit {
                    request_id,
                    sequence,
                    decode_tokens,
                    respond_to,
                } => {
                    let result = self
                        .scheduler
                        .admit(request_id, sequence, decode_tokens)
                        .map(|task| task.clone());
                    let _ = respond_to.send(result);
                }
                Command::Complete {
                    request_id,
                    respond_to,
                } => {
                    let task = self.scheduler.complete(&request_id);
                    let _ = respond_to.send(task);
                }
                Command::CurrentLoadMs { respond_to } => {
                    let _ = respond_to.send(self.scheduler.current_load_ms());
                }
                Command::Stats { respond_to } => {
                    let _ = respond_to.send(self.scheduler.stats());
                }
                Command::TakeEvictions { respond_to } => {
                    let _ = respond_to.send(self.scheduler.take_evictions());
                }
                Command::ResidentHashes { respond_to } => {
                    let _ = respond_to.send(self.scheduler.resident_hashes());
                }
            }
        }
    }
}

/// Cloneable front for the scheduler actor. Every method sends a command
/// and awaits the reply; the actor task processes them one at a time.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    pub fn spawn(capacity: usize, config: LatencyConfig) -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        let actor = Actor {
            scheduler: Scheduler::new(capacity, config),
            receiver,
        };
        tokio::spawn(actor.run());
        Self { sender }
    }

    pub async fn admit(
        &self,
        request_id: String,
        sequence: Vec<BlockHash>,
        decode_tokens: u32,
    ) -> Result<Task, BlockCacheError> {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::Admit {
                request_id,
                sequence,
                decode_tokens,
                respond_to,
            })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }

    pub async fn complete(&self, request_id: String) -> Option<Task> {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::Complete {
                request_id,
                respond_to,
            })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }

    pub async fn current_load_ms(&self) -> f64 {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::CurrentLoadMs { respond_to })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }

    pub async fn stats(&self) -> BlockStats {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::Stats { respond_to })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }

    pub async fn take_evictions(&self) -> Vec<BlockHash> {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::TakeEvictions { respond_to })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }

    pub async fn resident_hashes(&self) -> Vec<BlockHash> {
        let (respond_to, receive) = oneshot::channel();
        self.sender
            .send(Command::ResidentHashes { respond_to })
            .await
            .expect("scheduler actor task is gone");
        receive.await.expect("scheduler actor dropped the reply")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admit_then_complete_round_trips_through_the_actor() {
        let handle = SchedulerHandle::spawn(16, LatencyConfig::default());
        let task = handle
            .admit("r1".to_string(), vec!["a".to_string()], 0)
            .await
            .unwrap();
        assert_eq!(task.request_id, "r1");
        assert!(handle.current_load_ms().await > 0.0);

        let completed = handle.complete("r1".to_string()).await;
        assert!(completed.is_some());
        assert_eq!(handle.current_load_ms().await, 0.0);
    }

    #[tokio::test]
    async fn concurrent_admits_are_serialized_through_one_actor() {
        let handle = SchedulerHandle::spawn(4, LatencyConfig::default());
        let a = handle.admit("r1".to_string(), vec!["a".to_string()], 0);
        let b = handle.admit("r2".to_string(), vec!["b".to_string()], 0);
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(handle.stats().await.resident, 2);
    }
}
