//! Commission gate.
//!
//! Master deposits wait until every commission-paying session has passed
//! (or abandoned) its commission step. Each such session holds a
//! [`CommissionTicket`]; the gate opens when the last ticket is released.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CommissionGate {
    pending: Arc<watch::Sender<usize>>,
}

impl Default for CommissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommissionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            pending: Arc::new(tx),
        }
    }

    /// Register one more session that must finish its commission step.
    pub fn ticket(&self) -> CommissionTicket {
        self.pending.send_modify(|n| *n += 1);
        CommissionTicket {
            pending: Some(Arc::clone(&self.pending)),
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once no ticket is outstanding.
    pub async fn settled(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Outstanding commission step. Released explicitly or on drop.
#[derive(Debug)]
pub struct CommissionTicket {
    pending: Option<Arc<watch::Sender<usize>>>,
}

impl CommissionTicket {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }
}

impl Drop for CommissionTicket {
    fn drop(&mut self) {
        self.release_inner();
    }
}
