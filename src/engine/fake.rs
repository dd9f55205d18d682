// In-memory transfer manager used by the engine tests

use crate::api::client::TransferApi;
use crate::core::error::ClientError;
use crate::models::transfer::{ShareLimit, Transfer};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetShareLimits(Vec<String>, ShareLimit),
    Delete(Vec<String>, bool),
    MoveToTop(Vec<String>),
}

#[derive(Default)]
pub struct FakeTransferManager {
    pub transfers: Mutex<Vec<Transfer>>,
    pub calls: Mutex<Vec<Call>>,
    pub fail_fetch: bool,
    /// Share-limit calls fail while leaving other commands working
    pub fail_share_limits: bool,
}

impl FakeTransferManager {
    pub fn with(transfers: Vec<Transfer>) -> Self {
        Self {
            transfers: Mutex::new(transfers),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining_ids(&self) -> Vec<String> {
        self.transfers
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.id.clone())
            .collect()
    }
}

impl TransferApi for FakeTransferManager {
    async fn fetch_transfers(&self) -> Result<Vec<Transfer>, ClientError> {
        if self.fail_fetch {
            return Err(ClientError::InvalidResponse("connection reset".to_string()));
        }
        Ok(self.transfers.lock().unwrap().clone())
    }

    async fn set_share_limits(&self, ids: &[String], limit: ShareLimit) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::SetShareLimits(ids.to_vec(), limit));

        if self.fail_share_limits {
            return Err(ClientError::InvalidResponse("setShareLimits failed".to_string()));
        }

        for transfer in self.transfers.lock().unwrap().iter_mut() {
            if ids.contains(&transfer.id) {
                transfer.share_limit = limit;
            }
        }
        Ok(())
    }

    async fn delete_transfers(&self, ids: &[String], delete_files: bool) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(ids.to_vec(), delete_files));

        self.transfers
            .lock()
            .unwrap()
            .retain(|transfer| !ids.contains(&transfer.id));
        Ok(())
    }

    async fn move_to_top(&self, ids: &[String]) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(Call::MoveToTop(ids.to_vec()));
        Ok(())
    }
}
