use anyhow::Result;
use std::collections::HashSet;
use tracing::warn;

use crate::domain::notification::NotificationRecord;
use crate::domain::push::{ErrorDetails, GatewayErrorKind};
use crate::infra::devices::DeviceDirectory;

/// Result of partitioning a batch of failed sends.
pub struct ClassifiedFailures {
    /// Kept and persisted for a later backoff retry.
    pub transient: Vec<NotificationRecord>,
    /// Resolved on the spot; callers drop or delete these.
    pub non_transient: Vec<NotificationRecord>,
}

pub struct FailureClassifier<D> {
    devices: D,
}

impl<D: DeviceDirectory> FailureClassifier<D> {
    pub fn new(devices: D) -> Self {
        Self { devices }
    }

    /// Partition freshly rejected sends. A "destination gone" rejection is
    /// resolvable: the dead token is cleared once per destination in the
    /// batch and the record is not worth retrying. Every other code is
    /// logged and retried on backoff, since unknown failure modes are often
    /// infrastructure blips.
    pub async fn handle_non_transient_ticket_errors(
        &self,
        failed: Vec<NotificationRecord>,
    ) -> Result<ClassifiedFailures> {
        let mut transient = Vec::new();
        let mut non_transient = Vec::new();
        let mut disabled: HashSet<String> = HashSet::new();

        for record in failed {
            let Some(details) = record.error_ticket.clone() else {
                // Only records off a failed attempt belong here.
                warn!(id = %record.id, "failed record without error ticket, keeping for retry");
                transient.push(record);
                continue;
            };

            match details.kind() {
                GatewayErrorKind::DeviceNotRegistered => {
                    if disabled.insert(record.to.clone()) {
                        self.devices.disable_destination(&record.to).await?;
                    }
                    non_transient.push(record);
                }
                GatewayErrorKind::MessageRateExceeded
                | GatewayErrorKind::MessageTooBig
                | GatewayErrorKind::InvalidCredentials
                | GatewayErrorKind::Unknown => {
                    warn!(code = %details.error, id = %record.id, "unhandled ticket error, will retry");
                    transient.push(record);
                }
            }
        }

        Ok(ClassifiedFailures {
            transient,
            non_transient,
        })
    }

    /// Verdict for a receipt-stage failure: true means a later retry may
    /// succeed. The default here is the opposite of the ticket path — the
    /// gateway already accepted this message once, so an unknown receipt
    /// error is treated as unrecoverable instead of retried indefinitely.
    pub async fn handle_receipt_error(
        &self,
        record: &NotificationRecord,
        details: &ErrorDetails,
    ) -> Result<bool> {
        match details.kind() {
            GatewayErrorKind::DeviceNotRegistered => {
                self.devices.disable_destination(&record.to).await?;
                Ok(false)
            }
            GatewayErrorKind::MessageRateExceeded => Ok(true),
            GatewayErrorKind::MessageTooBig
            | GatewayErrorKind::InvalidCredentials
            | GatewayErrorKind::Unknown => {
                warn!(code = %details.error, id = %record.id, "unhandled receipt error, dropping record");
                Ok(false)
            }
        }
    }
}
