use tracing::{debug, info};

use crate::clock::{elapsed_since, Clock};
use crate::error::Result;
use crate::monitoring::{OperationRecord, TransactionStatus};
use crate::transport::{CandidateFilter, Receiver};

/// Delete every message in the probe mailbox
///
/// Stale probes left over from timed out runs would otherwise be listed on
/// every future poll. Receiver errors abort the purge.
pub async fn purge_mailbox<R>(receiver: &mut R, clock: &dyn Clock) -> Result<OperationRecord>
where
    R: Receiver + ?Sized,
{
    let executed_at = clock.now();

    let candidates = receiver.list_candidates(&CandidateFilter::all()).await?;
    debug!("Deleting <{}> messages", candidates.len());

    for candidate in &candidates {
        receiver.consume(candidate).await?;
    }

    let record = OperationRecord {
        executed_at,
        duration_ms: u64::try_from(elapsed_since(clock, executed_at).as_millis())
            .unwrap_or(u64::MAX),
        status: TransactionStatus::Success,
        affected: candidates.len(),
    };

    info!("{}", record);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MailflowError;
    use crate::monitoring::Protocol;
    use crate::transport::{Candidate, MockReceiver};
    use chrono::{TimeZone, Utc};

    fn candidate(id: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            subject: "stale".to_string(),
            body: String::new(),
            trace_headers: String::new(),
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_purge_consumes_everything() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        let mut receiver = MockReceiver::new();
        receiver
            .expect_list_candidates()
            .withf(|filter| *filter == CandidateFilter::all())
            .times(1)
            .returning(|_| Ok(vec![candidate("1"), candidate("2"), candidate("3")]));
        receiver.expect_consume().times(3).returning(|_| Ok(()));

        let record = purge_mailbox(&mut receiver, &clock).await.unwrap();

        assert_eq!(record.affected, 3);
        assert_eq!(record.executed_at, start);
        assert_eq!(record.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_purge_stops_on_error() {
        let clock = ManualClock::new(Utc::now());

        let mut receiver = MockReceiver::new();
        receiver
            .expect_list_candidates()
            .returning(|_| Ok(vec![candidate("1"), candidate("2")]));
        receiver
            .expect_consume()
            .times(1)
            .returning(|_| Err(MailflowError::transport(Protocol::Imap, "expunge failed")));

        assert!(matches!(
            purge_mailbox(&mut receiver, &clock).await,
            Err(MailflowError::Transport { .. })
        ));
    }
}
