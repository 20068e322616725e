//! Per-session view of the shared reply channel.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use crate::classifier::{ReplyOutcome, classify_reply};
use crate::transport::{Reply, ReplyStream};

/// Filters the broadcast channel down to replies about one account.
pub struct ReplyFeed {
    stream: ReplyStream,
    subject: String,
    service_author: Option<String>,
}

impl ReplyFeed {
    pub fn new(
        stream: ReplyStream,
        subject: impl Into<String>,
        service_author: Option<String>,
    ) -> Self {
        Self {
            stream,
            subject: subject.into(),
            service_author,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    fn from_service(&self, reply: &Reply) -> bool {
        self.service_author
            .as_deref()
            .is_none_or(|author| reply.author_id == author)
    }

    /// Next outcome about this account accepted by `accept`, waiting at most
    /// `wait`. `None` on timeout or when the channel ends.
    pub async fn next_outcome(
        &mut self,
        wait: Duration,
        accept: impl Fn(&ReplyOutcome) -> bool,
    ) -> Option<ReplyOutcome> {
        let deadline = Instant::now() + wait;
        loop {
            let reply = match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    tracing::debug!(subject = %self.subject, "reply channel ended");
                    return None;
                }
                Err(_) => return None,
            };
            if !self.from_service(&reply) {
                continue;
            }
            let outcome = classify_reply(&reply, &self.subject);
            if !outcome.is_related() {
                continue;
            }
            if accept(&outcome) {
                return Some(outcome);
            }
            tracing::debug!(
                subject = %self.subject,
                outcome = outcome.name(),
                "skipping reply while waiting"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn feed(replies: Vec<Reply>, service_author: Option<&str>) -> ReplyFeed {
        let stream = stream::iter(replies).chain(stream::pending()).boxed();
        ReplyFeed::new(stream, "alice", service_author.map(str::to_string))
    }

    #[tokio::test(start_paused = true)]
    async fn skips_other_accounts_and_authors() {
        let mut feed = feed(
            vec![
                Reply::embed("1", "bot", "bob", "Deposited 10 cash"),
                Reply::embed("2", "impostor", "alice", "Deposited 99 cash"),
                Reply::embed("3", "bot", "alice", "Deposited 1,200 cash"),
            ],
            Some("bot"),
        );
        let outcome = feed
            .next_outcome(Duration::from_secs(5), ReplyOutcome::is_related)
            .await;
        assert_eq!(
            outcome,
            Some(ReplyOutcome::DepositConfirmed {
                amount: Some(1_200)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn filter_skips_related_but_unwanted() {
        let mut feed = feed(
            vec![
                Reply::embed("1", "bot", "alice", "You can next work in 2 hours"),
                Reply::embed("2", "bot", "alice", "Role income successfully collected!"),
            ],
            None,
        );
        let outcome = feed
            .next_outcome(Duration::from_secs(5), ReplyOutcome::is_collect_result)
            .await;
        assert!(matches!(outcome, Some(ReplyOutcome::CollectSuccess { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_related_reply() {
        let mut feed = feed(vec![Reply::plain("1", "bot", "nothing for you")], None);
        let started = Instant::now();
        let outcome = feed
            .next_outcome(Duration::from_secs(10), ReplyOutcome::is_related)
            .await;
        assert_eq!(outcome, None);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn ended_channel_yields_none() {
        let mut feed = ReplyFeed::new(stream::empty().boxed(), "alice", None);
        assert_eq!(
            feed.next_outcome(Duration::from_secs(1), ReplyOutcome::is_related)
                .await,
            None
        );
    }
}
