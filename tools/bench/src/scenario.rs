use crate::config::BenchConfig;
use rill_observability::LatencyDistributionTracker;
use rill_source::{
    CancellationToken, MultiListener, SOURCE_METRICS, SourceExt, channel, choose, combine,
    forever, iter,
};
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Zip,
    Choose,
    Combine,
    Broadcast,
    Take,
}

impl Scenario {
    pub fn label(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Choose => "choose",
            Self::Combine => "combine",
            Self::Broadcast => "broadcast",
            Self::Take => "take",
        }
    }

    /// Combinator label the scenario forks producers under, if any.
    fn forking_combinator(self) -> Option<&'static str> {
        match self {
            Self::Zip => Some("zip2"),
            Self::Choose => Some("choose"),
            Self::Combine | Self::Broadcast | Self::Take => None,
        }
    }
}

#[derive(Debug)]
enum Stage {
    Reduce,
    Verify,
}

#[derive(Debug)]
pub struct Report {
    pub scenario: Scenario,
    pub delivered: u64,
    pub expected: u64,
    pub elapsed: Duration,
}

impl Report {
    pub fn is_complete(&self) -> bool {
        self.delivered == self.expected
    }
}

pub async fn run(
    scenario: Scenario,
    config: &BenchConfig,
    token: &CancellationToken,
) -> anyhow::Result<Report> {
    let mut latency = LatencyDistributionTracker::new(scenario.label());
    let items = config.items;
    let fan_out = config.fan_out.max(1);
    tracing::info!(scenario = scenario.label(), items, fan_out, "starting scenario");

    let (delivered, expected) = match scenario {
        Scenario::Zip => {
            let zipped = iter(0..items).zip(iter(0..items).map(|x| x * 2));
            (zipped.count(token).await?, items)
        }
        Scenario::Choose => {
            let merged = choose((0..fan_out as u64).map(|i| iter(i * items..(i + 1) * items).boxed()));
            (merged.count(token).await?, fan_out as u64 * items)
        }
        Scenario::Combine => {
            let combined = combine((0..fan_out).map(|_| iter(0..items)));
            (combined.count(token).await?, fan_out as u64 * items)
        }
        Scenario::Broadcast => (broadcast(items, fan_out, token).await?, fan_out as u64 * items),
        Scenario::Take => {
            let taken = forever(1u64).take(items.try_into()?);
            (taken.count(token).await?, items)
        }
    };
    latency.record_stage(Stage::Reduce, "reduce");

    if let Some(combinator) = scenario.forking_combinator() {
        let leaked = SOURCE_METRICS.active_tasks[&combinator].get();
        anyhow::ensure!(leaked == 0, "{leaked} {combinator} producer(s) outlived the reduction");
    }
    latency.record_stage(Stage::Verify, "verify");

    tracing::info!(
        scenario = scenario.label(),
        delivered,
        expected,
        %latency,
        "scenario finished"
    );
    Ok(Report {
        scenario,
        delivered,
        expected,
        elapsed: latency.total(),
    })
}

/// Feeds `items` through one hub to `subscribers` listeners, returning the sum of deliveries.
async fn broadcast(items: u64, subscribers: usize, token: &CancellationToken) -> anyhow::Result<u64> {
    let (feed, upstream) = channel();
    let hub = MultiListener::new(upstream);

    let mut listeners = JoinSet::new();
    for _ in 0..subscribers {
        let hub = hub.clone();
        let token = token.clone();
        listeners.spawn(async move { hub.count(&token).await });
    }
    // items sent before everyone is attached would be missed by late subscribers
    while hub.subscriber_count() < subscribers && !token.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for item in 0..items {
        feed.send(item);
    }
    drop(feed);

    let mut delivered = 0;
    while let Some(joined) = listeners.join_next().await {
        delivered += joined??;
    }
    tracing::debug!(pumping = hub.is_pumping(), "all subscribers finished");
    Ok(delivered)
}
