use rill_integration_tests::wait_until;
use rill_source::{CancellationToken, MultiListener, SourceError, SourceExt, channel};
use std::time::Duration;

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn pump_runs_if_and_only_if_someone_listens() -> anyhow::Result<()> {
    let (feed, upstream) = channel::<u32>();
    let hub = MultiListener::new(upstream);
    assert!(!hub.is_pumping());

    let listeners: Vec<_> = (0..3)
        .map(|_| {
            let hub = hub.clone();
            tokio::spawn(async move { hub.take(10).count(&CancellationToken::new()).await })
        })
        .collect();
    wait_until("three subscribers attached", || hub.subscriber_count() == 3).await?;
    assert!(hub.is_pumping());

    for item in 0..10 {
        feed.send(item);
    }
    for listener in listeners {
        assert_eq!(listener.await??, 10);
    }
    wait_until("every subscriber detached", || hub.subscriber_count() == 0).await?;
    wait_until("the pump stopped", || !hub.is_pumping()).await?;

    // the upstream is still open, a new subscriber resumes pumping
    let resumed = tokio::spawn({
        let hub = hub.clone();
        async move { hub.take(2).collect(&CancellationToken::new()).await }
    });
    wait_until("the pump restarted", || hub.is_pumping()).await?;
    feed.send(100);
    feed.send(101);
    assert_eq!(resumed.await??, vec![100, 101]);
    wait_until("the pump stopped again", || !hub.is_pumping()).await?;
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn late_subscribers_only_see_later_items() -> anyhow::Result<()> {
    let (feed, upstream) = channel::<&'static str>();
    let hub = MultiListener::new(upstream);
    let token = CancellationToken::new();

    let early = tokio::spawn({
        let hub = hub.clone();
        let token = token.clone();
        async move { hub.take(3).collect(&token).await }
    });
    wait_until("early subscriber attached", || hub.subscriber_count() == 1).await?;
    feed.send("first");

    // the early subscriber has to see `first` before the late one attaches
    tokio::time::sleep(Duration::from_millis(50)).await;
    let late = tokio::spawn({
        let hub = hub.clone();
        let token = token.clone();
        async move { hub.take(2).collect(&token).await }
    });
    wait_until("late subscriber attached", || hub.subscriber_count() == 2).await?;
    feed.send("second");
    feed.send("third");

    assert_eq!(early.await??, vec!["first", "second", "third"]);
    assert_eq!(late.await??, vec!["second", "third"]);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn upstream_fault_reaches_every_subscriber() -> anyhow::Result<()> {
    let (feed, upstream) = channel::<u8>();
    let hub = MultiListener::new(upstream);
    let token = CancellationToken::new();

    let listeners: Vec<_> = (0..2)
        .map(|_| {
            let hub = hub.clone();
            let token = token.clone();
            tokio::spawn(async move { hub.count(&token).await })
        })
        .collect();
    wait_until("both subscribers attached", || hub.subscriber_count() == 2).await?;
    feed.send(1);
    feed.fail(anyhow::anyhow!("sensor offline"));

    for listener in listeners {
        let err = listener.await?.unwrap_err();
        assert!(err.downcast_ref::<SourceError>().is_some(), "{err:#}");
        assert!(format!("{err:#}").contains("sensor offline"), "{err:#}");
    }

    // a subscriber arriving after the fault ends the same way
    let err = hub.count(&token).await.unwrap_err();
    assert!(format!("{err:#}").contains("sensor offline"), "{err:#}");
    assert!(!hub.is_pumping());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn cancelled_subscriber_detaches() -> anyhow::Result<()> {
    let (_feed, upstream) = channel::<u8>();
    let hub = MultiListener::new(upstream);
    let token = CancellationToken::new();

    let subscriber = tokio::spawn({
        let hub = hub.clone();
        let token = token.clone();
        async move { hub.count(&token).await }
    });
    wait_until("subscriber attached", || hub.is_pumping()).await?;
    token.cancel();
    assert_eq!(subscriber.await??, 0);
    wait_until("the pump stopped", || !hub.is_pumping()).await?;
    assert_eq!(hub.subscriber_count(), 0);
    Ok(())
}
