//! Orchestrator behavior: intent gating, cancellation, connection loss.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use pilot_gateway::Orchestrator;

use common::{
    FakePage, mock_create, mock_debug, mock_delete, services, test_config, wait_until_matched,
};

/// Wait until the page has started a navigation.
async fn wait_for_navigation(page: &FakePage) {
    for _ in 0..200 {
        if page.calls().iter().any(|c| c.starts_with("goto:")) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("navigation never started");
}

#[tokio::test]
async fn require_intent_rejects_chit_chat_without_a_session() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", "/sessions")
        .expect(0)
        .create_async()
        .await;
    let cfg = test_config(&server.url(), true);
    let orchestrator = Orchestrator::new("chat", services(&cfg, Arc::new(FakePage::default())));

    let response = orchestrator
        .handle_message("draw a cat wearing a hat", true)
        .await;
    assert!(!response.success);
    assert!(response.message.starts_with("Not a browser command"));
    assert!(orchestrator.session().await.is_none());
    create.assert_async().await;
}

#[tokio::test]
async fn prefix_is_stripped_before_planning() {
    let mut server = mockito::Server::new_async().await;
    let _create = mock_create(&mut server, "s-p").await;
    let _debug = mock_debug(&mut server, "s-p").await;
    let cfg = test_config(&server.url(), true);
    let orchestrator = Orchestrator::new("chat", services(&cfg, Arc::new(FakePage::default())));

    let response = orchestrator.handle_message("> go to docs.rs", true).await;
    assert!(response.success);
    assert_eq!(response.actions, vec!["navigate(https://docs.rs)"]);
}

#[tokio::test]
async fn stop_cancels_remaining_actions() {
    let mut server = mockito::Server::new_async().await;
    let _create = mock_create(&mut server, "s-c").await;
    let _debug = mock_debug(&mut server, "s-c").await;
    let cfg = test_config(&server.url(), true);
    let page = Arc::new(FakePage::slow(Duration::from_secs(5)));
    let orchestrator = Arc::new(Orchestrator::new(
        "chat",
        services(&cfg, Arc::clone(&page)),
    ));

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_command("go to example.com").await })
    };

    wait_for_navigation(&page).await;
    assert!(orchestrator.stop().await);

    let response = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.results[0].error.as_deref(), Some("cancelled"));
    assert!(!orchestrator.stop().await);
}

#[tokio::test]
async fn new_command_supersedes_running_one() {
    let mut server = mockito::Server::new_async().await;
    let _create = mock_create(&mut server, "s-n").await;
    let _debug = mock_debug(&mut server, "s-n").await;
    let cfg = test_config(&server.url(), true);
    let page = Arc::new(FakePage::slow(Duration::from_millis(300)));
    let orchestrator = Arc::new(Orchestrator::new(
        "chat",
        services(&cfg, Arc::clone(&page)),
    ));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_command("go to first.example").await })
    };
    wait_for_navigation(&page).await;

    let second = orchestrator.run_command("go to second.example").await;
    let first = first.await.unwrap();

    assert_eq!(first.results[0].error.as_deref(), Some("cancelled"));
    assert!(second.success);
    assert_eq!(
        second.results[0].url.as_deref(),
        Some("https://second.example")
    );
}

#[tokio::test]
async fn lost_connection_invalidates_the_session() {
    let mut server = mockito::Server::new_async().await;
    let _create = mock_create(&mut server, "s-l").await;
    let _debug = mock_debug(&mut server, "s-l").await;
    let delete = mock_delete(&mut server, "s-l", 200).await;
    let cfg = test_config(&server.url(), true);
    let page = Arc::new(FakePage::default());
    let orchestrator = Orchestrator::new("chat", services(&cfg, Arc::clone(&page)));

    assert!(orchestrator.run_command("go to example.com").await.success);

    page.closed.store(true, Ordering::SeqCst);
    let response = orchestrator.run_command("go to example.org").await;
    assert!(!response.success);
    assert!(
        response.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("connection closed")
    );

    assert!(wait_until_matched(&delete).await);
    assert!(orchestrator.session().await.is_none());
}

#[tokio::test]
async fn close_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let _create = mock_create(&mut server, "s-x").await;
    let _debug = mock_debug(&mut server, "s-x").await;
    let delete = mock_delete(&mut server, "s-x", 200).await;
    let cfg = test_config(&server.url(), true);
    let orchestrator = Orchestrator::new("chat", services(&cfg, Arc::new(FakePage::default())));

    orchestrator.run_command("go to example.com").await;
    assert_eq!(orchestrator.close().await.as_deref(), Some("s-x"));
    assert_eq!(orchestrator.close().await, None);
    delete.assert_async().await;
}
