use std::time::Duration;

use alloy::primitives::{address, Address, I256};
use tokio::time::Instant;

use crate::rate_limit::RateGate;
use crate::reconstruct::BalanceReconstructor;
use crate::retry::RetryPolicy;
use crate::testutils::*;
use crate::transfer::tests::{transfer, transfer_at};
use crate::transfer::TransferEvent;
use crate::Error;

const TOKEN: Address = address!("0xdac17f958d2ee523a2206206994597c13d831ec7");
const A: Address = address!("0x000000000000000000000000000000000000000a");
const B: Address = address!("0x000000000000000000000000000000000000000b");
const C: Address = address!("0x000000000000000000000000000000000000000c");

fn reconstructor(
    explorer: MockExplorer,
    page_size: u64,
    max_result_window: u64,
) -> BalanceReconstructor<MockExplorer> {
    BalanceReconstructor::new(
        explorer,
        RateGate::new(Duration::from_millis(210)),
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        },
        page_size,
        max_result_window,
    )
}

fn explorer(events: Vec<TransferEvent>) -> MockExplorer {
    MockExplorer::new(1_000, 12).with_events(events)
}

fn blocks(events: &[TransferEvent]) -> Vec<u64> {
    events.iter().map(|event| event.block_number).collect()
}

fn i256(value: i64) -> I256 {
    I256::try_from(value).unwrap()
}

#[tokio::test(start_paused = true)]
async fn two_hop_scenario() {
    let subject = reconstructor(
        explorer(vec![transfer(B, C, 60, 11), transfer(A, B, 100, 10)]),
        100,
        10_000,
    );

    let result = subject.reconstruct(TOKEN, 10, 11).await.unwrap();

    assert_eq!(result.balances.get(&A), i256(-100));
    assert_eq!(result.balances.get(&B), i256(40));
    assert_eq!(result.balances.get(&C), i256(60));
    assert_eq!(result.balances.len(), 3);
    assert_eq!(result.pages, 1);

    let before_second_hop = result.snapshot(10).unwrap();
    assert_eq!(before_second_hop.get(&B), i256(100));
    assert_eq!(before_second_hop.get(&C), I256::ZERO);
}

#[tokio::test(start_paused = true)]
async fn window_boundaries_are_inclusive() {
    let mut source = explorer(vec![
        transfer(A, B, 1, 9),
        transfer(A, B, 2, 10),
        transfer(A, B, 4, 20),
        transfer(A, B, 8, 21),
    ]);
    source.ignore_end_block = true;
    let subject = reconstructor(source, 100, 10_000);

    let result = subject.reconstruct(TOKEN, 10, 20).await.unwrap();

    assert_eq!(blocks(&result.events), vec![10, 20]);
    assert_eq!(result.balances.get(&B), i256(6));
}

#[tokio::test(start_paused = true)]
async fn stops_on_short_page_without_phantom_request() {
    let events = (1..=5).map(|block| transfer(A, B, 1, block)).collect();
    let subject = reconstructor(explorer(events), 2, 10_000);

    let result = subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    assert_eq!(result.events.len(), 5);
    assert_eq!(
        *subject.source().requests.borrow(),
        vec![(0, 100, 1, 2), (0, 100, 2, 2), (0, 100, 3, 2)]
    );
    assert_eq!(result.pages, 3);
}

#[tokio::test(start_paused = true)]
async fn exact_multiple_of_page_size_ends_on_empty_page() {
    let events = (1..=4).map(|block| transfer(A, B, 1, block)).collect();
    let subject = reconstructor(explorer(events), 2, 10_000);

    let result = subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    assert_eq!(result.events.len(), 4);
    assert_eq!(subject.source().requests.borrow().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn stops_once_records_pass_end_block() {
    let mut source = explorer(
        [10, 11, 25, 26, 27]
            .into_iter()
            .map(|block| transfer(A, B, 1, block))
            .collect(),
    );
    source.ignore_end_block = true;
    let subject = reconstructor(source, 2, 10_000);

    let result = subject.reconstruct(TOKEN, 10, 20).await.unwrap();

    assert_eq!(blocks(&result.events), vec![10, 11]);
    assert_eq!(subject.source().requests.borrow().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn orders_events_regardless_of_page_order() {
    let mut source = explorer(vec![
        transfer_at(A, B, 5, 30, 2),
        transfer_at(B, C, 5, 30, 7),
        transfer_at(A, C, 1, 12, 0),
        transfer_at(C, A, 1, 31, 1),
    ]);
    source.reverse_pages = true;
    let subject = reconstructor(source, 3, 10_000);

    let result = subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    let order: Vec<(u64, u64)> = result.events.iter().map(TransferEvent::order_key).collect();
    assert_eq!(order, vec![(12, 0), (30, 2), (30, 7), (31, 1)]);
    assert_eq!(result.balances.get(&C), i256(5));
    assert_eq!(result.balances.net_total(), Some(I256::ZERO));
}

#[tokio::test(start_paused = true)]
async fn rebases_when_result_window_is_full() {
    let events = [1, 2, 3, 3, 4, 5, 6]
        .into_iter()
        .enumerate()
        .map(|(index, block)| transfer_at(A, B, 1, block, index as u64))
        .collect();
    let subject = reconstructor(explorer(events), 2, 4);

    let result = subject.reconstruct(TOKEN, 1, 100).await.unwrap();

    assert_eq!(blocks(&result.events), vec![1, 2, 3, 3, 4, 5, 6]);
    assert_eq!(result.balances.get(&B), i256(7));
    assert_eq!(
        *subject.source().requests.borrow(),
        vec![
            (1, 100, 1, 2),
            (1, 100, 2, 2),
            (3, 100, 1, 2),
            (3, 100, 2, 2),
            (5, 100, 1, 2),
            (5, 100, 2, 2),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn single_block_filling_result_window_fails() {
    let events = (0..5).map(|index| transfer_at(A, B, 1, 7, index)).collect();
    let subject = reconstructor(explorer(events), 2, 4);

    let error = subject.reconstruct(TOKEN, 1, 100).await.unwrap_err();

    match error {
        Error::DataSource { source, .. } => assert!(matches!(
            *source,
            Error::ResultWindowExhausted {
                block: 7,
                window: 4
            }
        )),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_from_rate_limit() {
    let source = explorer(vec![transfer(A, B, 100, 10)]);
    source.fail_next([rate_limited(), rate_limited()]);
    let subject = reconstructor(source, 100, 10_000);
    let start = Instant::now();

    let result = subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    assert_eq!(result.balances.get(&B), i256(100));
    assert_eq!(subject.source().requests.borrow().len(), 3);
    // 500ms and 1s of backoff
    assert!(start.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_abort_without_balances() {
    let source = explorer(vec![transfer(A, B, 100, 10)]);
    source.fail_next((0..4).map(|_| timeout()));
    let subject = reconstructor(source, 100, 10_000);

    let error = subject.reconstruct(TOKEN, 0, 100).await.unwrap_err();

    match error {
        Error::DataSource {
            page,
            attempts,
            source,
        } => {
            assert_eq!(page, 1);
            assert_eq!(attempts, 4);
            assert!(matches!(*source, Error::Timeout(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_request_is_not_retried() {
    let source = explorer(vec![]);
    source.fail_next([Error::ExplorerApi {
        message: "NOTOK".into(),
        result: "Invalid API Key".into(),
    }]);
    let subject = reconstructor(source, 100, 10_000);

    let error = subject.reconstruct(TOKEN, 0, 100).await.unwrap_err();

    assert!(matches!(error, Error::DataSource { attempts: 1, .. }));
    assert_eq!(subject.source().requests.borrow().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn spaces_page_requests() {
    let events = (1..=5).map(|block| transfer(A, B, 1, block)).collect();
    let subject = reconstructor(explorer(events), 2, 10_000);
    let start = Instant::now();

    subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(420));
}

#[tokio::test(start_paused = true)]
async fn empty_window_gives_empty_balances() {
    let subject = reconstructor(explorer(vec![]), 100, 10_000);

    let result = subject.reconstruct(TOKEN, 0, 100).await.unwrap();

    assert!(result.balances.is_empty());
    assert_eq!(result.pages, 1);
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let subject = reconstructor(explorer(vec![]), 100, 10_000);

    let error = subject.reconstruct(TOKEN, 5, 4).await.unwrap_err();

    assert!(matches!(error, Error::InvalidWindow { .. }));
    assert!(subject.source().requests.borrow().is_empty());
}
