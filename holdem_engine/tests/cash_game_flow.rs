//! Cash game sessions through the engine facade, checked against the
//! chip ledger.

use holdem_engine::{
    Engine, EngineConfig, EngineError,
    broadcast::NoopBroadcaster,
    cash::{CashGameConfig, CashGameStatus},
    db::InMemoryRepository,
    game::{HandPhase, HandView, PlayerId, SeatIndex, TableId, constants::MAX_BUY_IN},
    ledger::TransactionCause,
    table::{TableSpeed, TableView},
};
use std::{sync::Arc, time::Duration};

fn engine() -> Engine {
    Engine::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(NoopBroadcaster),
        EngineConfig::default(),
    )
}

/// Deals the next hand 20ms after the last one ends.
fn fast_engine() -> Engine {
    Engine::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(NoopBroadcaster),
        EngineConfig {
            next_hand_delay_ms: 20,
            ..EngineConfig::default()
        },
    )
}

fn config() -> CashGameConfig {
    CashGameConfig {
        name: "Friday game".to_string(),
        speed: TableSpeed::Unlimited,
        ..CashGameConfig::default()
    }
}

async fn total_balance(engine: &Engine, players: &[PlayerId]) -> i64 {
    let mut total = 0;
    for player in players {
        total += engine.balance(Some(*player)).await.unwrap();
    }
    total
}

fn player_at(view: &TableView, seat: SeatIndex) -> Option<PlayerId> {
    view.seats
        .iter()
        .find(|s| s.seat_index == seat)
        .map(|s| s.player_id)
}

async fn wait_for_hand(engine: &Engine, table_id: TableId, hand_number: u64) -> HandView {
    for _ in 0..50 {
        let view = engine.table_view(table_id, Some(1)).await.unwrap();
        if let Some(hand) = view.hand
            && hand.hand_number == hand_number
        {
            return hand;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hand {hand_number} was never dealt");
}

#[tokio::test]
async fn test_session_conserves_chips() {
    let engine = engine();
    let players = [1, 2];
    for player in players {
        engine.ledger().grant(player, 3_000).await.unwrap();
    }

    let game = engine.create_cash_game(Some(1), config()).await.unwrap();
    engine.join_cash_game(game.id, Some(1), 1_000, None).await.unwrap();
    engine.join_cash_game(game.id, Some(2), 1_000, None).await.unwrap();
    assert_eq!(total_balance(&engine, &players).await, 4_000);

    // Mid-hand stack changes are refused
    assert!(matches!(
        engine.rebuy(game.id, Some(1), 100).await,
        Err(EngineError::StateConflict(_))
    ));
    assert!(matches!(
        engine.leave_cash_game(game.id, Some(2)).await,
        Err(EngineError::StateConflict(_))
    ));
    assert_eq!(total_balance(&engine, &players).await, 4_000);

    // Call then check the hand down
    let mut first = true;
    loop {
        let view = engine.table_view(game.table_id, Some(1)).await.unwrap();
        let hand = view.hand.unwrap();
        let Some(actor) = hand.current_actor else {
            assert_eq!(hand.phase, HandPhase::Complete);
            break;
        };
        let player = view
            .seats
            .iter()
            .find(|s| s.seat_index == actor)
            .map(|s| s.player_id);
        let kind = if first { "call" } else { "check" };
        first = false;
        engine
            .submit_action(game.table_id, player, kind, None, Some(hand.version))
            .await
            .unwrap();
    }

    let one = engine.leave_cash_game(game.id, Some(1)).await.unwrap();
    let two = engine.leave_cash_game(game.id, Some(2)).await.unwrap();
    assert_eq!(one + two, 2_000);
    assert_eq!(total_balance(&engine, &players).await, 6_000);

    let history = engine.transactions(Some(1), 10).await.unwrap();
    assert_eq!(history[0].cause, TransactionCause::CashOut);
    assert!(history.iter().any(|tx| tx.cause == TransactionCause::BuyIn));
}

#[tokio::test]
async fn test_join_rules() {
    let engine = engine();
    engine.ledger().grant(1, 300).await.unwrap();
    engine.ledger().grant(2, 5_000).await.unwrap();
    let game = engine
        .create_cash_game(
            Some(2),
            CashGameConfig {
                max_players: 2,
                ..config()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        engine.join_cash_game(game.id, None, 500, None).await,
        Err(EngineError::NotAuthenticated)
    ));
    assert!(matches!(
        engine.join_cash_game(game.id, Some(1), 500, None).await,
        Err(EngineError::InsufficientChips { .. })
    ));
    assert_eq!(engine.balance(Some(1)).await.unwrap(), 300);

    engine.join_cash_game(game.id, Some(2), 500, Some(1)).await.unwrap();
    engine.ledger().grant(1, 1_000).await.unwrap();
    assert_eq!(
        engine.join_cash_game(game.id, Some(1), 500, None).await.unwrap(),
        0
    );

    engine.ledger().grant(3, 1_000).await.unwrap();
    assert!(matches!(
        engine.join_cash_game(game.id, Some(3), 500, None).await,
        Err(EngineError::StateConflict(_))
    ));
    assert_eq!(engine.balance(Some(3)).await.unwrap(), 1_000);
}

#[tokio::test]
async fn test_close_cashes_everyone_out() {
    let engine = engine();
    for player in [1, 2, 3] {
        engine.ledger().grant(player, 2_000).await.unwrap();
    }
    let game = engine.create_cash_game(Some(1), config()).await.unwrap();
    for player in [1, 2, 3] {
        engine
            .join_cash_game(game.id, Some(player), 800, None)
            .await
            .unwrap();
    }

    let closed = engine.close_cash_game(game.id, Some(1)).await.unwrap();
    assert_eq!(closed.status, CashGameStatus::Closed);
    assert_eq!(total_balance(&engine, &[1, 2, 3]).await, 6_000);
    assert!(engine.tables().get(game.table_id).await.is_err());
    assert!(matches!(
        engine.close_cash_game(game.id, Some(1)).await,
        Err(EngineError::StateConflict(_))
    ));
}

#[tokio::test]
async fn test_void_pays_departed_blind_not_newcomer() {
    let engine = fast_engine();
    let players = [1, 2, 3, 9];
    for player in players {
        engine.ledger().grant(player, 2_000).await.unwrap();
    }
    let game = engine.create_cash_game(Some(1), config()).await.unwrap();
    engine.join_cash_game(game.id, Some(1), 1_000, None).await.unwrap();
    engine.join_cash_game(game.id, Some(2), 1_000, None).await.unwrap();
    engine.join_cash_game(game.id, Some(3), 500, None).await.unwrap();

    // Heads-up button folds its small blind; the next hand is three-handed
    let first = wait_for_hand(&engine, game.table_id, 1).await;
    engine
        .submit_action(game.table_id, Some(1), "fold", None, Some(first.version))
        .await
        .unwrap();
    let hand = wait_for_hand(&engine, game.table_id, 2).await;
    assert_eq!(hand.small_blind_seat, 2);

    let view = engine.table_view(game.table_id, Some(1)).await.unwrap();
    assert_eq!(player_at(&view, hand.current_actor.unwrap()), Some(2));
    engine
        .submit_action(game.table_id, Some(2), "call", None, None)
        .await
        .unwrap();
    engine
        .submit_action(game.table_id, Some(3), "fold", None, None)
        .await
        .unwrap();
    assert_eq!(engine.leave_cash_game(game.id, Some(3)).await.unwrap(), 490);

    // The small blind seat stays reserved until the hand ends
    let seat = engine
        .join_cash_game(game.id, Some(9), 400, Some(2))
        .await
        .unwrap();
    assert_ne!(seat, 2);

    engine.close_cash_game(game.id, Some(1)).await.unwrap();
    assert_eq!(engine.balance(Some(9)).await.unwrap(), 2_000);
    assert_eq!(engine.balance(Some(3)).await.unwrap(), 2_000);
    assert_eq!(engine.balance(Some(1)).await.unwrap(), 1_990);
    assert_eq!(engine.balance(Some(2)).await.unwrap(), 2_010);
    assert_eq!(total_balance(&engine, &players).await, 8_000);
}

#[tokio::test]
async fn test_rebuy_after_bust_deals_again() {
    let engine = fast_engine();
    let players = [1, 2];
    for player in players {
        engine.ledger().grant(player, 5_000).await.unwrap();
    }
    let game = engine.create_cash_game(Some(1), config()).await.unwrap();
    engine.join_cash_game(game.id, Some(1), 400, None).await.unwrap();
    engine.join_cash_game(game.id, Some(2), 400, None).await.unwrap();

    // Shove and call until someone busts
    let (busted, last_hand) = 'play: {
        for _ in 0..2_000 {
            let view = engine.table_view(game.table_id, Some(1)).await.unwrap();
            let Some(hand) = view.hand.clone() else {
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            };
            if hand.phase == HandPhase::Complete {
                if let Some(seat) = view.seats.iter().find(|s| s.stack == 0) {
                    break 'play (seat.player_id, hand.hand_number);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            }
            let Some(actor) = hand.current_actor else {
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            };
            let player = player_at(&view, actor);
            let shoved = engine
                .submit_action(game.table_id, player, "all-in", None, Some(hand.version))
                .await;
            if shoved.is_err() {
                let _ = engine
                    .submit_action(game.table_id, player, "call", None, Some(hand.version))
                    .await;
            }
        }
        panic!("nobody busted");
    };

    // One player with chips is not enough to deal
    tokio::time::sleep(Duration::from_millis(100)).await;
    let view = engine.table_view(game.table_id, Some(1)).await.unwrap();
    assert_eq!(view.hand.unwrap().hand_number, last_hand);

    assert_eq!(engine.rebuy(game.id, Some(busted), 400).await.unwrap(), 400);
    let next = wait_for_hand(&engine, game.table_id, last_hand + 1).await;
    assert!(next.current_actor.is_some());
    assert_eq!(total_balance(&engine, &players).await, 10_000 - 1_200);
}

#[tokio::test]
async fn test_buy_in_ceiling_refused() {
    let engine = engine();
    assert!(matches!(
        engine
            .create_cash_game(
                Some(1),
                CashGameConfig {
                    max_buy_in: MAX_BUY_IN + 1,
                    ..config()
                },
            )
            .await,
        Err(EngineError::Validation(_))
    ));
    assert!(
        engine
            .create_cash_game(
                Some(1),
                CashGameConfig {
                    max_buy_in: MAX_BUY_IN,
                    ..config()
                },
            )
            .await
            .is_ok()
    );
}
