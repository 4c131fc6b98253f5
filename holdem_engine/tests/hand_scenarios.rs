//! Full-hand scenarios driven straight through the hand state machine.

use holdem_engine::{
    EngineError,
    game::{
        Action, ActionChoice, ActionKind, Blinds, Chips, Hand, HandPhase, HandSetup, PlayerId,
        Seat, SeatStatus, Seats, SidePot,
    },
};

fn seats(stacks: &[Chips]) -> Seats {
    stacks
        .iter()
        .enumerate()
        .map(|(i, stack)| (i, Seat::new(1 + i as PlayerId, i, *stack)))
        .collect()
}

fn setup(seed: u64) -> HandSetup {
    HandSetup {
        table_id: 1,
        hand_number: 1,
        previous_dealer: None,
        blinds: Blinds {
            small: 10,
            big: 20,
            ante: 0,
        },
        capacity: 9,
        seed,
        turn_timeout_ms: None,
    }
}

fn total(seats: &Seats) -> Chips {
    seats.values().map(|seat| seat.stack).sum()
}

#[test]
fn test_raise_call_folds_build_pot_and_utg_leads_flop() {
    // Button 0, blinds 1 and 2, seat 3 under the gun
    let mut seats = seats(&[1000, 1000, 1000, 1000]);
    let (mut hand, _) = Hand::start(setup(7), &mut seats).unwrap();
    assert_eq!(hand.current_actor, Some(3));

    hand.apply_action(&mut seats, 3, Action::Raise(60), Some(1))
        .unwrap();
    hand.apply_action(&mut seats, 0, Action::Call, Some(2))
        .unwrap();
    hand.apply_action(&mut seats, 1, Action::Fold, Some(3))
        .unwrap();
    let t = hand
        .apply_action(&mut seats, 2, Action::Fold, Some(4))
        .unwrap();

    assert!(t.phase_changed);
    assert_eq!(hand.phase, HandPhase::Flop);
    assert_eq!(hand.community_cards.len(), 3);
    assert_eq!(hand.pot, 150);
    assert_eq!(t.pot, 150);
    assert_eq!(hand.current_bet, 0);
    assert_eq!(hand.current_actor, Some(3));
    assert_eq!(hand.version, 5);
    assert!(seats.values().all(|seat| seat.current_bet == 0));
}

#[test]
fn test_three_handed_raise_call_fold() {
    let mut seats = seats(&[1000, 1000, 1000]);
    let (mut hand, _) = Hand::start(setup(7), &mut seats).unwrap();
    assert_eq!(hand.current_actor, Some(0));

    hand.apply_action(&mut seats, 0, Action::Raise(60), None)
        .unwrap();
    hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
    let t = hand.apply_action(&mut seats, 2, Action::Fold, None).unwrap();

    assert_eq!(t.streets.len(), 1);
    assert_eq!(hand.pot, 140);
    // First live seat left of the button
    assert_eq!(hand.current_actor, Some(1));
    assert_eq!(seats[&2].status, SeatStatus::Folded);
}

#[test]
fn test_uneven_all_ins_build_side_pot_and_run_out() {
    let mut seats = seats(&[300, 500]);
    let (mut hand, _) = Hand::start(setup(11), &mut seats).unwrap();
    let first = hand.dealer_seat;
    assert_eq!(first, 0);

    let t = hand.apply_action(&mut seats, 0, Action::AllIn, None).unwrap();
    assert!(!t.completed);
    let t = hand.apply_action(&mut seats, 1, Action::AllIn, None).unwrap();

    assert!(t.completed);
    assert_eq!(hand.community_cards.len(), 5);
    // Flop, turn and river dealt in one transition, no betting
    assert_eq!(t.streets.len(), 3);
    assert_eq!(
        hand.pots,
        vec![
            SidePot {
                amount: 600,
                eligible_seats: vec![0, 1],
            },
            SidePot {
                amount: 200,
                eligible_seats: vec![1],
            },
        ]
    );

    let result = t.result.unwrap();
    assert!(result.showdown);
    let side = result.awards.iter().find(|a| a.pot_index == 1).unwrap();
    assert_eq!(side.winners, vec![1]);
    assert_eq!(side.amount, 200);
    assert_eq!(total(&seats), 800);
    assert!(seats[&1].stack >= 200);
}

#[test]
fn test_stale_version_leaves_hand_untouched() {
    let mut seats = seats(&[1000, 1000, 1000]);
    let (mut hand, _) = Hand::start(setup(3), &mut seats).unwrap();
    hand.apply_action(&mut seats, 0, Action::Call, Some(1))
        .unwrap();

    let seats_before = seats.clone();
    let pot_before = hand.pot;
    let err = hand
        .apply_action(&mut seats, 1, Action::Call, Some(hand.version - 1))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::VersionConflict {
            expected: 1,
            actual: 2
        }
    ));
    assert_eq!(seats, seats_before);
    assert_eq!(hand.pot, pot_before);
    assert_eq!(hand.version, 2);
    assert_eq!(hand.current_actor, Some(1));
}

#[test]
fn test_every_street_moves_version_by_one_per_action() {
    let mut seats = seats(&[1000, 1000]);
    let (mut hand, _) = Hand::start(setup(5), &mut seats).unwrap();
    let mut version = hand.version;
    let mut next = hand.current_actor;
    let mut first = true;
    while let Some(actor) = next {
        let action = if first { Action::Call } else { Action::Check };
        first = false;
        let t = hand
            .apply_action(&mut seats, actor, action, Some(version))
            .unwrap();
        assert_eq!(t.version, version + 1);
        version = t.version;
        next = t.next_actor;
    }
    assert_eq!(hand.phase, HandPhase::Complete);
    assert_eq!(total(&seats), 2000);
    assert!(matches!(
        hand.apply_action(&mut seats, 0, Action::Check, None),
        Err(EngineError::StateConflict(_))
    ));
}

#[test]
fn test_same_seed_same_board() {
    let play = |seed| {
        let mut seats = seats(&[400, 400]);
        let (mut hand, _) = Hand::start(setup(seed), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::AllIn, None).unwrap();
        hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
        (hand.community_cards.clone(), seats[&0].stack, seats[&1].stack)
    };
    assert_eq!(play(99), play(99));
}

#[test]
fn test_short_all_in_does_not_reopen_betting() {
    let mut seats = seats(&[1000, 1000, 80]);
    let (mut hand, _) = Hand::start(setup(7), &mut seats).unwrap();

    hand.apply_action(&mut seats, 0, Action::Raise(60), None)
        .unwrap();
    hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
    // Big blind shoves to 80, 20 short of a full raise
    hand.apply_action(&mut seats, 2, Action::AllIn, None).unwrap();
    assert_eq!(hand.current_bet, 80);
    assert_eq!(hand.min_raise, 40);

    assert_eq!(hand.current_actor, Some(0));
    let kinds: Vec<ActionKind> = hand
        .legal_actions(&seats, 0)
        .iter()
        .map(ActionChoice::kind)
        .collect();
    assert_eq!(kinds, vec![ActionKind::Fold, ActionKind::Call]);
    let version = hand.version;
    assert!(matches!(
        hand.apply_action(&mut seats, 0, Action::Raise(200), None),
        Err(EngineError::InvalidAction(_))
    ));
    assert!(matches!(
        hand.apply_action(&mut seats, 0, Action::AllIn, None),
        Err(EngineError::InvalidAction(_))
    ));
    assert_eq!(hand.version, version);

    hand.apply_action(&mut seats, 0, Action::Call, None).unwrap();
    hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
    assert_eq!(hand.phase, HandPhase::Flop);
    assert_eq!(hand.pot, 240);

    // A new street opens the betting again
    let actor = hand.current_actor.unwrap();
    assert!(
        hand.legal_actions(&seats, actor)
            .iter()
            .any(|choice| matches!(choice, ActionChoice::Bet { .. }))
    );
}

#[test]
fn test_stacks_at_chip_ceiling_play_out() {
    let half = Chips::MAX / 2;
    let mut seats = seats(&[half, Chips::MAX - half]);
    let (mut hand, _) = Hand::start(setup(21), &mut seats).unwrap();

    hand.apply_action(&mut seats, 0, Action::AllIn, None).unwrap();
    let t = hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
    assert!(t.completed);
    assert_eq!(total(&seats), Chips::MAX);
}

#[test]
fn test_stacks_over_chip_ceiling_refused() {
    let mut seats = seats(&[3_000_000_000, 3_000_000_000]);
    let before = seats.clone();
    assert!(matches!(
        Hand::start(setup(21), &mut seats),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(seats, before);
}

#[test]
fn test_folded_seat_replaced_mid_hand_reaches_showdown() {
    let mut seats = seats(&[1000, 1000, 1000]);
    let (mut hand, _) = Hand::start(setup(11), &mut seats).unwrap();

    hand.apply_action(&mut seats, 0, Action::Call, None).unwrap();
    hand.apply_action(&mut seats, 1, Action::Fold, None).unwrap();
    // Small blind stands up and someone sits down elsewhere
    seats.remove(&1);
    seats.insert(3, Seat::new(9, 3, 400));
    hand.apply_action(&mut seats, 2, Action::Check, None).unwrap();
    assert_eq!(hand.phase, HandPhase::Flop);
    assert_eq!(hand.pot, 50);

    while let Some(actor) = hand.current_actor {
        assert_ne!(actor, 3);
        hand.apply_action(&mut seats, actor, Action::Check, None)
            .unwrap();
    }
    assert_eq!(hand.phase, HandPhase::Complete);
    assert_eq!(seats[&0].stack + seats[&2].stack, 2_010);
    assert_eq!(seats[&3].stack, 400);
    assert_eq!(seats[&3].status, SeatStatus::Waiting);
}
