//! Integration tests for the batch orchestrator.
//!
//! Covers the fan-out contract: preconditions abort the whole batch, while
//! a failing vault is recorded and the rest carry on.

mod common;

use bytes::Bytes;
use std::sync::Arc;

use common::{id, RecordingTarget, ReentrantRecipient, RejectingRecipient, ScriptedToken, TokenBehavior, World};
use custody_contracts::{BatchOperation, CustodyError, CustodyEvent, ElementOutcome, Owned};
use custody_protocol::config::MAX_BATCH_SIZE;
use custody_protocol::{Amount, CallBudget, Identity, Selector};

fn fund(world: &World, vaults: &[Identity], amounts: &[Amount]) {
    for (vault, amount) in vaults.iter().zip(amounts) {
        world.host.fund(*vault, *amount).unwrap();
    }
}

// ---------------------------------------------------------------------------
// Account creation
// ---------------------------------------------------------------------------

#[test]
fn created_vaults_are_registered_in_order() {
    let world = World::new();
    let first = world.as_admin(|f| world.orchestrator.create_account(f)).unwrap();
    let rest = world.create_vaults(3);

    let mut expected = vec![first];
    expected.extend(rest);
    assert_eq!(world.orchestrator.vaults(), expected);
    assert!(expected.iter().all(|v| world.host.is_contract(v)));
    assert!(expected.iter().all(|v| world.orchestrator.controls(v)));

    let created: Vec<_> = world
        .events()
        .into_iter()
        .filter_map(|e| match e {
            CustodyEvent::AccountCreated { account, owner } => {
                assert_eq!(owner, world.orchestrator.address());
                Some(account)
            }
            _ => None,
        })
        .collect();
    assert_eq!(created, expected);
}

#[test]
fn create_accounts_respects_the_cap() {
    let world = World::new();

    let err = world
        .as_admin(|f| world.orchestrator.create_accounts(f, 0))
        .unwrap_err();
    assert_eq!(err, CustodyError::EmptyArray);

    let err = world
        .as_admin(|f| world.orchestrator.create_accounts(f, MAX_BATCH_SIZE + 1))
        .unwrap_err();
    assert_eq!(
        err,
        CustodyError::ArrayTooLarge {
            len: MAX_BATCH_SIZE + 1,
            max: MAX_BATCH_SIZE
        }
    );
    assert_eq!(world.orchestrator.vault_count(), 0);

    let created = world.create_vaults(MAX_BATCH_SIZE);
    assert_eq!(created.len(), MAX_BATCH_SIZE);
    assert_eq!(world.orchestrator.vault_count(), MAX_BATCH_SIZE);
}

#[test]
fn strangers_cannot_operate_the_orchestrator() {
    let world = World::new();
    let vaults = world.create_vaults(1);
    fund(&world, &vaults, &[100]);
    let mallory = id("mallory");

    let err = world
        .host
        .transact(mallory, world.orchestrator.address(), 0, |f| {
            world.orchestrator.transfer(f, &vaults, &[100], mallory)
        })
        .unwrap_err();
    assert_eq!(err, CustodyError::Unauthorized { caller: mallory });

    let err = world
        .host
        .transact(mallory, world.orchestrator.address(), 0, |f| {
            world.orchestrator.create_account(f)
        })
        .unwrap_err();
    assert_eq!(err, CustodyError::Unauthorized { caller: mallory });

    assert_eq!(world.host.balance_of(&vaults[0]), 100);
    assert!(!world.orchestrator.is_locked());
}

// ---------------------------------------------------------------------------
// Native fan-out
// ---------------------------------------------------------------------------

#[test]
fn one_funded_vault_out_of_three() {
    let world = World::new();
    let vaults = world.create_vaults(3);
    fund(&world, &vaults, &[100]);
    let recipient = id("treasury");

    let outcome = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[50, 50, 50], recipient))
        .unwrap();

    assert_eq!(outcome.operation, BatchOperation::NativeTransfer);
    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.total_count, 3);
    assert_eq!(outcome.total_amount, 50);
    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, 1);
    assert_eq!(failures[1].0, 2);
    assert!(failures.iter().all(|(_, reason)| reason.contains("insufficient balance")));

    assert_eq!(world.host.balance_of(&vaults[0]), 50);
    assert_eq!(world.host.balance_of(&recipient), 50);
    assert!(world.events().contains(&CustodyEvent::BatchCompleted {
        operation: BatchOperation::NativeTransfer,
        success_count: 1,
        total_count: 3,
        total_amount: 50,
    }));
}

#[test]
fn batch_preconditions_abort_everything() {
    let world = World::new();
    let vaults = world.create_vaults(2);
    fund(&world, &vaults, &[10, 10]);

    let err = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[1], id("bob")))
        .unwrap_err();
    assert_eq!(
        err,
        CustodyError::ArrayLengthMismatch {
            targets: 2,
            params: 1
        }
    );

    let err = world
        .as_admin(|f| world.orchestrator.transfer(f, &[], &[], id("bob")))
        .unwrap_err();
    assert_eq!(err, CustodyError::EmptyArray);

    let err = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[1, 1], Identity::NULL))
        .unwrap_err();
    assert_eq!(err, CustodyError::InvalidIdentity("recipient"));

    assert_eq!(world.orchestrator.native_balances(&world.host, &vaults).unwrap(), vec![10, 10]);
}

#[test]
fn unknown_and_null_vaults_fail_their_element_only() {
    let world = World::new();
    let mut vaults = world.create_vaults(1);
    fund(&world, &vaults, &[10]);
    vaults.push(id("not-a-vault"));
    vaults.push(Identity::NULL);

    let outcome = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[5, 5, 5], id("bob")))
        .unwrap();

    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.elements[0], ElementOutcome::Succeeded { amount: 5 });
    let reasons: Vec<_> = outcome.failures().map(|(_, reason)| reason.to_string()).collect();
    assert_eq!(
        reasons,
        vec![
            "unknown vault: not created by this orchestrator".to_string(),
            "invalid vault: null identity".to_string()
        ]
    );
}

#[test]
fn rejecting_recipient_fails_every_element() {
    let world = World::new();
    let vaults = world.create_vaults(2);
    fund(&world, &vaults, &[10, 10]);
    let (wall, _) = world.deploy(|_| RejectingRecipient {
        reason: Some("closed"),
    });

    let outcome = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[4, 4], wall))
        .unwrap();
    assert_eq!(outcome.success_count, 0);
    assert_eq!(outcome.total_amount, 0);

    let failed: Vec<_> = world
        .events()
        .into_iter()
        .filter(|e| matches!(e, CustodyEvent::ElementFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 2);
    assert_eq!(
        failed[0],
        CustodyEvent::ElementFailed {
            operation: BatchOperation::NativeTransfer,
            index: 0,
            target: vaults[0],
            reason: format!("native transfer to {wall} failed: closed"),
        }
    );
    assert_eq!(world.host.balance_of(&vaults[0]), 10);
}

#[test]
fn recipient_reentering_the_orchestrator_is_rejected() {
    let world = World::new();
    let vaults = world.create_vaults(1);
    fund(&world, &vaults, &[100]);

    let orchestrator = Arc::clone(&world.orchestrator);
    let drained = vaults.clone();
    let (attacker, recipient) = world.deploy(move |_| {
        ReentrantRecipient::new(move |frame| {
            let me = frame.address();
            frame.call(orchestrator.address(), 0, CallBudget::Forward, |child| {
                orchestrator.transfer(child, &drained, &[50], me).map(|_| ())
            })
        })
    });

    let outcome = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &[10], attacker))
        .unwrap();

    assert_eq!(outcome.success_count, 1);
    assert_eq!(recipient.observed(), vec![CustodyError::ReentrantCall]);
    assert_eq!(world.host.balance_of(&attacker), 10);
    assert_eq!(world.host.balance_of(&vaults[0]), 90);
    assert!(!world.orchestrator.is_locked());
}

// ---------------------------------------------------------------------------
// Token fan-out
// ---------------------------------------------------------------------------

#[test]
fn fungible_fan_out_and_balances() {
    let world = World::new();
    let vaults = world.create_vaults(3);
    let token = world.fungible_token("usd");
    world.mint(&token, vaults[0], 100);
    world.mint(&token, vaults[1], 100);

    let outcome = world
        .as_admin(|f| {
            world
                .orchestrator
                .transfer_fungible(f, &vaults, token.address(), &[60, 60, 60], id("bob"))
        })
        .unwrap();

    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.total_amount, 120);
    assert_eq!(token.balance_of(&id("bob")), 120);

    let balances = world
        .host
        .query(|f| world.orchestrator.fungible_balances(f, &vaults, token.address()))
        .unwrap();
    assert_eq!(balances, vec![40, 40, 0]);
}

#[test]
fn non_fungible_fan_out_counts_tokens() {
    let world = World::new();
    let vaults = world.create_vaults(3);
    let nft = world.non_fungible_token("Deeds");
    world.mint_nft(&nft, vaults[0], 1);
    world.mint_nft(&nft, vaults[1], 2);

    let outcome = world
        .as_admin(|f| {
            world
                .orchestrator
                .transfer_non_fungible(f, &vaults, nft.address(), &[1, 2, 3], id("bob"))
        })
        .unwrap();

    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.total_amount, 2);
    assert_eq!(nft.owner_of(1), Some(id("bob")));
    assert_eq!(nft.owner_of(2), Some(id("bob")));
    assert_eq!(nft.owner_of(3), None);
    assert_eq!(nft.balance_of(&id("bob")), 2);
}

#[test]
fn call_any_fan_out_reaches_target_from_each_vault() {
    let world = World::new();
    let vaults = world.create_vaults(3);
    fund(&world, &vaults, &[10, 10, 0]);
    let (target, recorder) = world.deploy(|_| RecordingTarget::default());
    let selector = Selector::from_signature("deposit()");

    let outcome = world
        .as_admin(|f| {
            world
                .orchestrator
                .call_any(f, &vaults, target, selector, Bytes::from_static(b"memo"), 5)
        })
        .unwrap();

    assert_eq!(outcome.operation, BatchOperation::ContractCall);
    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.total_amount, 10);
    let callers: Vec<_> = recorder.calls().iter().map(|c| c.caller).collect();
    assert_eq!(callers, vaults[..2].to_vec());
    assert!(recorder.calls().iter().all(|c| c.data == b"memo" && c.value == 5));
    assert_eq!(world.host.balance_of(&target), 10);
}

#[test]
fn call_any_reverting_target_is_recorded() {
    let world = World::new();
    let vaults = world.create_vaults(2);
    let (target, _) = world.deploy(|_| RecordingTarget::default());

    let outcome = world
        .as_admin(|f| {
            world.orchestrator.call_any(
                f,
                &vaults,
                target,
                RecordingTarget::fail_selector(),
                Bytes::new(),
                0,
            )
        })
        .unwrap();

    assert_eq!(outcome.success_count, 0);
    assert!(outcome
        .failures()
        .all(|(_, reason)| reason.ends_with("target refused")));
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn ownership_handover_moves_control() {
    let world = World::new();
    let successor = id("successor");

    world
        .as_admin(|f| world.orchestrator.transfer_ownership(f, successor))
        .unwrap();
    assert_eq!(world.orchestrator.owner(), world.admin);
    assert_eq!(world.orchestrator.pending_owner(), Some(successor));

    world
        .host
        .transact(successor, world.orchestrator.address(), 0, |f| {
            world.orchestrator.accept_ownership(f)
        })
        .unwrap();
    assert_eq!(world.orchestrator.owner(), successor);

    let err = world
        .as_admin(|f| world.orchestrator.create_account(f))
        .unwrap_err();
    assert_eq!(err, CustodyError::Unauthorized { caller: world.admin });

    let created = world
        .host
        .transact(successor, world.orchestrator.address(), 0, |f| {
            world.orchestrator.create_account(f)
        })
        .unwrap();
    assert!(world.orchestrator.controls(&created));
}

// ---------------------------------------------------------------------------
// Batch size
// ---------------------------------------------------------------------------

#[test]
fn native_transfer_processes_a_full_batch() {
    let world = World::new();
    let vaults = world.create_vaults(MAX_BATCH_SIZE);
    let amounts: Vec<Amount> = (1..=MAX_BATCH_SIZE as Amount).collect();
    fund(&world, &vaults, &amounts);

    let outcome = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &amounts, id("treasury")))
        .unwrap();

    assert_eq!(outcome.total_count, MAX_BATCH_SIZE);
    assert_eq!(outcome.success_count, MAX_BATCH_SIZE);
    assert_eq!(outcome.total_amount, 5_050);
    assert_eq!(world.host.balance_of(&id("treasury")), 5_050);
    assert!(vaults.iter().all(|v| world.host.balance_of(v) == 0));
}

#[test]
fn fungible_transfer_processes_a_full_batch() {
    let world = World::new();
    let vaults = world.create_vaults(MAX_BATCH_SIZE);
    let token = world.fungible_token("usd");
    for vault in &vaults {
        world.mint(&token, *vault, 3);
    }
    let amounts = vec![2; MAX_BATCH_SIZE];

    let outcome = world
        .as_admin(|f| {
            world
                .orchestrator
                .transfer_fungible(f, &vaults, token.address(), &amounts, id("bob"))
        })
        .unwrap();

    assert_eq!(outcome.success_count, MAX_BATCH_SIZE);
    assert_eq!(outcome.total_amount, 200);
    assert_eq!(token.balance_of(&id("bob")), 200);
    assert!(vaults.iter().all(|v| token.balance_of(v) == 1));
}

#[test]
fn transfers_reject_oversized_batches() {
    let world = World::new();
    let vaults: Vec<Identity> = (0..=MAX_BATCH_SIZE).map(|i| id(&format!("v{i}"))).collect();
    let amounts = vec![1; MAX_BATCH_SIZE + 1];
    let token = world.fungible_token("usd");
    let expected = CustodyError::ArrayTooLarge {
        len: MAX_BATCH_SIZE + 1,
        max: MAX_BATCH_SIZE,
    };
    let cursor = world.host.log_count();

    let err = world
        .as_admin(|f| world.orchestrator.transfer(f, &vaults, &amounts, id("bob")))
        .unwrap_err();
    assert_eq!(err, expected);

    let err = world
        .as_admin(|f| {
            world
                .orchestrator
                .transfer_fungible(f, &vaults, token.address(), &amounts, id("bob"))
        })
        .unwrap_err();
    assert_eq!(err, expected);

    let err = world
        .as_admin(|f| {
            world.orchestrator.call_any(
                f,
                &vaults,
                id("target"),
                Selector::from_signature("noop()"),
                Bytes::new(),
                0,
            )
        })
        .unwrap_err();
    assert_eq!(err, expected);

    assert!(world.events_since(cursor).is_empty());
}

#[test]
fn overflowing_batch_total_reverts_the_batch() {
    let world = World::new();
    let vaults = world.create_vaults(2);
    let (token, _) = world.deploy(|_| ScriptedToken {
        behavior: TokenBehavior::ReturnTrue,
    });
    let cursor = world.host.log_count();

    let err = world
        .as_admin(|f| {
            world
                .orchestrator
                .transfer_fungible(f, &vaults, token, &[Amount::MAX, 1], id("bob"))
        })
        .unwrap_err();

    assert_eq!(err, CustodyError::Overflow("batch total"));
    assert!(world.events_since(cursor).is_empty());
    assert!(!world.orchestrator.is_locked());
}
