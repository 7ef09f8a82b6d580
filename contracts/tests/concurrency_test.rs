//! Concurrency tests: racing finalizations on one escrow must disburse its
//! value exactly once.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use pointlock_contracts::{AuxPoints, EscrowEngine, EscrowError, MemoryEscrowStore, OpenRequest};
use pointlock_protocol::{
    Bn254Oracle, ContractId, CurveOracle, CurvePoint, Identity, InMemoryLedger, ManualClock,
    Payout, Scalar, SettlementLedger, TransferFailed,
};

const T: u64 = 50_000;
const TIMELOCK: u64 = T + 100;
const THREADS: usize = 16;

fn who(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

fn request(amount: u64, k: &Scalar) -> OpenRequest {
    OpenRequest {
        receiver: who("bob"),
        amount,
        commitment: Bn254Oracle::new().commitment(k).unwrap(),
        aux: AuxPoints::new(CurvePoint::infinity(), CurvePoint::infinity()),
        timelock: TIMELOCK,
    }
}

type Setup = (
    Arc<EscrowEngine>,
    Arc<InMemoryLedger>,
    Arc<ManualClock>,
    ContractId,
    Scalar,
);

fn setup(amount: u64) -> Setup {
    let clock = Arc::new(ManualClock::new(T));
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Arc::new(
        EscrowEngine::builder()
            .clock(clock.clone())
            .ledger(ledger.clone())
            .build(),
    );

    let k = Scalar::from_u64(424242);
    let id = engine.open(&who("alice"), request(amount, &k)).unwrap();
    ledger.fund_escrow(&id, amount).unwrap();
    (engine, ledger, clock, id, k)
}

#[test]
fn racing_withdrawals_pay_out_once() {
    let (engine, ledger, _clock, id, k) = setup(1_000);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let k = k.clone();
            thread::spawn(move || {
                let claimant = who(&format!("claimant-{i}"));
                barrier.wait();
                engine.withdraw(&claimant, &id, &k)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for r in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(r, EscrowError::AlreadyFinalized(_)), "unexpected {r}");
    }

    assert_eq!(ledger.disbursed(&id), 1_000);
    assert_eq!(ledger.balance(&who("bob")), 500);
}

#[test]
fn refund_and_withdraw_race_at_the_boundary() {
    let (engine, ledger, clock, id, k) = setup(600);
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let mut handles = Vec::new();
    for i in 0..THREADS {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        let k = k.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            if i % 2 == 0 {
                engine.withdraw(&who("carol"), &id, &k).map(|_| ())
            } else {
                engine.refund(&who("alice"), &id).map(|_| ())
            }
        }));
    }

    // Cross the timelock while the callers are racing.
    barrier.wait();
    clock.set(TIMELOCK);

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();
    assert!(wins <= 1);

    // Every refund may have run before the clock moved and every withdraw
    // after it. The sender can still recover the funds in that case.
    if wins == 0 {
        engine.refund(&who("alice"), &id).unwrap();
    }
    assert_eq!(ledger.disbursed(&id), 600);

    let view = engine.get_contract(&id).unwrap().unwrap();
    assert!(view.withdrawn ^ view.refunded);
}

#[test]
fn readers_never_observe_partial_state() {
    let (engine, ledger, _clock, id, k) = setup(200);
    let barrier = Arc::new(Barrier::new(2));

    let reader = {
        let engine = Arc::clone(&engine);
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..1_000 {
                let view = engine.get_contract(&id).unwrap().unwrap();
                // A withdrawn view must always be backed by a settled ledger.
                if view.withdrawn {
                    assert_eq!(ledger.disbursed(&id), 200);
                }
            }
        })
    };

    barrier.wait();
    engine.withdraw(&who("carol"), &id, &k).unwrap();
    reader.join().unwrap();
}

#[test]
fn independent_contracts_do_not_block_each_other() {
    let clock = Arc::new(ManualClock::new(T));
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Arc::new(
        EscrowEngine::builder()
            .clock(clock)
            .ledger(ledger.clone())
            .build(),
    );
    let k = Scalar::from_u64(7);

    let handles: Vec<_> = (0..THREADS as u64)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let ledger = Arc::clone(&ledger);
            let k = k.clone();
            thread::spawn(move || {
                let id = engine.open(&who("alice"), request(10 + i, &k)).unwrap();
                ledger.fund_escrow(&id, 10 + i).unwrap();
                engine.withdraw(&who("carol"), &id, &k).unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(engine.contract_count().unwrap(), THREADS);
}

/// Holds every transfer until released, then refuses it.
struct GatedLedger {
    entered: Barrier,
    release: Barrier,
}

impl SettlementLedger for GatedLedger {
    fn transfer(&self, _: &ContractId, _: &[Payout]) -> Result<(), TransferFailed> {
        self.entered.wait();
        self.release.wait();
        Err(TransferFailed::Rejected("ledger offline".into()))
    }
}

#[test]
fn reader_on_restarted_engine_never_sees_rolled_back_status() {
    let store = Arc::new(MemoryEscrowStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let k = Scalar::from_u64(424242);

    // Open through one engine, then serve from a fresh one over the same
    // store, as after a restart.
    let id = {
        let first = EscrowEngine::builder()
            .store(store.clone())
            .clock(clock.clone())
            .build();
        first.open(&who("alice"), request(1_000, &k)).unwrap()
    };

    let ledger = Arc::new(GatedLedger {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let engine = Arc::new(
        EscrowEngine::builder()
            .store(store)
            .clock(clock)
            .ledger(ledger.clone())
            .build(),
    );

    let withdrawer = {
        let engine = Arc::clone(&engine);
        let k = k.clone();
        thread::spawn(move || engine.withdraw(&who("carol"), &id, &k))
    };

    // Withdrawn is now staged in the store, pending the ledger.
    ledger.entered.wait();
    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.get_contract(&id).unwrap().unwrap())
    };
    thread::sleep(Duration::from_millis(50));
    ledger.release.wait();

    let err = withdrawer.join().unwrap().unwrap_err();
    assert!(matches!(err, EscrowError::TransferFailed(_)));

    let seen = reader.join().unwrap();
    assert!(!seen.withdrawn && !seen.refunded);
    assert!(!engine.get_contract(&id).unwrap().unwrap().withdrawn);
}
