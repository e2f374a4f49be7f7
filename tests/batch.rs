mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use eventcert::batch::{BatchOrchestrator, BatchOutcome, BatchSettings};
use eventcert::certificate::{token::is_well_formed, TOKEN_LEN};
use eventcert::error::{BatchError, StoreError};
use eventcert::progress;
use eventcert::store::CertificateStore;
use eventcert::verify::Verifier;

use common::*;

#[tokio::test]
async fn every_participant_gets_a_record_and_an_archive_entry() {
    let names = ["Ada Lovelace", "Grace Hopper", "Alan Turing", "Edsger Dijkstra", "Barbara Liskov"];
    let (store, event, participants) = seeded("Rust Conf 2025", &names);

    let report = orchestrator(store.clone())
        .run(event.id, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.produced, 5);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.outcome(), BatchOutcome::Success);
    assert_eq!(report.archive_name, "Rust_Conf_2025_Certificates.zip");

    let records = store.list_certificates(event.id).await.unwrap();
    assert_eq!(records.len(), 5);
    let tokens: HashSet<_> = records.iter().map(|r| r.token.as_str()).collect();
    assert_eq!(tokens.len(), 5);
    assert!(records.iter().all(|r| r.token.len() == TOKEN_LEN && is_well_formed(&r.token)));
    assert!(records.iter().all(|r| !r.qr_code_data.is_empty()));

    // Entries follow the participant list.
    let expected: Vec<String> = names
        .iter()
        .map(|n| format!("{}_Certificate.pdf", n.replace(' ', "_")))
        .collect();
    assert_eq!(zip_entries(&report.archive), expected);

    let issued: Vec<_> = report.issued.iter().map(|i| i.participant_id).collect();
    let ids: Vec<_> = participants.iter().map(|p| p.id).collect();
    assert_eq!(issued, ids);
}

#[tokio::test]
async fn single_participant_run_reports_progress_to_completion() {
    let (store, event, _) = seeded("Rust Conf", &["Jane Doe"]);
    let (tx, mut rx) = progress::channel();

    let report = orchestrator(store.clone())
        .run(event.id, Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    assert_eq!(zip_entries(&report.archive), ["Jane_Doe_Certificate.pdf"]);
    let pdf = zip_entry(&report.archive, "Jane_Doe_Certificate.pdf");
    assert!(pdf.starts_with(b"%PDF"));

    let issued = &report.issued[0];
    assert_eq!(
        issued.verification_url,
        format!("{BASE_URL}/verify?id={}", issued.token)
    );
    assert_eq!(issued.short_id, issued.token[..8].to_uppercase());

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update.percent);
    }
    assert_eq!(updates, [100]);
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_one_hundred() {
    let (store, event, _) = seeded("Rust Conf", &["A", "B", "C", "D", "E", "F", "G"]);
    let (tx, mut rx) = progress::channel();

    orchestrator(store)
        .run(event.id, Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), 7);
    assert!(updates.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(updates.iter().map(|u| u.processed).collect::<Vec<_>>(), [1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(updates.last().unwrap().percent, 100);
}

#[tokio::test]
async fn participant_without_a_name_is_skipped() {
    let (store, event, participants) = seeded("Rust Conf", &["Jane Doe", "", "John Roe"]);

    let report = orchestrator(store.clone())
        .run(event.id, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.produced, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.outcome(), BatchOutcome::Partial);
    assert_eq!(report.failures[0].index, 1);
    assert_eq!(report.failures[0].participant_id, participants[1].id);
    assert!(report.summary().contains("Generated 2 of 3"));
    assert!(report.summary().contains("1 skipped"));

    assert_eq!(store.list_certificates(event.id).await.unwrap().len(), 2);
    assert_eq!(
        zip_entries(&report.archive),
        ["Jane_Doe_Certificate.pdf", "John_Roe_Certificate.pdf"]
    );
}

#[tokio::test]
async fn all_items_failing_is_fatal_and_persists_nothing() {
    let (store, event, _) = seeded("Rust Conf", &["", ""]);

    let result = orchestrator(store.clone())
        .run(event.id, None, &CancellationToken::new())
        .await;

    assert_matches!(result, Err(BatchError::NothingProduced { attempted: 2 }));
    assert!(store.list_certificates(event.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn regeneration_replaces_previous_certificates() {
    let (store, event, mut participants) = seeded("Rust Conf", &["Ada", "Grace"]);
    let batch = orchestrator(store.clone());

    let first = batch.run(event.id, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(first.replaced, 0);
    let old_tokens: Vec<String> = first.issued.iter().map(|i| i.token.clone()).collect();

    participants.push(participant(event.id, "Alan"));
    store.set_participants(event.id, participants).unwrap();

    let second = batch.run(event.id, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(second.produced, 3);
    assert_eq!(second.replaced, 2);

    let records = store.list_certificates(event.id).await.unwrap();
    assert_eq!(records.len(), 3);
    for token in &old_tokens {
        assert!(store.find_certificate_by_token(token).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn unknown_event_and_empty_event_fail_fast() {
    let (store, event, _) = seeded("Rust Conf", &[]);
    let batch = orchestrator(store);

    assert_matches!(
        batch.run(uuid::Uuid::new_v4(), None, &CancellationToken::new()).await,
        Err(BatchError::EventNotFound(_))
    );
    assert_matches!(
        batch.run(event.id, None, &CancellationToken::new()).await,
        Err(BatchError::NoParticipants(id)) if id == event.id
    );
}

#[tokio::test]
async fn cancelled_before_start_leaves_existing_records() {
    let (store, event, _) = seeded("Rust Conf", &["Ada", "Grace"]);
    let batch = orchestrator(store.clone());
    batch.run(event.id, None, &CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = batch.run(event.id, None, &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcome(), BatchOutcome::Cancelled);
    assert_eq!(report.produced, 0);
    assert!(report.archive.is_empty());
    assert_eq!(store.list_certificates(event.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancellation_mid_run_keeps_what_was_produced() {
    let names: Vec<String> = (0..40).map(|i| format!("Participant {i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (store, event, _) = seeded("Rust Conf", &refs);
    let batch = BatchOrchestrator::new(
        store.clone(),
        BatchSettings {
            workers: 1,
            ..settings()
        },
    );

    let cancel = CancellationToken::new();
    let (tx, mut rx) = progress::channel();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if rx.recv().await.is_some() {
                cancel.cancel();
            }
        })
    };

    let report = batch.run(event.id, Some(&tx), &cancel).await.unwrap();
    canceller.await.unwrap();

    assert!(report.cancelled);
    assert!(report.produced >= 1 && report.produced < 40, "produced {}", report.produced);
    assert_eq!(store.list_certificates(event.id).await.unwrap().len(), report.produced);
    assert_eq!(zip_entries(&report.archive).len(), report.produced);
}

#[tokio::test]
async fn cancelled_regeneration_keeps_certificates_it_did_not_reach() {
    let names: Vec<String> = (0..40).map(|i| format!("Participant {i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (store, event, _) = seeded("Rust Conf", &refs);
    let batch = BatchOrchestrator::new(
        store.clone(),
        BatchSettings {
            workers: 1,
            ..settings()
        },
    );
    let first = batch.run(event.id, None, &CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let (tx, mut rx) = progress::channel();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if rx.recv().await.is_some() {
                cancel.cancel();
            }
        })
    };
    let second = batch.run(event.id, Some(&tx), &cancel).await.unwrap();
    canceller.await.unwrap();

    assert!(second.cancelled);
    assert!(second.produced >= 1 && second.produced < 40, "produced {}", second.produced);
    assert_eq!(second.replaced, second.produced as u64);
    assert_eq!(store.list_certificates(event.id).await.unwrap().len(), 40);

    let verifier = Verifier::new(store.clone(), Duration::from_secs(5));
    for (index, old) in first.issued.iter().enumerate() {
        let answer = verifier.verify(&old.token).await.unwrap();
        assert_eq!(answer.valid, index >= second.produced, "participant {index}");
    }
    for fresh in &second.issued {
        assert!(verifier.verify(&fresh.token).await.unwrap().valid);
    }
}

#[tokio::test]
async fn insert_failure_is_fatal() {
    let store = Arc::new(FlakyStore {
        fail_insert: true,
        ..FlakyStore::default()
    });
    let event = event("Rust Conf");
    store.inner.add_event(event.clone()).unwrap();
    store
        .inner
        .set_participants(event.id, vec![participant(event.id, "Ada")])
        .unwrap();

    let result = orchestrator(store).run(event.id, None, &CancellationToken::new()).await;

    assert_matches!(result, Err(BatchError::Persist(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn delete_failure_is_tolerated_by_the_default_replace() {
    let store = Arc::new(FlakyStore {
        fail_delete: true,
        ..FlakyStore::default()
    });
    let event = event("Rust Conf");
    store.inner.add_event(event.clone()).unwrap();
    store
        .inner
        .set_participants(event.id, vec![participant(event.id, "Ada")])
        .unwrap();

    let report = orchestrator(store.clone())
        .run(event.id, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.replaced, 0);
    assert_eq!(store.list_certificates(event.id).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_participant_fetch_times_out() {
    let store = Arc::new(FlakyStore {
        stall_participants: true,
        ..FlakyStore::default()
    });
    let event = event("Rust Conf");
    store.inner.add_event(event.clone()).unwrap();

    let batch = BatchOrchestrator::new(
        store,
        BatchSettings {
            store_timeout: Duration::from_secs(2),
            ..settings()
        },
    );
    let result = batch.run(event.id, None, &CancellationToken::new()).await;

    assert_matches!(result, Err(BatchError::Fetch(err)) if err.is_timeout());
}
