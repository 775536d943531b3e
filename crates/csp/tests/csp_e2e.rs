// Path: crates/csp/tests/csp_e2e.rs

//! End-to-end scenarios over the full CSP: seeded members and censuses, the
//! two-step auth flow, signing with per-process consumption, bundle
//! isolation, throttling, publication validation, and the background job
//! path. Runs against the in-memory store and the recording notifier; one
//! scenario repeats the happy path over the durable redb store.

use std::sync::Arc;
use tally_api::access::{AllowAll, OrgRole, RoleChecker};
use tally_api::crypto::CspSigner;
use tally_api::store::CensusStore;
use tally_crypto::ecdsa::{recover_public_key, CspKey};
use tally_csp::publish::PublishDeclaration;
use tally_csp::{Csp, PublishOutcome};
use tally_storage::RedbCensusStore;
use tally_test_utils::fixtures;
use tally_test_utils::{MemCensusStore, RecordingNotifier};
use tally_types::auth::{ContactChannel, TokenState};
use tally_types::census::{AuthField, TwoFaField};
use tally_types::config::CspConfig;
use tally_types::error::CspError;
use tally_types::ids::{BundleId, CensusId, GroupId, MemberId, ProcessId};
use tally_types::member::MemberAuthInput;

const ADMIN: &str = "admin@tally";

fn quick_config() -> CspConfig {
    CspConfig {
        throttle_ms: 0,
        cooldown_ms: 0,
        job_gc_delay_ms: 200,
        // Keep the sweeper quiet during short tests.
        token_sweep_interval_ms: 3_600_000,
        server_url: "https://csp.example.org".to_string(),
        ..Default::default()
    }
}

struct Harness {
    csp: Arc<Csp>,
    store: Arc<dyn CensusStore>,
    notifier: RecordingNotifier,
    key: CspKey,
}

fn start(cfg: CspConfig, store: Arc<dyn CensusStore>) -> Harness {
    let notifier = RecordingNotifier::new();
    let key = CspKey::generate().unwrap();
    let csp = Csp::start(
        store.clone(),
        Arc::new(notifier.clone()),
        Arc::new(key.clone()),
        Arc::new(AllowAll),
        cfg,
    );
    Harness {
        csp,
        store,
        notifier,
        key,
    }
}

fn mem_harness(cfg: CspConfig) -> Harness {
    start(cfg, Arc::new(MemCensusStore::new()))
}

/// Seeds members, a group, a census, a process set, and a bundle, then
/// publishes the group synchronously.
async fn seed_standard(h: &Harness, two_fa: &[TwoFaField]) {
    for m in [
        fixtures::member("m1", "P001", "John", "Doe", "j@x"),
        fixtures::with_phone(
            fixtures::member("m2", "P002", "Jane", "Roe", "jane@x"),
            "+34600000001",
        ),
        fixtures::with_phone(fixtures::member("m3", "P003", "Mark", "Poe", ""), "+34600000002"),
    ] {
        h.store.put_member(&m).await.unwrap();
    }
    h.store
        .put_group(&fixtures::group("g1", &["m1", "m2", "m3"]))
        .await
        .unwrap();
    h.store
        .put_census(&fixtures::census(
            "c1",
            &[AuthField::Name, AuthField::Surname, AuthField::MemberNumber],
            two_fa,
        ))
        .await
        .unwrap();

    let outcome = h
        .csp
        .publish_group_census(
            ADMIN,
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            false,
        )
        .await
        .unwrap();
    match outcome {
        PublishOutcome::Published(info) => {
            assert_eq!(info.root.as_str(), h.csp.pub_key_hex());
            assert_eq!(info.size, 3);
        }
        PublishOutcome::Queued { .. } => panic!("synchronous publish queued a job"),
    }

    h.store.put_process(&fixtures::process(1, "c1")).await.unwrap();
    h.store.put_process(&fixtures::process(2, "c1")).await.unwrap();
    h.store.put_process(&fixtures::process(3, "c1")).await.unwrap();
    h.store
        .put_bundle(&fixtures::bundle("b1", "c1", &[1, 2]))
        .await
        .unwrap();
    h.store
        .put_bundle(&fixtures::bundle("b2", "c1", &[3]))
        .await
        .unwrap();
}

fn john() -> MemberAuthInput {
    MemberAuthInput {
        name: "John".into(),
        surname: "Doe".into(),
        member_number: "P001".into(),
        email: Some("j@x".into()),
        ..Default::default()
    }
}

fn code_from_body(body: &str) -> String {
    body.rsplit(' ').next().unwrap().to_string()
}

#[tokio::test]
async fn happy_path_signs_exactly_once() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    // Step 0: identity match, challenge over email.
    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    assert_eq!(h.notifier.count(), 1);
    let sent = h.notifier.last().unwrap();
    assert_eq!(sent.channel, ContactChannel::Email);
    assert_eq!(sent.address, "j@x");

    // Step 1: verify with the delivered code.
    let code = code_from_body(&sent.body);
    let verified = h.csp.verify_challenge(&token, &code).await.unwrap();
    assert_eq!(verified.state, TokenState::Verified);

    // Sign once; the signature recovers to the CSP key.
    let process = ProcessId(vec![1u8; 32]);
    let payload = [0xab, 0xcd];
    let signature = h.csp.sign(&token, &process, &payload).await.unwrap();
    assert_eq!(signature.len(), 65);
    let mut msg = process.as_bytes().to_vec();
    msg.extend_from_slice(&payload);
    assert_eq!(
        recover_public_key(&msg, &signature).unwrap(),
        h.key.public_key()
    );

    // The same (token, process) pair never signs twice.
    let err = h.csp.sign(&token, &process, &payload).await.unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));

    // A second process of the same bundle still works.
    h.csp
        .sign(&token, &ProcessId(vec![2u8; 32]), &payload)
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_identity_field_is_unauthorized_and_sends_nothing() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let mut input = john();
    input.name = "Wrong".into();
    let err = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &input, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn wrong_contact_for_matching_identity_is_unauthorized() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let mut input = john();
    input.email = Some("attacker@x".into());
    let err = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &input, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn channel_selection_follows_declared_fields() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email, TwoFaField::Phone]).await;

    // Only email supplied: email wins.
    let jane_email = MemberAuthInput {
        name: "Jane".into(),
        surname: "Roe".into(),
        member_number: "P002".into(),
        email: Some("jane@x".into()),
        ..Default::default()
    };
    h.csp
        .initiate_auth(&BundleId::from("b1"), &jane_email, None)
        .await
        .unwrap();
    assert_eq!(h.notifier.last().unwrap().channel, ContactChannel::Email);

    // Only phone supplied: SMS.
    let jane_phone = MemberAuthInput {
        name: "Jane".into(),
        surname: "Roe".into(),
        member_number: "P002".into(),
        phone: Some("+34600000001".into()),
        ..Default::default()
    };
    h.csp
        .initiate_auth(&BundleId::from("b1"), &jane_phone, None)
        .await
        .unwrap();
    assert_eq!(h.notifier.last().unwrap().channel, ContactChannel::Sms);

    // Neither supplied: malformed request, not a failed credential.
    let jane_bare = MemberAuthInput {
        name: "Jane".into(),
        surname: "Roe".into(),
        member_number: "P002".into(),
        ..Default::default()
    };
    let err = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &jane_bare, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::BadRequest(_)));
}

#[tokio::test]
async fn bundle_isolation_rejects_foreign_processes() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let code = code_from_body(&h.notifier.last().unwrap().body);
    h.csp.verify_challenge(&token, &code).await.unwrap();

    h.csp
        .sign(&token, &ProcessId(vec![1u8; 32]), b"payload")
        .await
        .unwrap();
    // P3 belongs to bundle b2: rejected before any consumption happens.
    let err = h
        .csp
        .sign(&token, &ProcessId(vec![3u8; 32]), b"payload")
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::ProcessNotInBundle));
}

#[tokio::test]
async fn pending_tokens_cannot_sign() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let err = h
        .csp
        .sign(&token, &ProcessId(vec![1u8; 32]), b"payload")
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));
}

#[tokio::test]
async fn cooldown_throttles_reissue_and_keeps_the_code() {
    let mut cfg = quick_config();
    cfg.cooldown_ms = 60_000;
    let h = mem_harness(cfg);
    seed_standard(&h, &[TwoFaField::Email]).await;

    h.csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let first_code = code_from_body(&h.notifier.last().unwrap().body);

    let err = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Throttled { .. }));
    // No second delivery, and the stored code is unchanged.
    assert_eq!(h.notifier.count(), 1);
    let key = tally_types::auth::ChallengeKey {
        bundle_id: BundleId::from("b1"),
        member_id: MemberId::from("m1"),
    };
    assert_eq!(
        h.store.challenge(&key).await.unwrap().unwrap().code,
        first_code
    );
}

#[tokio::test]
async fn address_throttle_spans_members_sharing_a_contact() {
    let mut cfg = quick_config();
    cfg.throttle_ms = 60_000;
    let h = mem_harness(cfg);

    // Two distinct members registered under the same inbox.
    for m in [
        fixtures::member("m1", "P001", "John", "Doe", "shared@x"),
        fixtures::member("m2", "P002", "Jane", "Roe", "shared@x"),
    ] {
        h.store.put_member(&m).await.unwrap();
    }
    h.store
        .put_group(&fixtures::group("g1", &["m1", "m2"]))
        .await
        .unwrap();
    h.store
        .put_census(&fixtures::census(
            "c1",
            &[AuthField::Name, AuthField::Surname],
            &[TwoFaField::Email],
        ))
        .await
        .unwrap();
    h.csp
        .publish_group_census(
            ADMIN,
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            false,
        )
        .await
        .unwrap();
    h.store
        .put_bundle(&fixtures::bundle("b1", "c1", &[]))
        .await
        .unwrap();

    let john = MemberAuthInput {
        name: "John".into(),
        surname: "Doe".into(),
        email: Some("shared@x".into()),
        ..Default::default()
    };
    let jane = MemberAuthInput {
        name: "Jane".into(),
        surname: "Roe".into(),
        email: Some("shared@x".into()),
        ..Default::default()
    };
    h.csp
        .initiate_auth(&BundleId::from("b1"), &john, None)
        .await
        .unwrap();
    // A different member, but the same address within the throttle window.
    let err = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &jane, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Throttled { .. }));
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn repeated_verify_on_a_challenge_census_is_a_duplicate() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let code = code_from_body(&h.notifier.last().unwrap().body);
    h.csp.verify_challenge(&token, &code).await.unwrap();

    let err = h.csp.verify_challenge(&token, &code).await.unwrap_err();
    assert!(matches!(err, CspError::DuplicateConflict(_)));
}

#[tokio::test]
async fn wrong_codes_exhaust_attempts_then_everything_fails() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let code = code_from_body(&h.notifier.last().unwrap().body);
    let wrong = if code == "000000" { "000001" } else { "000000" };

    for _ in 0..5 {
        let err = h.csp.verify_challenge(&token, wrong).await.unwrap_err();
        assert!(matches!(err, CspError::Unauthorized));
    }
    // Budget exhausted: even the right code is dead now.
    let err = h.csp.verify_challenge(&token, &code).await.unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));
}

#[tokio::test]
async fn auth_only_census_issues_verified_tokens() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[]).await;

    let mut input = john();
    input.email = None;
    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &input, None)
        .await
        .unwrap();
    assert_eq!(h.notifier.count(), 0);

    let status = h.csp.token_status(&token).await.unwrap();
    assert_eq!(status.state, TokenState::Verified);

    // The challenge step is a no-op that returns the verified token.
    let verified = h.csp.verify_challenge(&token, "ignored").await.unwrap();
    assert_eq!(verified.state, TokenState::Verified);

    h.csp
        .sign(&token, &ProcessId(vec![1u8; 32]), b"payload")
        .await
        .unwrap();
}

#[tokio::test]
async fn member_info_joins_consumption_state() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    // Unknown members yield an empty list.
    assert!(h
        .csp
        .member_info(&BundleId::from("b1"), &MemberId::from("ghost"))
        .await
        .unwrap()
        .is_empty());

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let code = code_from_body(&h.notifier.last().unwrap().body);
    h.csp.verify_challenge(&token, &code).await.unwrap();
    h.csp
        .sign(&token, &ProcessId(vec![1u8; 32]), b"payload")
        .await
        .unwrap();

    let info = h
        .csp
        .member_info(&BundleId::from("b1"), &MemberId::from("m1"))
        .await
        .unwrap();
    assert_eq!(info.len(), 2);
    let p1 = info
        .iter()
        .find(|row| row.process_id == ProcessId(vec![1u8; 32]))
        .unwrap();
    let p2 = info
        .iter()
        .find(|row| row.process_id == ProcessId(vec![2u8; 32]))
        .unwrap();
    assert!(p1.consumed);
    assert!(!p2.consumed);
}

#[tokio::test]
async fn publish_reports_all_duplicates_and_missing_values() {
    let h = mem_harness(quick_config());
    // Two members share a surname, the auth field; a third is missing it.
    for m in [
        fixtures::member("m1", "P001", "John", "Shared", "a@x"),
        fixtures::member("m2", "P002", "Jane", "Shared", "b@x"),
        fixtures::member("m3", "P003", "Mark", "", "c@x"),
    ] {
        h.store.put_member(&m).await.unwrap();
    }
    h.store
        .put_group(&fixtures::group("g1", &["m1", "m2", "m3"]))
        .await
        .unwrap();
    h.store
        .put_census(&fixtures::census("c1", &[AuthField::Surname], &[TwoFaField::Email]))
        .await
        .unwrap();

    let err = h
        .csp
        .publish_group_census(
            ADMIN,
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            false,
        )
        .await
        .unwrap_err();
    let CspError::ValidationFailed(validation) = err else {
        panic!("expected validation failure");
    };
    assert!(validation.duplicates.contains(&MemberId::from("m1")));
    assert!(validation.duplicates.contains(&MemberId::from("m2")));
    assert_eq!(validation.missing_data, vec![MemberId::from("m3")]);

    // Nothing was published.
    let census = h.csp.get_census(&CensusId::from("c1")).await.unwrap();
    assert!(!census.is_published());
    assert!(h
        .store
        .participant_for_member(&CensusId::from("c1"), &MemberId::from("m1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn publish_is_idempotent() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[TwoFaField::Email]).await;

    let again = h
        .csp
        .publish_group_census(
            ADMIN,
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            false,
        )
        .await
        .unwrap();
    let PublishOutcome::Published(info) = again else {
        panic!("expected sync publish");
    };
    assert_eq!(info.root.as_str(), h.csp.pub_key_hex());
    assert_eq!(
        info.uri,
        "https://csp.example.org/process/census/c1".to_string()
    );
    assert_eq!(info.size, 3);
}

#[tokio::test]
async fn async_publish_runs_as_a_job_and_is_garbage_collected() {
    let h = mem_harness(quick_config());
    for m in [
        fixtures::member("m1", "P001", "John", "Doe", "a@x"),
        fixtures::member("m2", "P002", "Jane", "Roe", "b@x"),
    ] {
        h.store.put_member(&m).await.unwrap();
    }
    h.store
        .put_group(&fixtures::group("g1", &["m1", "m2"]))
        .await
        .unwrap();
    h.store
        .put_census(&fixtures::census(
            "c1",
            &[AuthField::Name, AuthField::Surname],
            &[TwoFaField::Email],
        ))
        .await
        .unwrap();

    let outcome = h
        .csp
        .publish_group_census(
            ADMIN,
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            true,
        )
        .await
        .unwrap();
    let PublishOutcome::Queued { job_id } = outcome else {
        panic!("expected a queued job");
    };

    // Poll until the worker finishes.
    let org = fixtures::org();
    let mut job = h.csp.get_job(ADMIN, &org, &job_id).await.unwrap();
    for _ in 0..100 {
        if job.completed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        job = h.csp.get_job(ADMIN, &org, &job_id).await.unwrap();
    }
    assert!(job.completed);
    assert_eq!(job.added, 2);
    assert_eq!(job.progress(), 100);
    assert!(job.errors.is_empty());

    let census = h.csp.get_census(&CensusId::from("c1")).await.unwrap();
    assert!(census.is_published());

    // The completed row lingers for the GC delay, then disappears.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let err = h.csp.get_job(ADMIN, &org, &job_id).await.unwrap_err();
    assert!(matches!(err, CspError::MalformedParam(_)));
}

#[tokio::test]
async fn concurrent_consumption_admits_each_process_once() {
    let h = mem_harness(quick_config());
    seed_standard(&h, &[]).await;

    let mut input = john();
    input.email = None;
    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &input, None)
        .await
        .unwrap();

    // Hammer the same two processes from many tasks; only two consumptions
    // may ever succeed.
    let mut handles = Vec::new();
    for i in 0..20u8 {
        let store = h.store.clone();
        let process = ProcessId(vec![1 + (i % 2); 32]);
        handles.push(tokio::spawn(async move {
            store.consume_token_process(&token, &process).await.is_ok()
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 2);
    let status = h.csp.token_status(&token).await.unwrap();
    assert_eq!(status.consumed_processes.len(), 2);
}

struct DenyAll;

impl RoleChecker for DenyAll {
    fn has_role_for(&self, _: &str, _: &tally_types::ids::OrgAddress, _: OrgRole) -> bool {
        false
    }
}

#[tokio::test]
async fn admin_operations_require_a_role() {
    let store: Arc<dyn CensusStore> = Arc::new(MemCensusStore::new());
    let notifier = RecordingNotifier::new();
    let key = CspKey::generate().unwrap();
    let csp = Csp::start(
        store.clone(),
        Arc::new(notifier),
        Arc::new(key),
        Arc::new(DenyAll),
        quick_config(),
    );
    store
        .put_census(&fixtures::census("c1", &[AuthField::Name], &[]))
        .await
        .unwrap();

    let err = csp
        .publish_group_census(
            "intruder",
            &CensusId::from("c1"),
            &GroupId::from("g1"),
            PublishDeclaration::default(),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Forbidden));

    let err = csp
        .get_job(
            "intruder",
            &fixtures::org(),
            &tally_types::ids::JobId([1u8; 16]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CspError::Forbidden));
}

#[tokio::test]
async fn member_ingestion_hashes_contacts_and_reports_row_errors() {
    let h = mem_harness(quick_config());
    let org = fixtures::org();

    let mut bad_date = fixtures::raw_member("P003", "Bad", "Date", "bad@x");
    bad_date.birth_date = "01/05/1990".into();
    let rows = vec![
        fixtures::raw_member("P001", "John", "Doe", "j@x"),
        fixtures::raw_member("P002", "Jane", "Roe", "jane@x"),
        bad_date,
    ];
    let outcome = h.csp.add_members(ADMIN, &org, rows, false).await.unwrap();
    let tally_csp::IngestionOutcome::Ingested(outcome) = outcome else {
        panic!("expected sync ingestion");
    };
    assert_eq!(outcome.added, 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].reason.contains("birth date"));
}

#[tokio::test]
async fn happy_path_over_the_durable_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CensusStore> =
        Arc::new(RedbCensusStore::open(dir.path().join("csp.redb")).unwrap());
    let h = start(quick_config(), store);
    seed_standard(&h, &[TwoFaField::Email]).await;

    let token = h
        .csp
        .initiate_auth(&BundleId::from("b1"), &john(), None)
        .await
        .unwrap();
    let code = code_from_body(&h.notifier.last().unwrap().body);
    h.csp.verify_challenge(&token, &code).await.unwrap();

    let process = ProcessId(vec![1u8; 32]);
    let signature = h.csp.sign(&token, &process, b"payload").await.unwrap();
    let mut msg = process.as_bytes().to_vec();
    msg.extend_from_slice(b"payload");
    assert_eq!(
        recover_public_key(&msg, &signature).unwrap(),
        h.key.public_key()
    );

    let err = h.csp.sign(&token, &process, b"payload").await.unwrap_err();
    assert!(matches!(err, CspError::Unauthorized));

    h.csp.shutdown().await;
}
