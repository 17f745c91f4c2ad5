use std::sync::Arc;

use devnet::{Devnet, DEVNET_CONTRACT_ADDRESS};
use fhe_services::{
    abi::{decode_clear_values, encode_clear_values},
    is_already_verified, is_user_rejection, CreateRecordRequest, DecryptionOracle,
    EncryptionService, LedgerError, LedgerReader, LedgerWriter,
};
use shared::domain::{ActorAddress, CommandId, ContractAddress};

fn actor() -> ActorAddress {
    ActorAddress::new("0x00000000000000000000000000000000000000a1")
}

fn contract() -> ContractAddress {
    ContractAddress::new(DEVNET_CONTRACT_ADDRESS)
}

async fn create(devnet: &Devnet, id: &str, value: u64) -> CommandId {
    let fhe = devnet.fhe();
    fhe.initialize().await.expect("init");
    let input = fhe.encrypt(&contract(), &actor(), value).await.expect("encrypt");
    let signer = devnet.ledger().signer(actor());
    let tx = signer
        .create_record(CreateRecordRequest {
            id: CommandId::new(id),
            name: format!("cmd {id}"),
            ciphertext: input.handle,
            input_proof: input.input_proof,
            category_code: 7,
            secondary_code: 0,
            label: "Voice Command Data".into(),
        })
        .await
        .expect("create");
    signer.await_finality(&tx).await.expect("receipt");
    CommandId::new(id)
}

#[tokio::test]
async fn created_record_is_readable_and_unverified() {
    let devnet = Devnet::new();
    let id = create(&devnet, "a", 42).await;
    let ledger = devnet.ledger();

    assert_eq!(ledger.list_identifiers().await.unwrap(), vec![id.clone()]);
    let record = ledger.get_record(&id).await.unwrap();
    assert_eq!(record.creator, actor());
    assert_eq!(record.public_value1, 7);
    assert!(!record.is_verified);
    assert_eq!(record.decrypted_value, 0);
    assert_eq!(ledger.record_label(&id).as_deref(), Some("Voice Command Data"));
}

#[tokio::test]
async fn encrypt_requires_initialization() {
    let devnet = Devnet::new();
    let fhe = devnet.fhe();
    assert!(!fhe.is_initialized());
    assert!(fhe.encrypt(&contract(), &actor(), 1).await.is_err());

    fhe.fail_initialization(true);
    assert!(fhe.initialize().await.is_err());
    fhe.fail_initialization(false);
    fhe.initialize().await.unwrap();
    assert!(fhe.is_initialized());
}

#[tokio::test]
async fn oracle_bundle_is_accepted_once() {
    let devnet = Devnet::new();
    let id = create(&devnet, "a", 42).await;
    let ledger = devnet.ledger();
    let handle = ledger.get_ciphertext_handle(&id).await.unwrap();

    let bundle = devnet
        .fhe()
        .verify_decryption(std::slice::from_ref(&handle), &contract())
        .await
        .unwrap();
    assert_eq!(bundle.clear_values.get(&handle), Some(&42));
    assert_eq!(decode_clear_values(&bundle.encoded_clear_values).unwrap(), vec![42]);

    let signer = ledger.signer(actor());
    let tx = signer
        .submit_decryption_proof(&id, &bundle.encoded_clear_values, &bundle.proof)
        .await
        .unwrap();
    signer.await_finality(&tx).await.unwrap();
    let record = ledger.get_record(&id).await.unwrap();
    assert!(record.is_verified);
    assert_eq!(record.decrypted_value, 42);

    let again = signer
        .submit_decryption_proof(&id, &bundle.encoded_clear_values, &bundle.proof)
        .await
        .unwrap_err();
    assert!(is_already_verified(&again));
    assert_eq!(ledger.verification_submissions(), 2);
}

#[tokio::test]
async fn forged_clear_value_is_rejected() {
    let devnet = Devnet::new();
    let id = create(&devnet, "a", 42).await;
    let ledger = devnet.ledger();
    let handle = ledger.get_ciphertext_handle(&id).await.unwrap();
    let bundle = devnet
        .fhe()
        .verify_decryption(&[handle], &contract())
        .await
        .unwrap();

    let err = ledger
        .signer(actor())
        .submit_decryption_proof(&id, &encode_clear_values(&[41]), &bundle.proof)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::InvalidProof { .. })
    ));
    assert!(!ledger.get_record(&id).await.unwrap().is_verified);
}

#[tokio::test]
async fn injected_failures_surface_as_classified_errors() {
    let devnet = Devnet::new();
    let ledger = devnet.ledger();

    ledger.reject_next_submission();
    let fhe = devnet.fhe();
    fhe.initialize().await.unwrap();
    let input = fhe.encrypt(&contract(), &actor(), 5).await.unwrap();
    let err = ledger
        .signer(actor())
        .create_record(CreateRecordRequest {
            id: CommandId::new("r"),
            name: "rejected".into(),
            ciphertext: input.handle,
            input_proof: input.input_proof,
            category_code: 1,
            secondary_code: 0,
            label: "x".into(),
        })
        .await
        .unwrap_err();
    assert!(is_user_rejection(&err));
    assert_eq!(ledger.record_count(), 0);

    let id = ledger.seed_record(ActorAddress::new("0xbeef"), "seeded", 3, 9);
    ledger.fail_reads_for(&id);
    assert!(ledger.get_record(&id).await.is_err());
    ledger.restore_reads_for(&id);
    assert_eq!(ledger.get_record(&id).await.unwrap().name, "seeded");

    ledger.set_available(false);
    assert!(!ledger.is_available().await.unwrap());
}

#[tokio::test]
async fn raced_verification_leaves_record_verified() {
    let devnet = Devnet::new();
    let ledger: Arc<_> = devnet.ledger();
    let id = ledger.seed_record(ActorAddress::new("0xbeef"), "seeded", 3, 9);
    let handle = ledger.get_ciphertext_handle(&id).await.unwrap();
    let bundle = devnet
        .fhe()
        .verify_decryption(&[handle], &contract())
        .await
        .unwrap();

    ledger.race_next_verification();
    let err = ledger
        .signer(actor())
        .submit_decryption_proof(&id, &bundle.encoded_clear_values, &bundle.proof)
        .await
        .unwrap_err();
    assert!(is_already_verified(&err));
    let record = ledger.get_record(&id).await.unwrap();
    assert!(record.is_verified);
    assert_eq!(record.decrypted_value, 9);
}
