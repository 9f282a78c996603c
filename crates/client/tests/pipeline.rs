//! End-to-end flows: publish, purchase, grant, open, and the failure
//! paths in between. Everything runs against the in-memory ledger,
//! store, and custodian, so these are the same steps a client performs
//! in production minus the network.

mod common;

use std::sync::Arc;

use rand::RngCore;

use common::{Fixture, SOL};
use sealgate_client::codec;
use sealgate_client::config::PROGRAM_ID;
use sealgate_client::content::ContentError;
use sealgate_client::custodian::{
    AccessPolicy, CustodianError, IdentityProof, KeyCustodian, SealedKey,
};
use sealgate_client::derive::derive_asset_address;
use sealgate_client::metadata::{ListingRecord, NewListing};
use sealgate_client::pipeline::{OpenError, PublishCheckpoint, PublishRequest};
use sealgate_client::store::{ContentStore, Tag};
use sealgate_client::verifier::VerifyError;
use sealgate_client::wallet::Wallet;

fn payload(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn request(plaintext: Vec<u8>, price: u64) -> PublishRequest {
    PublishRequest {
        plaintext,
        price,
        tags: vec![Tag::new("Content-Type", "application/octet-stream")],
    }
}

#[tokio::test]
async fn publish_then_owner_opens() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let pipeline = fixture.pipeline(creator.clone());
    let plaintext = payload(4096);

    let receipt = pipeline
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap();

    // The ledger record carries the owner, price, and content address.
    let record =
        codec::decode_asset(&fixture.ledger.account_data(&receipt.asset_address).unwrap())
            .unwrap();
    assert_eq!(record.owner, creator.identity());
    assert_eq!(record.price, SOL);
    assert_eq!(record.content_id, receipt.content_id.as_str());

    // What sits in storage is ciphertext, not the payload.
    let stored = fixture.store.get(&receipt.content_id).await.unwrap();
    assert_ne!(stored, plaintext);

    let opened = pipeline
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
}

#[tokio::test]
async fn buyer_purchases_then_opens() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let buyer = Arc::new(fixture.wallet(10 * SOL));
    let plaintext = payload(2048);

    let receipt = fixture
        .pipeline(creator.clone())
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap();
    common::purchase(
        &fixture,
        &buyer,
        &receipt.asset_address,
        &creator.identity(),
    )
    .await
    .unwrap();

    let opened = fixture
        .pipeline(buyer.clone())
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
}

#[tokio::test]
async fn granted_identity_opens_without_paying() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let friend = Arc::new(fixture.wallet(SOL));
    let plaintext = payload(512);

    let receipt = fixture
        .pipeline(creator.clone())
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap();
    common::grant(&fixture, &creator, &receipt.asset_address, &friend.identity())
        .await
        .unwrap();

    let opened = fixture
        .pipeline(friend.clone())
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
    assert_eq!(fixture.ledger.lamports(&friend.identity()), SOL);
}

#[tokio::test]
async fn stranger_is_refused_at_verification_and_at_the_custodian() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let stranger = Arc::new(fixture.wallet(SOL));

    let receipt = fixture
        .pipeline(creator.clone())
        .publish(request(payload(256), SOL))
        .await
        .unwrap();

    let err = fixture
        .pipeline(stranger.clone())
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpenError::Verify(VerifyError::NotEntitled { .. })
    ));

    // Skipping verification and going straight to the custodian does
    // not help; the policy check reads the same ledger.
    let policy = AccessPolicy::entitlement_exists(PROGRAM_ID, receipt.asset_address);
    let proof = IdentityProof::sign(stranger.as_ref(), &policy).await.unwrap();
    let err = fixture
        .custodian
        .release(&receipt.sealed_key, &policy, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, CustodianError::PolicyDenied(_)));
}

#[tokio::test]
async fn tampered_ciphertext_fails_closed() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let pipeline = fixture.pipeline(creator.clone());

    let receipt = pipeline
        .publish(request(payload(1024), SOL))
        .await
        .unwrap();
    assert!(fixture.store.corrupt(&receipt.content_id, 40));

    let err = pipeline
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpenError::Decrypt(ContentError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn failed_registration_resumes_without_reupload() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let pipeline = fixture.pipeline(creator.clone());
    let plaintext = payload(2048);

    fixture
        .ledger
        .fail_next_submit("Transaction simulation failed: Blockhash not found");
    let err = pipeline
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap_err();
    assert!(matches!(err.checkpoint, PublishCheckpoint::Sealed { .. }));
    assert_eq!(fixture.store.put_count(), 1);

    let receipt = pipeline.resume_publish(err.checkpoint, SOL).await.unwrap();
    assert_eq!(fixture.store.put_count(), 1, "the upload is reused");

    let opened = pipeline
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
}

#[tokio::test]
async fn declined_wallet_halts_publish_before_sealing() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let pipeline = fixture.pipeline(creator.clone());
    let plaintext = payload(2048);

    // The first signature request in a publish is the sealing proof.
    creator.decline_next();
    let err = pipeline
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap_err();

    let PublishCheckpoint::Uploaded { content_id, .. } = &err.checkpoint else {
        panic!("expected the upload checkpoint, got: {:?}", err.checkpoint);
    };
    let (asset, _) =
        derive_asset_address(&PROGRAM_ID, &creator.identity(), content_id.as_str()).unwrap();
    assert!(
        fixture.ledger.account_data(&asset).is_none(),
        "nothing was registered"
    );

    // The upload survives; resuming finishes the run.
    let receipt = pipeline.resume_publish(err.checkpoint, SOL).await.unwrap();
    assert_eq!(fixture.store.put_count(), 1);
    let opened = pipeline
        .open(&receipt.asset_address, &receipt.sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
}

#[tokio::test]
async fn open_works_from_listing_data_alone() {
    let fixture = Fixture::new();
    let creator = Arc::new(fixture.wallet(10 * SOL));
    let buyer = Arc::new(fixture.wallet(10 * SOL));
    let plaintext = payload(1024);

    let receipt = fixture
        .pipeline(creator.clone())
        .publish(request(plaintext.clone(), SOL))
        .await
        .unwrap();

    // The listing is what a storefront would serve to the buyer: the
    // draft comes straight off the receipt, the service assigns the id.
    let draft = NewListing::for_receipt(&receipt, "Track one", "", None);
    assert_eq!(draft.price_lamports, SOL);
    let listing = ListingRecord {
        id: "listing-1".to_string(),
        title: draft.title,
        description: draft.description,
        price_lamports: draft.price_lamports,
        content_id: draft.content_id,
        asset_address: draft.asset_address,
        sealed_key: draft.sealed_key,
        policy_digest: draft.policy_digest,
        thumbnail_url: draft.thumbnail_url,
    };
    let served: ListingRecord =
        serde_json::from_str(&serde_json::to_string(&listing).unwrap()).unwrap();

    let asset_address = served.asset_address.parse().unwrap();
    common::purchase(&fixture, &buyer, &asset_address, &creator.identity())
        .await
        .unwrap();

    let sealed_key = SealedKey::from_parts(&served.sealed_key, &served.policy_digest).unwrap();
    let opened = fixture
        .pipeline(buyer.clone())
        .open(&asset_address, &sealed_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);
}
